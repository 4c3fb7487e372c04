//! Gemeinsame Identifikationstypen fuer Fluesterpost
//!
//! Der Benutzername ist der Adressierungsschluessel der P2P-Schicht.
//! Adressen stammen aus dem Verzeichnis-Dienst und koennen sich bei jedem
//! Neustart des Listeners aendern, Identitaeten dagegen nicht.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::error::{FluesterpostError, Result};

/// Identitaet eines Teilnehmers: Benutzername + oeffentlicher Schluessel (PEM)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub public_key_pem: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, public_key_pem: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            public_key_pem: public_key_pem.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.username)
    }
}

/// Netzwerkadresse eines Peer-Listeners
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Wandelt die Adresse in eine `SocketAddr` um
    ///
    /// Nur IP-Literale werden akzeptiert; Hostnamen loest der Verbindungsaufbau
    /// selbst ueber `host_port()` auf.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| FluesterpostError::UngueltigeAdresse(self.to_string()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Gibt `(host, port)` fuer `TcpStream::connect` zurueck
    pub fn host_port(&self) -> (&str, u16) {
        (self.ip.as_str(), self.port)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ip.contains(':') {
            write!(f, "[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

/// Verzeichnis-Eintrag eines Freundes: Name, aktuelle Adresse, Schluessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub username: String,
    pub address: PeerAddress,
    pub public_key_pem: String,
}

impl PeerRecord {
    pub fn identity(&self) -> Identity {
        Identity::new(self.username.clone(), self.public_key_pem.clone())
    }
}

/// Eindeutige ID einer einzelnen P2P-Verbindung
///
/// Unterscheidet eine ersetzte Verbindung von ihrer Nachfolgerin zum
/// gleichen Peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Richtung des Verbindungsaufbaus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Vom Listener akzeptiert
    Inbound,
    /// Selbst aufgebaut
    Outbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}
