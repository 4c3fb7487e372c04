//! Fehlertypen fuer die Peer-Verbindungsverwaltung

use fluesterpost_protocol::FramingError;
use thiserror::Error;

/// Fehlertyp fuer die P2P-Schicht
#[derive(Debug, Error)]
pub enum P2pError {
    /// Handshake unvollstaendig, fehlerhaft oder mit ungueltigem Schluessel
    #[error("Handshake fehlgeschlagen: {0}")]
    HandshakeFailure(String),

    /// Gegenseite meldet sich mit einem anderen Benutzernamen als erwartet
    #[error("Falscher Peer: erwartet '{erwartet}', gemeldet '{erhalten}'")]
    PeerIdentityMismatch { erwartet: String, erhalten: String },

    /// Ungueltiger Frame (Laenge ueber dem Limit, Abbruch mitten im Frame)
    #[error("Framing-Fehler: {0}")]
    Framing(#[from] FramingError),

    /// Verbindungsaufbau fehlgeschlagen
    #[error("Peer '{peer}' nicht erreichbar: {grund}")]
    PeerUnreachable { peer: String, grund: String },

    /// Keine aktive Verbindung zu diesem Peer
    #[error("Keine Verbindung zu '{0}'")]
    NotConnected(String),

    /// `start_listener` wurde zweimal aufgerufen
    #[error("Listener laeuft bereits")]
    ListenerAlreadyRunning,

    /// Zeitlimit ueberschritten (Handshake, Verbindungsaufbau)
    #[error("Zeitlimit ueberschritten: {0}")]
    Timeout(String),

    /// Verbindung wurde waehrend der Operation geschlossen
    #[error("Verbindung geschlossen")]
    ConnectionClosed,

    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl P2pError {
    /// Erstellt einen Handshake-Fehler
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::HandshakeFailure(msg.into())
    }

    /// Fehler, der nur die einzelne Nachricht betrifft, nicht die Verbindung
    pub fn ist_lokal(&self) -> bool {
        matches!(self, Self::Framing(FramingError::NachrichtZuGross { .. }))
    }
}

/// Result-Typ fuer die P2P-Schicht
pub type P2pResult<T> = Result<T, P2pError>;
