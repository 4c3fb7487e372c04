//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Knoten ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use fluesterpost_core::error::benutzername_pruefen;
use fluesterpost_core::{PeerAddress, PeerRecord};
use fluesterpost_observability::logging::{log_format_gueltig, log_level_gueltig};
use fluesterpost_p2p::{KeepaliveConfig, P2pConfig};

/// Standard-Pfad der Konfigurationsdatei
pub const STANDARD_CONFIG_PFAD: &str = "fluesterpost.toml";

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "FLUESTERPOST_CONFIG";

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Eigener Benutzername und Schluessel-Dateien
    pub identitaet: IdentitaetEinstellungen,
    /// Listener und Zeitlimits
    pub netzwerk: NetzwerkEinstellungen,
    /// TCP-Keepalive fuer Peer-Verbindungen
    pub keepalive: KeepaliveEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Metriken + Health
    pub observability: ObservabilityEinstellungen,
    /// Statische Verzeichnis-Eintraege
    pub peers: Vec<PeerEinstellungen>,
}

/// Eigene Identitaet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitaetEinstellungen {
    pub benutzername: String,
    /// PKCS#8-PEM, wird beim ersten Start erzeugt
    pub privater_schluessel: String,
    /// SPKI-PEM
    pub oeffentlicher_schluessel: String,
}

impl Default for IdentitaetEinstellungen {
    fn default() -> Self {
        Self {
            benutzername: "gast".into(),
            privater_schluessel: "keys/private_key.pem".into(),
            oeffentlicher_schluessel: "keys/public_key.pem".into(),
        }
    }
}

/// Netzwerk-Einstellungen des P2P-Listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// 0 = vom Betriebssystem vergeben
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Maximale Payload-Groesse eines Frames in Bytes
    pub max_frame_bytes: usize,
    /// Kapazitaet der Eingangs- und Zustell-Queue
    pub eingangs_queue: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        let p2p = P2pConfig::default();
        Self {
            bind_adresse: p2p.listen_host,
            port: p2p.listen_port,
            connect_timeout_ms: p2p.connect_timeout.as_millis() as u64,
            handshake_timeout_ms: p2p.handshake_timeout.as_millis() as u64,
            max_frame_bytes: p2p.max_frame_size,
            eingangs_queue: p2p.inbound_queue,
        }
    }
}

/// TCP-Keepalive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveEinstellungen {
    pub aktiviert: bool,
    pub idle_sekunden: u64,
    pub intervall_sekunden: u64,
    pub wiederholungen: u32,
}

impl Default for KeepaliveEinstellungen {
    fn default() -> Self {
        let k = KeepaliveConfig::default();
        Self {
            aktiviert: k.aktiviert,
            idle_sekunden: k.idle.as_secs(),
            intervall_sekunden: k.intervall.as_secs(),
            wiederholungen: k.wiederholungen,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    pub aktiviert: bool,
    pub bind_adresse: String,
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            bind_adresse: "127.0.0.1".into(),
            port: 9300,
        }
    }
}

/// Ein Freund im statischen Verzeichnis
///
/// Der Schluessel wird entweder direkt (`public_key_pem`) oder als Datei
/// (`public_key_pfad`) angegeben.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEinstellungen {
    pub benutzername: String,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub public_key_pfad: Option<String>,
}

impl PeerEinstellungen {
    /// Baut den Verzeichnis-Eintrag; liest dazu ggf. die Schluessel-Datei
    pub fn record(&self) -> anyhow::Result<PeerRecord> {
        let public_key_pem = match (&self.public_key_pem, &self.public_key_pfad) {
            (Some(pem), _) => pem.clone(),
            (None, Some(pfad)) => std::fs::read_to_string(pfad).with_context(|| {
                format!("Schluessel von '{}' nicht lesbar: {pfad}", self.benutzername)
            })?,
            (None, None) => {
                return Err(anyhow!(
                    "Peer '{}': public_key_pem oder public_key_pfad fehlt",
                    self.benutzername
                ))
            }
        };

        Ok(PeerRecord {
            username: self.benutzername.clone(),
            address: PeerAddress::new(self.ip.clone(), self.port),
            public_key_pem,
        })
    }
}

impl NodeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: impl AsRef<Path>) -> anyhow::Result<Self> {
        let pfad = pfad.as_ref();
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow!("Konfigurationsfehler in '{}': {e}", pfad.display()))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = %pfad.display(),
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow!(
                "Konfigurationsdatei '{}' nicht lesbar: {e}",
                pfad.display()
            )),
        }
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        benutzername_pruefen(&self.identitaet.benutzername)?;
        if !log_level_gueltig(&self.logging.level) {
            return Err(anyhow!("Ungueltiges Log-Level: {}", self.logging.level));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(anyhow!("Ungueltiges Log-Format: {}", self.logging.format));
        }
        if self.netzwerk.max_frame_bytes == 0 {
            return Err(anyhow!("max_frame_bytes muss groesser als 0 sein"));
        }
        for peer in &self.peers {
            benutzername_pruefen(&peer.benutzername)?;
        }
        Ok(())
    }

    /// Laufzeit-Konfiguration fuer den `PeerConnectionManager`
    pub fn p2p_config(&self) -> P2pConfig {
        P2pConfig {
            listen_host: self.netzwerk.bind_adresse.clone(),
            listen_port: self.netzwerk.port,
            connect_timeout: Duration::from_millis(self.netzwerk.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(self.netzwerk.handshake_timeout_ms),
            max_frame_size: self.netzwerk.max_frame_bytes,
            inbound_queue: self.netzwerk.eingangs_queue,
            keepalive: KeepaliveConfig {
                aktiviert: self.keepalive.aktiviert,
                idle: Duration::from_secs(self.keepalive.idle_sekunden),
                intervall: Duration::from_secs(self.keepalive.intervall_sekunden),
                wiederholungen: self.keepalive.wiederholungen,
            },
        }
    }

    /// Verzeichnis-Eintraege aller konfigurierten Peers
    pub fn peer_records(&self) -> anyhow::Result<Vec<PeerRecord>> {
        self.peers.iter().map(PeerEinstellungen::record).collect()
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!(
            "{}:{}",
            self.observability.bind_adresse, self.observability.port
        );
        adresse
            .parse()
            .map_err(|e| anyhow!("Ungueltige Observability-Adresse '{adresse}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = NodeConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.identitaet.benutzername, "gast");
        assert_eq!(cfg.netzwerk.port, 0);
        assert_eq!(cfg.netzwerk.handshake_timeout_ms, 10_000);
        assert!(!cfg.observability.aktiviert);
        assert!(cfg.peers.is_empty());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [identitaet]
            benutzername = "alice"

            [netzwerk]
            port = 9000
            connect_timeout_ms = 1500

            [keepalive]
            aktiviert = false

            [[peers]]
            benutzername = "bob"
            ip = "10.0.0.2"
            port = 9001
            public_key_pem = "PEM-BOB"
        "#;
        let cfg: NodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.identitaet.benutzername, "alice");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.identitaet.privater_schluessel, "keys/private_key.pem");
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");

        let p2p = cfg.p2p_config();
        assert_eq!(p2p.listen_port, 9000);
        assert_eq!(p2p.connect_timeout, Duration::from_millis(1500));
        assert!(!p2p.keepalive.aktiviert);
        assert_eq!(p2p.keepalive.wiederholungen, 5);

        let records = cfg.peer_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "bob");
        assert_eq!(records[0].address, PeerAddress::new("10.0.0.2", 9001));
        assert_eq!(records[0].public_key_pem, "PEM-BOB");
    }

    #[test]
    fn peer_schluessel_aus_datei() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("bob.pem");
        std::fs::write(&pfad, "PEM-AUS-DATEI").unwrap();

        let peer = PeerEinstellungen {
            benutzername: "bob".into(),
            ip: "127.0.0.1".into(),
            port: 1,
            public_key_pem: None,
            public_key_pfad: Some(pfad.display().to_string()),
        };
        assert_eq!(peer.record().unwrap().public_key_pem, "PEM-AUS-DATEI");
    }

    #[test]
    fn peer_ohne_schluessel_ist_fehler() {
        let peer = PeerEinstellungen {
            benutzername: "bob".into(),
            ip: "127.0.0.1".into(),
            port: 1,
            public_key_pem: None,
            public_key_pfad: None,
        };
        assert!(peer.record().is_err());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = NodeConfig::laden(dir.path().join("gibt-es-nicht.toml")).unwrap();
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("kaputt.toml");
        std::fs::write(&pfad, "[netzwerk\nport = ").unwrap();
        assert!(NodeConfig::laden(&pfad).is_err());
    }

    #[test]
    fn ungueltige_werte_werden_erkannt() {
        let mut cfg = NodeConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = NodeConfig::default();
        cfg.identitaet.benutzername = "  ".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn observability_adresse() {
        let cfg = NodeConfig::default();
        assert_eq!(
            cfg.observability_bind_adresse().unwrap(),
            "127.0.0.1:9300".parse::<SocketAddr>().unwrap()
        );
    }
}
