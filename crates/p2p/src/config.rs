//! Konfiguration der Peer-Verbindungsverwaltung

use std::time::Duration;

use fluesterpost_protocol::DEFAULT_MAX_FRAME_SIZE;

/// TCP-Keepalive-Einstellungen fuer etablierte Verbindungen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveConfig {
    pub aktiviert: bool,
    /// Leerlaufzeit bis zur ersten Probe
    pub idle: Duration,
    /// Abstand zwischen zwei Proben
    pub intervall: Duration,
    /// Unbeantwortete Proben bis zum Verbindungsabbruch
    pub wiederholungen: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            aktiviert: true,
            idle: Duration::from_secs(60),
            intervall: Duration::from_secs(10),
            wiederholungen: 5,
        }
    }
}

/// Laufzeit-Konfiguration des `PeerConnectionManager`
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Bind-Adresse des Listeners
    pub listen_host: String,
    /// Port des Listeners (0 = vom Betriebssystem vergeben)
    pub listen_port: u16,
    /// Zeitlimit fuer den ausgehenden Verbindungsaufbau
    pub connect_timeout: Duration,
    /// Zeitlimit fuer den gesamten Handshake-Austausch
    pub handshake_timeout: Duration,
    /// Maximale Payload-Groesse eines Frames
    pub max_frame_size: usize,
    /// Kapazitaet der Eingangs-Queue (Frames aller Peers)
    pub inbound_queue: usize,
    pub keepalive: KeepaliveConfig,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".into(),
            listen_port: 0,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            inbound_queue: 256,
            keepalive: KeepaliveConfig::default(),
        }
    }
}
