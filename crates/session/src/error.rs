//! Fehlertypen der Sitzungsschicht

use fluesterpost_crypto::CryptoError;
use fluesterpost_p2p::P2pError;
use fluesterpost_protocol::FramingError;
use thiserror::Error;

/// Sitzungs-Fehlertypen
#[derive(Debug, Error)]
pub enum SessionError {
    /// Empfaenger unbekannt oder Verbindungsaufbau gescheitert
    #[error("Peer '{peer}' nicht erreichbar: {grund}")]
    PeerUnreachable { peer: String, grund: String },

    /// Ein Kryptografie-Schritt ist fehlgeschlagen (Senden oder Empfangen)
    #[error("Verschluesselung fehlgeschlagen: {0}")]
    EncryptionFailure(#[from] CryptoError),

    #[error("Steganografie-Codec: {0}")]
    Codec(String),

    #[error("Transport-Fehler: {0}")]
    Transport(#[from] P2pError),

    #[error("Envelope-Fehler: {0}")]
    Envelope(#[from] FramingError),

    /// Entschluesselter Inhalt passt nicht zur Nachrichtenart
    #[error("Ungueltiger Inhalt: {0}")]
    InvalidPayload(String),

    #[error("Sitzung nicht gestartet")]
    NotStarted,
}

pub type SessionResult<T> = Result<T, SessionError>;
