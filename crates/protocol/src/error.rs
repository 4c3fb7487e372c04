//! Fehlertypen der Protokollschicht

use thiserror::Error;

/// Fehler beim Rahmen, Lesen oder Parsen von Protokoll-Nachrichten
#[derive(Debug, Error)]
pub enum FramingError {
    /// Angekuendigte Frame-Laenge ueberschreitet das Limit
    #[error("Frame zu gross: {laenge} Bytes (Maximum: {maximum})")]
    FrameZuGross { laenge: usize, maximum: usize },

    /// Zu sendende Nachricht ueberschreitet das Limit
    #[error("Nachricht zu gross zum Senden: {laenge} Bytes (Maximum: {maximum})")]
    NachrichtZuGross { laenge: usize, maximum: usize },

    /// Gegenseite hat die Verbindung vor einem neuen Frame geschlossen
    #[error("Verbindung von der Gegenseite geschlossen")]
    Geschlossen,

    /// Handshake enthaelt ungueltige Felder
    #[error("Ungueltiger Handshake: {0}")]
    UngueltigerHandshake(String),

    /// Payload ist kein gueltiges JSON der erwarteten Form
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type FramingResult<T> = std::result::Result<T, FramingError>;
