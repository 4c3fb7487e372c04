//! Fehlertypen fuer Fluesterpost
//!
//! Gemeinsamer Fehler-Enum fuer Zustaende, die crate-uebergreifend auftreten.
//! Die Fach-Crates (crypto, p2p, session) definieren eigene Fehler und
//! ordnen sie bei Bedarf hier ein.

use thiserror::Error;

/// Globaler Result-Alias fuer Fluesterpost
pub type Result<T> = std::result::Result<T, FluesterpostError>;

/// Crate-uebergreifende Fehler
#[derive(Debug, Error)]
pub enum FluesterpostError {
    // --- Verbindung & Netzwerk ---
    #[error("Ungueltige Peer-Adresse: {0}")]
    UngueltigeAdresse(String),

    #[error("Peer nicht erreichbar: {0}")]
    NichtErreichbar(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Identitaet ---
    #[error("Ungueltiger Benutzername: {0:?}")]
    UngueltigerBenutzername(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl FluesterpostError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::Zeitlimit(_) | Self::NichtErreichbar(_))
    }
}

/// Prueft einen Benutzernamen auf Grundform (nicht leer, keine Steuerzeichen)
pub fn benutzername_pruefen(username: &str) -> Result<()> {
    if username.trim().is_empty() || username.chars().any(char::is_control) {
        return Err(FluesterpostError::UngueltigerBenutzername(username.to_string()));
    }
    Ok(())
}
