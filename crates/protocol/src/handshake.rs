//! Handshake-Nachricht beim Verbindungsaufbau
//!
//! Direkt nach connect/accept schicken beide Seiten genau einen Handshake
//! `{username, public_key_pem}`, ebenfalls laengenpraefixiert. Erst danach
//! fliessen Envelopes ueber die Verbindung.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use fluesterpost_core::error::benutzername_pruefen;
use fluesterpost_core::Identity;

use crate::error::{FramingError, FramingResult};
use crate::wire::{read_frame, write_frame};

/// Maximale Groesse einer Handshake-Nachricht (64 KiB)
pub const HANDSHAKE_MAX_SIZE: usize = 64 * 1024;

/// Identitaets-Austausch beim Verbindungsaufbau
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub username: String,
    pub public_key_pem: String,
}

impl HandshakeMessage {
    pub fn new(username: impl Into<String>, public_key_pem: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            public_key_pem: public_key_pem.into(),
        }
    }

    /// Prueft Pflichtfelder (Benutzername gueltig, Schluessel nicht leer)
    pub fn validieren(&self) -> FramingResult<()> {
        benutzername_pruefen(&self.username)
            .map_err(|e| FramingError::UngueltigerHandshake(e.to_string()))?;
        if self.public_key_pem.trim().is_empty() {
            return Err(FramingError::UngueltigerHandshake(
                "Oeffentlicher Schluessel fehlt".into(),
            ));
        }
        Ok(())
    }

    /// Serialisiert den Handshake als JSON
    pub fn to_bytes(&self) -> FramingResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parst und validiert einen Handshake aus JSON
    pub fn from_bytes(bytes: &[u8]) -> FramingResult<Self> {
        let msg: Self = serde_json::from_slice(bytes)?;
        msg.validieren()?;
        Ok(msg)
    }
}

impl From<&Identity> for HandshakeMessage {
    fn from(identity: &Identity) -> Self {
        Self::new(identity.username.clone(), identity.public_key_pem.clone())
    }
}

impl From<HandshakeMessage> for Identity {
    fn from(msg: HandshakeMessage) -> Self {
        Identity::new(msg.username, msg.public_key_pem)
    }
}

/// Schreibt einen Handshake als einzelnen Frame
pub async fn write_handshake<W>(writer: &mut W, msg: &HandshakeMessage) -> FramingResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = msg.to_bytes()?;
    write_frame(writer, &bytes, HANDSHAKE_MAX_SIZE).await
}

/// Liest und validiert einen Handshake-Frame
///
/// Ein leerer Stream (Gegenseite trennt sofort) ergibt `Geschlossen`.
pub async fn read_handshake<R>(reader: &mut R) -> FramingResult<HandshakeMessage>
where
    R: AsyncRead + Unpin,
{
    let bytes = read_frame(reader, HANDSHAKE_MAX_SIZE).await?;
    HandshakeMessage::from_bytes(&bytes)
}
