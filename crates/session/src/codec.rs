//! Steganografie-Schnittstelle
//!
//! Das Einbetten/Extrahieren selbst ist ein externer Baustein. Die Sitzung
//! ruft ihn vor dem Verschluesseln (Senden) bzw. nach dem Entschluesseln
//! (Empfangen) eines Bildes auf.

use crate::error::SessionResult;

/// Bettet Text in Bilddaten ein bzw. liest ihn wieder aus
pub trait SteganographyCodec: Send + Sync {
    /// Gibt das Bild mit eingebettetem `hidden_text` zurueck
    fn embed(&self, cover_image: &[u8], hidden_text: &str) -> SessionResult<Vec<u8>>;

    /// Liest eingebetteten Text aus; `None` wenn keiner gefunden wurde
    fn extract(&self, image: &[u8]) -> SessionResult<Option<String>>;
}

/// Codec ohne Einbettung: Bilder bleiben unveraendert
///
/// Die versteckte Nachricht reist trotzdem verschluesselt im Envelope mit.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCodec;

impl SteganographyCodec for PassthroughCodec {
    fn embed(&self, cover_image: &[u8], _hidden_text: &str) -> SessionResult<Vec<u8>> {
        Ok(cover_image.to_vec())
    }

    fn extract(&self, _image: &[u8]) -> SessionResult<Option<String>> {
        Ok(None)
    }
}
