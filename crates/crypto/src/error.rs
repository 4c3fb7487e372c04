//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
///
/// `Decryption` betrifft das Auspacken des Sitzungsschluessels (RSA-OAEP),
/// `Authentication` einen ungueltigen AEAD-Tag.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Schluessel-Speicher nicht nutzbar: {0}")]
    KeyStorage(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Encryption(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Decryption(String),

    #[error("Authentifizierung fehlgeschlagen (Tag ungueltig)")]
    Authentication,

    #[error("Ungueltiges Schluesselmaterial: {0}")]
    InvalidKeyMaterial(String),

    #[error("Ungueltige Laenge fuer {feld}: erwartet {erwartet}, erhalten {erhalten}")]
    InvalidLength {
        feld: &'static str,
        erwartet: usize,
        erhalten: usize,
    },
}

pub type CryptoResult<T> = Result<T, CryptoError>;
