//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

/// Laenge eines symmetrischen Schluessels (AES-256)
pub const KEY_SIZE: usize = 32;

/// Laenge der GCM-Nonce (96 Bit)
pub const NONCE_SIZE: usize = 12;

/// Laenge des GCM-Auth-Tags (128 Bit)
pub const TAG_SIZE: usize = 16;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(Vec<u8>);

impl Zeroize for SecretBytes {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Einmal-Schluessel fuer AES-256-GCM (32 Bytes)
///
/// Pro logischer Nachricht wird ein neuer Schluessel erzeugt.
#[derive(Clone, Debug)]
pub struct SymmetricKey(SecretBytes);

impl SymmetricKey {
    /// Erzeugt einen neuen zufaelligen Schluessel aus dem OS-RNG
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(SecretBytes::new(bytes))
    }

    /// Uebernimmt ausgepackte Schluessel-Bytes (genau 32)
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                feld: "schluessel",
                erwartet: KEY_SIZE,
                erhalten: bytes.len(),
            });
        }
        Ok(Self(SecretBytes::new(bytes.to_vec())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Ergebnis einer AEAD-Verschluesselung: Ciphertext, Nonce und Tag getrennt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_bytes_debug_zeigt_keinen_inhalt() {
        let s = SecretBytes::new(vec![0xAB; 32]);
        let debug = format!("{:?}", s);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
        assert_eq!(s.len(), 32);
    }

    #[test]
    fn secret_bytes_werden_genullt() {
        let mut s = SecretBytes::new(vec![0xAB; 32]);
        s.zeroize();
        assert!(s.is_empty());
        assert!(s.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn schluessel_sind_zufaellig() {
        let a = SymmetricKey::generate();
        let b = SymmetricKey::generate();
        assert_eq!(a.as_bytes().len(), KEY_SIZE);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn schluessel_falsche_laenge() {
        let result = SymmetricKey::from_bytes(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidLength { erwartet: 32, erhalten: 16, .. })
        ));
    }
}
