//! Symmetrische Nutzdaten-Verschluesselung (AES-256-GCM)
//!
//! ## Format
//! ```text
//! ciphertext (gleiche Laenge wie Klartext) | nonce (12) | tag (16)
//! ```
//!
//! Nonce und Tag werden getrennt vom Ciphertext geliefert, damit der
//! Envelope sie als eigene Felder tragen kann. Jeder Aufruf von `encrypt`
//! erzeugt eine frische Zufalls-Nonce.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce as AesNonce, Tag,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{SealedPayload, SymmetricKey, NONCE_SIZE, TAG_SIZE};

/// Erzeugt einen neuen 256-Bit-Schluessel fuer genau eine Nachricht
pub fn generate_key() -> SymmetricKey {
    SymmetricKey::generate()
}

fn cipher(key: &SymmetricKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Verschluesselt `plaintext` mit `key` und einer frischen Nonce
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> CryptoResult<SealedPayload> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(AesNonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(SealedPayload {
        ciphertext: buffer,
        nonce,
        tag: tag_bytes,
    })
}

/// Entschluesselt und verifiziert einen Payload
///
/// Schlaegt geschlossen fehl: ein ungueltiger Tag (Manipulation oder falscher
/// Schluessel) ergibt `Authentication`, nie einen Teil des Klartexts.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8],
    tag: &[u8],
    key: &SymmetricKey,
) -> CryptoResult<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidLength {
            feld: "nonce",
            erwartet: NONCE_SIZE,
            erhalten: nonce.len(),
        });
    }
    if tag.len() != TAG_SIZE {
        return Err(CryptoError::InvalidLength {
            feld: "tag",
            erwartet: TAG_SIZE,
            erhalten: tag.len(),
        });
    }

    let mut buffer = ciphertext.to_vec();
    cipher(key)
        .decrypt_in_place_detached(
            AesNonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::Authentication)?;

    Ok(buffer)
}

/// Kurzform fuer `decrypt` mit einem `SealedPayload`
pub fn open(sealed: &SealedPayload, key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag, key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verschluesseln_und_entschluesseln() {
        let key = generate_key();
        let plaintext = b"Hallo Bob, das ist geheim";

        let sealed = encrypt(plaintext, &key).unwrap();
        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_ne!(&sealed.ciphertext[..], &plaintext[..]);

        let decrypted = decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag, &key).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn leerer_klartext() {
        let key = generate_key();
        let sealed = encrypt(b"", &key).unwrap();
        assert!(sealed.ciphertext.is_empty());
        assert!(open(&sealed, &key).unwrap().is_empty());
    }

    #[test]
    fn verschiedene_groessen() {
        let key = generate_key();
        for groesse in [1usize, 15, 16, 17, 1000, 256 * 1024] {
            let plaintext: Vec<u8> = (0..groesse).map(|i| (i % 256) as u8).collect();
            let sealed = encrypt(&plaintext, &key).unwrap();
            assert_eq!(open(&sealed, &key).unwrap(), plaintext, "Groesse {groesse}");
        }
    }

    #[test]
    fn frische_nonce_pro_aufruf() {
        let key = generate_key();
        let a = encrypt(b"gleich", &key).unwrap();
        let b = encrypt(b"gleich", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let sealed = encrypt(b"nur fuer bob", &generate_key()).unwrap();
        let result = open(&sealed, &generate_key());
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn jedes_gekippte_bit_im_ciphertext_wird_erkannt() {
        let key = generate_key();
        let sealed = encrypt(b"manipulationssicher", &key).unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut kaputt = sealed.clone();
                kaputt.ciphertext[byte] ^= 1 << bit;
                assert!(
                    matches!(open(&kaputt, &key), Err(CryptoError::Authentication)),
                    "Byte {byte} Bit {bit}"
                );
            }
        }
    }

    #[test]
    fn jedes_gekippte_bit_in_nonce_und_tag_wird_erkannt() {
        let key = generate_key();
        let sealed = encrypt(b"nonce und tag", &key).unwrap();

        for byte in 0..NONCE_SIZE {
            for bit in 0..8 {
                let mut kaputt = sealed.clone();
                kaputt.nonce[byte] ^= 1 << bit;
                assert!(open(&kaputt, &key).is_err(), "Nonce-Byte {byte} Bit {bit}");
            }
        }
        for byte in 0..TAG_SIZE {
            for bit in 0..8 {
                let mut kaputt = sealed.clone();
                kaputt.tag[byte] ^= 1 << bit;
                assert!(open(&kaputt, &key).is_err(), "Tag-Byte {byte} Bit {bit}");
            }
        }
    }

    #[test]
    fn falsche_nonce_laenge_ist_fehler_statt_panic() {
        let key = generate_key();
        let sealed = encrypt(b"x", &key).unwrap();
        let result = decrypt(&sealed.ciphertext, &sealed.nonce[..8], &sealed.tag, &key);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidLength { feld: "nonce", .. })
        ));
    }

    #[test]
    fn falsche_tag_laenge_ist_fehler_statt_panic() {
        let key = generate_key();
        let sealed = encrypt(b"x", &key).unwrap();
        let result = decrypt(&sealed.ciphertext, &sealed.nonce, &[], &key);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidLength { feld: "tag", .. })
        ));
    }
}
