//! Langzeit-Schluessel (RSA) und Schluessel-Transport (RSA-OAEP/SHA-256)
//!
//! Jeder Benutzer besitzt ein RSA-Schluessel-Paar mit mindestens 2048 Bit.
//! Der oeffentliche Schluessel wird beim Handshake und ueber das Verzeichnis
//! verteilt (SPKI-PEM), der private Schluessel verlaesst den Rechner nie.
//!
//! RSA-OAEP verpackt ausschliesslich den kurzen Einmal-Schluessel einer
//! Nachricht, nie die Nutzdaten selbst.

use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::Oaep;
use sha2::Sha256;
use tracing::{debug, info};

pub use rsa::{RsaPrivateKey as PrivateKey, RsaPublicKey as PublicKey};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{SecretBytes, KEY_SIZE};

/// Minimale (und Standard-) Schluessellaenge in Bit
pub const RSA_KEY_BITS: usize = 2048;

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

/// Eigenes RSA-Schluessel-Paar
#[derive(Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    fn from_private(private_key: PrivateKey) -> Self {
        let public_key = PublicKey::from(&private_key);
        Self {
            private_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Oeffentlicher Schluessel als SPKI-PEM (fuer Handshake und Verzeichnis)
    pub fn public_key_pem(&self) -> CryptoResult<String> {
        to_pem(&self.public_key)
    }

    /// Packt einen mit dem eigenen oeffentlichen Schluessel verpackten
    /// Einmal-Schluessel aus
    pub fn decrypt_key(&self, ciphertext: &[u8]) -> CryptoResult<SecretBytes> {
        decrypt_key(&self.private_key, ciphertext)
    }

    pub fn into_parts(self) -> (PrivateKey, PublicKey) {
        (self.private_key, self.public_key)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "KeyPair {{ bits: {}, private_key: [REDACTED] }}",
            self.public_key.size() * 8
        )
    }
}

// ---------------------------------------------------------------------------
// Generierung
// ---------------------------------------------------------------------------

/// Generiert ein neues RSA-Schluessel-Paar mit `RSA_KEY_BITS` Bit
pub fn generate_keypair() -> CryptoResult<KeyPair> {
    generate_keypair_with_bits(RSA_KEY_BITS)
}

/// Generiert ein RSA-Schluessel-Paar mit `bits` Bit (mindestens 2048)
pub fn generate_keypair_with_bits(bits: usize) -> CryptoResult<KeyPair> {
    if bits < RSA_KEY_BITS {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "{bits} Bit sind zu wenig (Minimum: {RSA_KEY_BITS})"
        )));
    }

    let private_key = PrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
    debug!(bits, "RSA-Schluessel-Paar generiert");
    Ok(KeyPair::from_private(private_key))
}

// ---------------------------------------------------------------------------
// Persistenz
// ---------------------------------------------------------------------------

/// Laedt das Schluessel-Paar von der Platte oder erzeugt und speichert ein neues
///
/// - beide Dateien vorhanden: laden und auf Zusammengehoerigkeit pruefen
/// - nur privater Schluessel: oeffentlichen ableiten und schreiben
/// - nur oeffentlicher Schluessel: `KeyStorage` (privater Schluessel verloren)
/// - keine Datei: neues Paar erzeugen, Verzeichnisse anlegen, beide schreiben
pub fn load_or_create(path_private: &Path, path_public: &Path) -> CryptoResult<KeyPair> {
    match (path_private.exists(), path_public.exists()) {
        (true, true) => {
            let keypair = KeyPair::from_private(private_key_laden(path_private)?);
            let gespeichert = public_key_laden(path_public)?;
            if gespeichert != keypair.public_key {
                return Err(CryptoError::KeyStorage(format!(
                    "{} passt nicht zu {}",
                    path_public.display(),
                    path_private.display()
                )));
            }
            info!(pfad = %path_private.display(), "Schluessel-Paar geladen");
            Ok(keypair)
        }
        (true, false) => {
            let keypair = KeyPair::from_private(private_key_laden(path_private)?);
            datei_schreiben(path_public, keypair.public_key_pem()?.as_bytes(), false)?;
            info!(
                pfad = %path_public.display(),
                "Oeffentlicher Schluessel aus privatem Schluessel wiederhergestellt"
            );
            Ok(keypair)
        }
        (false, true) => Err(CryptoError::KeyStorage(format!(
            "{} existiert, aber der private Schluessel {} fehlt",
            path_public.display(),
            path_private.display()
        ))),
        (false, false) => {
            let keypair = generate_keypair()?;
            let private_pem = keypair
                .private_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| CryptoError::KeyStorage(e.to_string()))?;
            datei_schreiben(path_private, private_pem.as_bytes(), true)?;
            datei_schreiben(path_public, keypair.public_key_pem()?.as_bytes(), false)?;
            info!(pfad = %path_private.display(), "Neues Schluessel-Paar erzeugt und gespeichert");
            Ok(keypair)
        }
    }
}

fn private_key_laden(path: &Path) -> CryptoResult<PrivateKey> {
    let pem = fs::read_to_string(path)
        .map_err(|e| CryptoError::KeyStorage(format!("{}: {e}", path.display())))?;
    PrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| PrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| CryptoError::KeyStorage(format!("{}: {e}", path.display())))
}

fn public_key_laden(path: &Path) -> CryptoResult<PublicKey> {
    let pem = fs::read_to_string(path)
        .map_err(|e| CryptoError::KeyStorage(format!("{}: {e}", path.display())))?;
    from_pem(&pem).map_err(|e| CryptoError::KeyStorage(format!("{}: {e}", path.display())))
}

fn datei_schreiben(path: &Path, inhalt: &[u8], privat: bool) -> CryptoResult<()> {
    let fehler = |e: std::io::Error| CryptoError::KeyStorage(format!("{}: {e}", path.display()));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(fehler)?;
    }
    fs::write(path, inhalt).map_err(fehler)?;
    if privat {
        nur_fuer_eigentuemer(path).map_err(fehler)?;
    }

    Ok(())
}

#[cfg(unix)]
fn nur_fuer_eigentuemer(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn nur_fuer_eigentuemer(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// PEM
// ---------------------------------------------------------------------------

/// Kodiert einen oeffentlichen Schluessel als SPKI-PEM
pub fn to_pem(public_key: &PublicKey) -> CryptoResult<String> {
    public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
}

/// Parst einen oeffentlichen Schluessel (SPKI-PEM oder PKCS#1 `RSA PUBLIC KEY`)
pub fn from_pem(pem: &str) -> CryptoResult<PublicKey> {
    let key = PublicKey::from_public_key_pem(pem)
        .or_else(|_| PublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;

    let bits = key.size() * 8;
    if bits < RSA_KEY_BITS {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "Schluessel mit {bits} Bit abgelehnt (Minimum: {RSA_KEY_BITS})"
        )));
    }
    Ok(key)
}

// ---------------------------------------------------------------------------
// Schluessel-Transport
// ---------------------------------------------------------------------------

/// Verpackt einen Einmal-Schluessel (hoechstens 32 Bytes) fuer `peer_public_key`
pub fn encrypt_key(peer_public_key: &PublicKey, symmetric_key: &[u8]) -> CryptoResult<Vec<u8>> {
    if symmetric_key.len() > KEY_SIZE {
        return Err(CryptoError::Encryption(format!(
            "Schluessel zu lang fuer den Transport: {} Bytes (Maximum: {KEY_SIZE})",
            symmetric_key.len()
        )));
    }

    peer_public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), symmetric_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Packt einen verpackten Einmal-Schluessel mit dem eigenen privaten Schluessel aus
pub fn decrypt_key(own_private_key: &PrivateKey, ciphertext: &[u8]) -> CryptoResult<SecretBytes> {
    own_private_key
        .decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map(SecretBytes::new)
        .map_err(|e| CryptoError::Decryption(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymmetricKey;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use std::sync::OnceLock;

    /// Schluessel-Generierung ist teuer, daher ein gemeinsames Paar pro Testlauf
    fn test_keypair() -> &'static KeyPair {
        static KEYPAIR: OnceLock<KeyPair> = OnceLock::new();
        KEYPAIR.get_or_init(|| generate_keypair().expect("Schluessel-Generierung"))
    }

    #[test]
    fn schluessel_hat_mindestens_2048_bit() {
        assert_eq!(test_keypair().public_key().size() * 8, RSA_KEY_BITS);
    }

    #[test]
    fn zu_kurze_schluessel_werden_abgelehnt() {
        let result = generate_keypair_with_bits(1024);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn schluessel_verpacken_und_auspacken() {
        let kp = test_keypair();
        let key = SymmetricKey::generate();

        let verpackt = encrypt_key(kp.public_key(), key.as_bytes()).unwrap();
        assert_eq!(verpackt.len(), RSA_KEY_BITS / 8);

        let ausgepackt = kp.decrypt_key(&verpackt).unwrap();
        assert_eq!(ausgepackt.as_bytes(), key.as_bytes());
    }

    #[test]
    fn zu_langer_schluessel_wird_abgelehnt() {
        let result = encrypt_key(test_keypair().public_key(), &[0u8; 33]);
        assert!(matches!(result, Err(CryptoError::Encryption(_))));
    }

    #[test]
    fn kaputter_ciphertext_ist_decryption_fehler() {
        let kp = test_keypair();
        let mut verpackt = encrypt_key(kp.public_key(), &[7u8; 32]).unwrap();
        verpackt[10] ^= 0x01;

        let result = kp.decrypt_key(&verpackt);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn pem_hin_und_zurueck() {
        let kp = test_keypair();
        let pem = kp.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let geparst = from_pem(&pem).unwrap();
        assert_eq!(&geparst, kp.public_key());
    }

    #[test]
    fn pkcs1_pem_wird_akzeptiert() {
        let kp = test_keypair();
        let pem = kp.public_key().to_pkcs1_pem(LineEnding::LF).unwrap();
        assert!(pem.starts_with("-----BEGIN RSA PUBLIC KEY-----"));
        assert_eq!(&from_pem(&pem).unwrap(), kp.public_key());
    }

    #[test]
    fn ungueltiges_pem_wird_abgelehnt() {
        let result = from_pem("-----BEGIN PUBLIC KEY-----\nkaputt\n-----END PUBLIC KEY-----\n");
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
        assert!(from_pem("").is_err());
    }

    #[test]
    fn debug_zeigt_keinen_privaten_schluessel() {
        let debug = format!("{:?}", test_keypair());
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("2048"));
    }

    #[test]
    fn load_or_create_erzeugt_und_laedt() {
        let dir = tempfile::tempdir().unwrap();
        let privat = dir.path().join("keys").join("private.pem");
        let oeffentlich = dir.path().join("keys").join("public.pem");

        let erzeugt = load_or_create(&privat, &oeffentlich).unwrap();
        assert!(privat.exists());
        assert!(oeffentlich.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&privat).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let geladen = load_or_create(&privat, &oeffentlich).unwrap();
        assert_eq!(geladen.public_key(), erzeugt.public_key());

        // Nur der private Schluessel: oeffentlicher wird wiederhergestellt
        fs::remove_file(&oeffentlich).unwrap();
        let wiederhergestellt = load_or_create(&privat, &oeffentlich).unwrap();
        assert_eq!(wiederhergestellt.public_key(), erzeugt.public_key());
        assert!(oeffentlich.exists());

        // Fremder oeffentlicher Schluessel passt nicht zum privaten
        fs::write(&oeffentlich, test_keypair().public_key_pem().unwrap()).unwrap();
        let result = load_or_create(&privat, &oeffentlich);
        assert!(matches!(result, Err(CryptoError::KeyStorage(_))));
    }

    #[test]
    fn load_or_create_nur_oeffentlicher_schluessel() {
        let dir = tempfile::tempdir().unwrap();
        let privat = dir.path().join("private.pem");
        let oeffentlich = dir.path().join("public.pem");
        fs::write(&oeffentlich, test_keypair().public_key_pem().unwrap()).unwrap();

        let result = load_or_create(&privat, &oeffentlich);
        assert!(matches!(result, Err(CryptoError::KeyStorage(_))));
    }

    #[test]
    fn load_or_create_unlesbare_datei() {
        let dir = tempfile::tempdir().unwrap();
        let privat = dir.path().join("private.pem");
        let oeffentlich = dir.path().join("public.pem");
        fs::write(&privat, "kein pem").unwrap();
        fs::write(&oeffentlich, "auch kein pem").unwrap();

        let result = load_or_create(&privat, &oeffentlich);
        assert!(matches!(result, Err(CryptoError::KeyStorage(_))));
    }

    #[test]
    fn load_or_create_nicht_beschreibbarer_pfad() {
        let dir = tempfile::tempdir().unwrap();
        // Eine Datei als "Verzeichnis" verwenden
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "datei").unwrap();
        let privat = blocker.join("private.pem");
        let oeffentlich = blocker.join("public.pem");

        let result = load_or_create(&privat, &oeffentlich);
        assert!(matches!(result, Err(CryptoError::KeyStorage(_))));
    }
}
