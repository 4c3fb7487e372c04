//! # fluesterpost-crypto
//!
//! Hybrid-Verschluesselung fuer Fluesterpost-Nachrichten.
//!
//! ## Module
//! - `asymmetric` - RSA-Schluessel-Paar, PEM, Schluessel-Transport (OAEP/SHA-256)
//! - `symmetric` - AES-256-GCM mit getrennter Nonce und getrenntem Tag
//! - `types` - Gemeinsame Typen (SecretBytes, SymmetricKey, SealedPayload)
//! - `error` - Fehlertypen

pub mod asymmetric;
pub mod error;
pub mod symmetric;
pub mod types;

// Bequeme Re-Exports
pub use asymmetric::{KeyPair, PrivateKey, PublicKey, RSA_KEY_BITS};
pub use error::{CryptoError, CryptoResult};
pub use types::{SealedPayload, SecretBytes, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
