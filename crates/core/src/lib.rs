//! fluesterpost-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Fluesterpost-Crates gemeinsam genutzt werden: Identitaeten,
//! Peer-Adressen und Verbindungs-IDs.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FluesterpostError, Result};
pub use types::{ConnectionId, Direction, Identity, PeerAddress, PeerRecord};
