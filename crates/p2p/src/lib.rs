//! # fluesterpost-p2p
//!
//! Direkte TCP-Verbindungen zwischen zwei Fluesterpost-Knoten.
//!
//! ## Ablauf
//! 1. `start_listener()` bindet den Listener, eingehende Sockets werden per
//!    Handshake `{username, public_key_pem}` identifiziert
//! 2. `connect(peer, adresse)` baut ausgehende Verbindungen auf
//! 3. Pro Peer existiert hoechstens eine Verbindung; jede hat eine eigene
//!    Empfangsschleife, die vollstaendige Frames als `InboundFrame` liefert
//! 4. `stop_listener()` / `close_all_connections()` beim Herunterfahren

pub mod config;
pub mod connection;
pub mod error;
mod handshake;
mod keepalive;
pub mod manager;

pub use config::{KeepaliveConfig, P2pConfig};
pub use connection::{ConnectionState, PeerConnection};
pub use error::{P2pError, P2pResult};
pub use manager::{InboundFrame, PeerConnectionManager};
