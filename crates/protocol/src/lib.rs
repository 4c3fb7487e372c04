//! fluesterpost-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert das Frame-Format, den Handshake und die
//! Envelope-Typen, die zwischen zwei Peers ausgetauscht werden.

pub mod envelope;
pub mod error;
pub mod handshake;
pub mod wire;

pub use envelope::{
    AudioMessage, ChatMessage, Envelope, HiddenMessageCrypto, OnlineNotify, PayloadKind, StegImage,
};
pub use error::{FramingError, FramingResult};
pub use handshake::{read_handshake, write_handshake, HandshakeMessage, HANDSHAKE_MAX_SIZE};
pub use wire::{FrameCodec, Reassembler, DEFAULT_MAX_FRAME_SIZE};
