//! fluesterpost-session – Sitzungsschicht ueber dem P2P-Transport
//!
//! Der `SessionOrchestrator` loest Empfaenger ueber ein `Directory` auf,
//! verschluesselt jede Nachricht hybrid (RSA-OAEP + AES-256-GCM) und stellt
//! eingehende Nachrichten entschluesselt als `DeliveredMessage` zu.

pub mod codec;
pub mod directory;
pub mod error;
pub mod message;
pub mod orchestrator;

pub use codec::{PassthroughCodec, SteganographyCodec};
pub use directory::{Directory, StaticDirectory};
pub use error::{SessionError, SessionResult};
pub use message::{BinaryKind, DeliveredMessage};
pub use orchestrator::SessionOrchestrator;
