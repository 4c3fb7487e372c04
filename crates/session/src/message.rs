//! Nach oben zugestellte, entschluesselte Nachrichten

use fluesterpost_protocol::PayloadKind;

/// Art eines Binaer-Payloads fuer `send_binary`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryKind {
    Audio,
    /// Bild mit versteckter Nachricht (wird separat verschluesselt mitgesendet)
    StegImage { hidden_message: String },
}

/// Entschluesselte Nachricht eines Peers
///
/// Der Absender stammt immer aus dem Handshake der Verbindung, nie aus dem
/// Envelope-Inhalt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveredMessage {
    Text {
        sender: String,
        text: String,
    },
    StegImage {
        sender: String,
        image: Vec<u8>,
        hidden_message: String,
        /// Vom Codec aus dem Bild gelesener Text
        extracted: Option<String>,
    },
    Audio {
        sender: String,
        audio: Vec<u8>,
    },
    /// Peer ist (wieder) online, Freundesliste neu laden
    PresenceRefresh {
        sender: String,
    },
}

impl DeliveredMessage {
    pub fn sender(&self) -> &str {
        match self {
            DeliveredMessage::Text { sender, .. }
            | DeliveredMessage::StegImage { sender, .. }
            | DeliveredMessage::Audio { sender, .. }
            | DeliveredMessage::PresenceRefresh { sender } => sender,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            DeliveredMessage::Text { .. } => PayloadKind::ChatText,
            DeliveredMessage::StegImage { .. } => PayloadKind::StegImage,
            DeliveredMessage::Audio { .. } => PayloadKind::Audio,
            DeliveredMessage::PresenceRefresh { .. } => PayloadKind::PresenceNotify,
        }
    }
}
