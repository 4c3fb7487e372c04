//! Envelope – verschluesselter Container fuer genau eine logische Nachricht
//!
//! Nach dem Handshake traegt jeder Frame ein JSON-Envelope, unterschieden
//! ueber das Feld `type`. Alle Binaerfelder sind Base64 (Standard-Alphabet
//! mit Padding).
//!
//! ```json
//! {"type":"chat_message","encrypted_key":"..","encrypted_message":"..","nonce":"..","tag":".."}
//! {"type":"online_notify","username":"alice"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FramingResult;

// ---------------------------------------------------------------------------
// PayloadKind
// ---------------------------------------------------------------------------

/// Art des Inhalts eines Envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    ChatText,
    StegImage,
    Audio,
    PresenceNotify,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::ChatText => "chat_text",
            PayloadKind::StegImage => "steg_image",
            PayloadKind::Audio => "audio",
            PayloadKind::PresenceNotify => "presence_notify",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Varianten
// ---------------------------------------------------------------------------

/// Verschluesselte Textnachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(with = "b64")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "b64")]
    pub encrypted_message: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

/// Verschluesselte versteckte Nachricht eines Steganografie-Bildes
///
/// Traegt den (asymmetrisch verschluesselten) Sitzungsschluessel, der auch
/// fuer die Bilddaten verwendet wurde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenMessageCrypto {
    #[serde(with = "b64")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "b64")]
    pub encrypted_hidden_msg: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

/// Verschluesseltes Bild mit eingebetteter Nachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StegImage {
    #[serde(with = "b64")]
    pub encrypted_image_data: Vec<u8>,
    #[serde(with = "b64")]
    pub image_nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub image_tag: Vec<u8>,
    pub hidden_message_crypto: HiddenMessageCrypto,
}

/// Verschluesselte Sprachnachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMessage {
    #[serde(with = "b64")]
    pub encrypted_key: Vec<u8>,
    #[serde(with = "b64")]
    pub encrypted_audio: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

/// Praesenz-Signal ohne verschluesselten Inhalt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineNotify {
    pub username: String,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Alle Nachrichtenarten, die nach dem Handshake uebertragen werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    ChatMessage(ChatMessage),
    StegImage(StegImage),
    AudioMessage(AudioMessage),
    OnlineNotify(OnlineNotify),
}

impl Envelope {
    /// Gibt die Inhaltsart dieses Envelopes zurueck
    pub fn kind(&self) -> PayloadKind {
        match self {
            Envelope::ChatMessage(_) => PayloadKind::ChatText,
            Envelope::StegImage(_) => PayloadKind::StegImage,
            Envelope::AudioMessage(_) => PayloadKind::Audio,
            Envelope::OnlineNotify(_) => PayloadKind::PresenceNotify,
        }
    }

    pub fn to_bytes(&self) -> FramingResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> FramingResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ---------------------------------------------------------------------------
// Base64-Serialisierung fuer Binaerfelder
// ---------------------------------------------------------------------------

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
