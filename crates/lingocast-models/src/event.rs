//! Messages exchanged with the translation backend over the session channel.
//!
//! Wire format: one JSON object per WebSocket text frame. The backend tags
//! every event with an `event` discriminator.

use serde::{Deserialize, Serialize};

use crate::language::Language;

pub const EVENT_SUBTITLE: &str = "subtitle";
pub const EVENT_AUDIO: &str = "audio";
pub const EVENT_ERROR: &str = "error";

/// Sent exactly once per connection, right after the channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiationMessage {
    /// Live manifest address the backend should ingest.
    pub url: String,
    pub lang: Language,
}

impl InitiationMessage {
    pub fn new(url: impl Into<String>, lang: Language) -> Self {
        Self {
            url: url.into(),
            lang,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A parsed backend event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundEvent {
    /// One line of translated text.
    Subtitle { text: String },
    /// One self-contained narration clip, base64 encoded.
    Audio { data: String },
    /// Backend-side failure report (e.g. missing url or language).
    Error { text: String },
}

/// Decode-side mirror of [`InboundEvent`] that tolerates unknown tags.
#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum WireEvent {
    Subtitle {
        text: String,
    },
    Audio {
        data: String,
    },
    Error {
        text: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unrecognised event kind")]
    UnknownKind,
}

impl InboundEvent {
    /// Parse one text frame into an event.
    pub fn decode(text: &str) -> Result<Self, EventDecodeError> {
        match serde_json::from_str::<WireEvent>(text)? {
            WireEvent::Subtitle { text } => Ok(InboundEvent::Subtitle { text }),
            WireEvent::Audio { data } => Ok(InboundEvent::Audio { data }),
            WireEvent::Error { text } => Ok(InboundEvent::Error { text }),
            WireEvent::Unknown => Err(EventDecodeError::UnknownKind),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Subtitle { .. } => EVENT_SUBTITLE,
            InboundEvent::Audio { .. } => EVENT_AUDIO,
            InboundEvent::Error { .. } => EVENT_ERROR,
        }
    }
}
