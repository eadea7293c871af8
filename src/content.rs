//! Decoding of gateway message content into [`NormalizedMessage`].
//!
//! The gateway tags every message with a `messageType` discriminator and puts
//! a type-specific object in `content`. Only the fields the relay needs are
//! read; missing fields fall back to defaults and only structurally invalid
//! JSON is reported as [`RelayError::Decode`].

use crate::error::RelayError;
use crate::types::NormalizedMessage;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Message types that carry no user content.
const SILENT_TYPES: &[&str] = &[
    "protocolMessage",
    "reactionMessage",
    "senderKeyDistributionMessage",
];

#[derive(Debug, Default, Deserialize)]
struct TextContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioContent {
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    seconds: Option<Value>,
    #[serde(default)]
    ptt: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageContent {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentContent {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

pub fn decode(message_type: &str, raw: &[u8]) -> Result<NormalizedMessage, RelayError> {
    let value: Value = if raw.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(raw).map_err(|err| RelayError::Decode(err.to_string()))?
    };
    decode_value(message_type, &value)
}

pub fn decode_value(message_type: &str, content: &Value) -> Result<NormalizedMessage, RelayError> {
    match message_type {
        "conversation" | "extendedTextMessage" => {
            let body = match content {
                Value::String(text) => text.clone(),
                _ => parse::<TextContent>(message_type, content)?
                    .text
                    .unwrap_or_default(),
            };
            Ok(NormalizedMessage::Text { body })
        }
        "audioMessage" => {
            let audio = parse::<AudioContent>(message_type, content)?;
            Ok(NormalizedMessage::Audio {
                mimetype: audio.mimetype,
                seconds: audio.seconds.as_ref().and_then(seconds_value),
                voice_note: audio.ptt.unwrap_or(false),
                attachment: None,
            })
        }
        "imageMessage" => {
            let image = parse::<ImageContent>(message_type, content)?;
            Ok(NormalizedMessage::Image {
                url: image.url.unwrap_or_default(),
                caption: image.caption.filter(|c| !c.is_empty()),
            })
        }
        "documentMessage" => {
            let doc = parse::<DocumentContent>(message_type, content)?;
            Ok(NormalizedMessage::Document {
                url: doc.url.unwrap_or_default(),
                filename: doc.file_name.or(doc.title),
            })
        }
        other if SILENT_TYPES.contains(&other) => Ok(NormalizedMessage::Unsupported {
            message_type: other.to_string(),
        }),
        other => Err(RelayError::UnsupportedContent(format!(
            "unknown message type: {other}"
        ))),
    }
}

fn parse<T: DeserializeOwned + Default>(message_type: &str, content: &Value) -> Result<T, RelayError> {
    if content.is_null() {
        return Ok(T::default());
    }
    T::deserialize(content)
        .map_err(|err| RelayError::Decode(format!("{message_type} content: {err}")))
}

fn seconds_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
