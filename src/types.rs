use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Support-platform side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportCredentials {
    pub token: String,
    pub account_id: i64,
    pub inbox_id: i64,
}

/// Gateway instance bound to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInstance {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub description: String,
    pub support: SupportCredentials,
    pub gateway: GatewayInstance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInfo {
    pub name: String,
    /// Canonical form produced by [`crate::phone::normalize`].
    pub phone: String,
}

impl ContactInfo {
    /// E.164 form with a leading `+`, as the support platform stores it.
    pub fn e164(&self) -> String {
        if self.phone.starts_with('+') {
            self.phone.clone()
        } else {
            format!("+{}", self.phone)
        }
    }

    /// Bare digits, as the gateway addresses recipients.
    pub fn gateway_number(&self) -> String {
        self.phone.trim_start_matches('+').to_string()
    }
}

/// A downloaded or transcoded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub bytes: Bytes,
    pub mimetype: String,
    pub filename: String,
}

/// Content of a gateway message, one variant per supported shape.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedMessage {
    Text {
        body: String,
    },
    /// Voice notes and audio files. `attachment` stays empty after decoding
    /// and holds the transcoded file once the media has been fetched.
    Audio {
        mimetype: Option<String>,
        seconds: Option<i64>,
        voice_note: bool,
        attachment: Option<MediaFile>,
    },
    Image {
        url: String,
        caption: Option<String>,
    },
    Document {
        url: String,
        filename: Option<String>,
    },
    /// Known message types that carry nothing worth relaying.
    Unsupported {
        message_type: String,
    },
}

impl NormalizedMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedMessage::Text { .. } => "text",
            NormalizedMessage::Audio { .. } => "audio",
            NormalizedMessage::Image { .. } => "image",
            NormalizedMessage::Document { .. } => "document",
            NormalizedMessage::Unsupported { .. } => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Open,
    Pending,
    Snoozed,
    Resolved,
}

impl ConversationStatus {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("resolved") => ConversationStatus::Resolved,
            Some("pending") => ConversationStatus::Pending,
            Some("snoozed") => ConversationStatus::Snoozed,
            _ => ConversationStatus::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationRef {
    pub id: i64,
    pub inbox_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportConversation {
    pub id: i64,
    pub inbox_id: i64,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInboxBinding {
    pub source_id: String,
    pub inbox_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportContact {
    pub id: i64,
    pub name: String,
    pub phone_number: Option<String>,
    pub contact_inboxes: Vec<ContactInboxBinding>,
}

impl SupportContact {
    pub fn binding_for(&self, inbox_id: i64) -> Option<&ContactInboxBinding> {
        self.contact_inboxes.iter().find(|b| b.inbox_id == inbox_id)
    }
}

/// Message posted into a support-platform conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SupportMessage {
    pub content: Option<String>,
    pub attachment: Option<MediaFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Document,
}

impl MediaKind {
    /// Classify a support-platform attachment `file_type`.
    pub fn from_file_type(file_type: &str) -> Option<Self> {
        match file_type.trim().to_lowercase().as_str() {
            "audio" => Some(MediaKind::Audio),
            "image" => Some(MediaKind::Image),
            "file" | "document" => Some(MediaKind::Document),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
            MediaKind::Document => "document",
        }
    }
}

/// Attachment forwarded to the gateway by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub url: String,
    pub filename: Option<String>,
}

/// One agent reply ready for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundPayload {
    pub text: Option<String>,
    pub media: Option<OutboundMedia>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub connection_status: String,
    pub owner_jid: Option<String>,
}

/// What the relay did with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayOutcome {
    Relayed { messages: usize },
    Skipped { reason: String },
}

impl RelayOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        RelayOutcome::Skipped {
            reason: reason.into(),
        }
    }
}
