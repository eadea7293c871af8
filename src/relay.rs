//! The two relay directions. Each call is a self-contained transaction against
//! one session's credentials; nothing is cached between calls.

use crate::channels::gateway::{GatewayApi, GatewayMessageData, GatewayWebhook, UPSERT_EVENT};
use crate::channels::support::{outbound_payload, SupportApi, SupportWebhook};
use crate::content;
use crate::error::RelayError;
use crate::phone;
use crate::resolver::ContactResolver;
use crate::transcode::Transcoder;
use crate::types::{
    ContactInfo, MediaKind, NormalizedMessage, OutboundPayload, RelayOutcome, Session,
    SupportMessage,
};
use tracing::{debug, info};

pub struct RelayEngine<'a> {
    session: &'a Session,
    support: &'a dyn SupportApi,
    gateway: &'a dyn GatewayApi,
    transcoder: &'a dyn Transcoder,
}

impl<'a> RelayEngine<'a> {
    pub fn new(
        session: &'a Session,
        support: &'a dyn SupportApi,
        gateway: &'a dyn GatewayApi,
        transcoder: &'a dyn Transcoder,
    ) -> Self {
        Self {
            session,
            support,
            gateway,
            transcoder,
        }
    }

    /// WhatsApp user -> support inbox.
    pub async fn relay_from_gateway(&self, event: &GatewayWebhook) -> Result<RelayOutcome, RelayError> {
        if event.event != UPSERT_EVENT {
            return Ok(self.skip(format!("event {} is not relayed", event.event)));
        }
        let data: GatewayMessageData = serde_json::from_value(event.data.clone())
            .map_err(|err| RelayError::Decode(format!("gateway message data: {err}")))?;
        if data.is_group() {
            return Ok(self.skip("group message"));
        }
        if data.is_from_me() {
            return Ok(self.skip("sent by this instance"));
        }

        let phone = phone::normalize(&data.sender_phone())?;
        let contact = ContactInfo {
            name: data.sender_name().unwrap_or_else(|| phone.clone()),
            phone,
        };

        let decoded = match content::decode_value(&data.message_type, &data.content)? {
            NormalizedMessage::Audio {
                mimetype,
                seconds,
                voice_note,
                attachment: None,
            } => {
                let original = self
                    .gateway
                    .fetch_media(&self.session.gateway, &event.data)
                    .await?;
                NormalizedMessage::Audio {
                    mimetype,
                    seconds,
                    voice_note,
                    attachment: Some(self.transcoder.transcode(&original).await?),
                }
            }
            other => other,
        };

        let message = match decoded {
            NormalizedMessage::Text { body } => {
                if body.trim().is_empty() {
                    return Ok(self.skip("empty text"));
                }
                SupportMessage {
                    content: Some(body),
                    attachment: None,
                }
            }
            NormalizedMessage::Audio { attachment, .. } => SupportMessage {
                content: None,
                attachment,
            },
            other @ (NormalizedMessage::Image { .. } | NormalizedMessage::Document { .. }) => {
                return Err(RelayError::UnsupportedContent(format!(
                    "{} messages are not relayed to the support inbox",
                    other.kind()
                )));
            }
            NormalizedMessage::Unsupported { message_type } => {
                return Ok(self.skip(format!("{message_type} carries no content")));
            }
        };

        let conversation = ContactResolver::new(self.support, &self.session.support)
            .resolve(&contact)
            .await?;
        self.support
            .create_message(&self.session.support, &conversation, &message)
            .await?;

        let kind = if message.attachment.is_some() { "audio" } else { "text" };
        info!(
            session_id = %self.session.id,
            conversation_id = conversation.id,
            kind,
            "relayed gateway message"
        );
        Ok(RelayOutcome::Relayed { messages: 1 })
    }

    /// Agent reply -> WhatsApp user. Messages go out in order and the first
    /// failure stops the batch; earlier sends are not undone.
    pub async fn relay_from_support(&self, event: &SupportWebhook) -> Result<RelayOutcome, RelayError> {
        if !event.is_agent_reply() {
            return Ok(self.skip("not a public agent reply"));
        }
        let raw_phone = event
            .recipient()
            .and_then(|s| s.phone_number.as_deref())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| RelayError::Validation("conversation has no recipient phone".to_string()))?;
        let contact = ContactInfo {
            name: event
                .recipient()
                .and_then(|s| s.name.clone())
                .unwrap_or_default(),
            phone: phone::normalize(raw_phone)?,
        };
        let number = contact.gateway_number();

        let mut sent = 0;
        for message in event.messages() {
            sent += self.dispatch(&number, outbound_payload(&message)).await?;
        }
        if sent == 0 {
            return Ok(self.skip("nothing to forward"));
        }

        info!(session_id = %self.session.id, messages = sent, "relayed agent reply");
        Ok(RelayOutcome::Relayed { messages: sent })
    }

    async fn dispatch(&self, number: &str, payload: OutboundPayload) -> Result<usize, RelayError> {
        let instance = &self.session.gateway;
        let text = payload.text.as_deref();
        match (&payload.media, text) {
            (Some(media), text) if media.kind == MediaKind::Audio => {
                let mut sent = 0;
                if let Some(text) = text {
                    self.gateway.send_text(instance, number, text).await?;
                    sent += 1;
                }
                self.gateway.send_audio(instance, number, &media.url).await?;
                Ok(sent + 1)
            }
            (Some(media), caption) => {
                self.gateway.send_media(instance, number, media, caption).await?;
                Ok(1)
            }
            (None, Some(text)) => {
                self.gateway.send_text(instance, number, text).await?;
                Ok(1)
            }
            (None, None) => Ok(0),
        }
    }

    fn skip(&self, reason: impl Into<String>) -> RelayOutcome {
        let reason = reason.into();
        debug!(session_id = %self.session.id, "skipped event: {reason}");
        RelayOutcome::skipped(reason)
    }
}
