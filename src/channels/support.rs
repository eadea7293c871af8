use crate::error::RelayError;
use crate::types::{
    ContactInboxBinding, ContactInfo, ConversationRef, ConversationStatus, MediaKind,
    OutboundMedia, OutboundPayload, SupportContact, SupportConversation, SupportCredentials,
    SupportMessage,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// `message_type` is a name on the webhook envelope and a numeric code on
/// nested messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MessageTypeField {
    Name(String),
    Code(i64),
}

impl MessageTypeField {
    pub fn is_outgoing(&self) -> bool {
        match self {
            MessageTypeField::Name(name) => name == "outgoing",
            MessageTypeField::Code(code) => *code == 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportAttachment {
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub data_url: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
}

impl SupportAttachment {
    fn filename(&self) -> Option<String> {
        let url = self.data_url.as_deref()?;
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportWebhookMessage {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub message_type: Option<MessageTypeField>,
    #[serde(default)]
    pub attachments: Option<Vec<SupportAttachment>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportSenderMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportConversationMeta {
    #[serde(default)]
    pub sender: Option<SupportSenderMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportWebhookConversation {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub messages: Option<Vec<SupportWebhookMessage>>,
    #[serde(default)]
    pub meta: Option<SupportConversationMeta>,
}

/// Webhook delivered by the support platform.
#[derive(Debug, Clone, Deserialize)]
pub struct SupportWebhook {
    pub event: String,
    #[serde(default)]
    pub message_type: Option<MessageTypeField>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<SupportAttachment>>,
    #[serde(default)]
    pub conversation: Option<SupportWebhookConversation>,
}

impl SupportWebhook {
    pub fn is_agent_reply(&self) -> bool {
        self.event == "message_created"
            && self
                .message_type
                .as_ref()
                .map(MessageTypeField::is_outgoing)
                .unwrap_or(false)
            && !self.private.unwrap_or(false)
    }

    pub fn recipient(&self) -> Option<&SupportSenderMeta> {
        self.conversation.as_ref()?.meta.as_ref()?.sender.as_ref()
    }

    /// Messages to forward: the batched conversation messages, or the
    /// envelope itself when the batch is empty. Private notes are dropped and
    /// so is anything in the batch not authored by an agent (customer
    /// messages, activity lines).
    pub fn messages(&self) -> Vec<SupportWebhookMessage> {
        let batch = self
            .conversation
            .as_ref()
            .and_then(|c| c.messages.clone())
            .unwrap_or_default();
        let batch = if batch.is_empty() {
            vec![SupportWebhookMessage {
                id: None,
                content: self.content.clone(),
                private: self.private,
                message_type: self.message_type.clone(),
                attachments: self.attachments.clone(),
            }]
        } else {
            batch
        };
        batch
            .into_iter()
            .filter(|m| !m.private.unwrap_or(false))
            .filter(|m| {
                m.message_type
                    .as_ref()
                    .map_or(true, MessageTypeField::is_outgoing)
            })
            .collect()
    }
}

/// Build the gateway payload for one agent reply: the text body plus at most
/// one attachment, classified by its declared `file_type`.
pub fn outbound_payload(message: &SupportWebhookMessage) -> OutboundPayload {
    let text = message
        .content
        .as_ref()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let media = message
        .attachments
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find_map(|att| {
            let url = att.data_url.as_ref().filter(|u| !u.is_empty())?;
            let file_type = att.file_type.as_deref().unwrap_or_default();
            match MediaKind::from_file_type(file_type) {
                Some(kind) => Some(OutboundMedia {
                    kind,
                    url: url.clone(),
                    filename: att.filename(),
                }),
                None => {
                    tracing::warn!("dropping attachment with unsupported file_type {file_type:?}");
                    None
                }
            }
        });

    OutboundPayload { text, media }
}

/// Operations on the support inbox platform, scoped by the caller's credentials.
#[async_trait]
pub trait SupportApi: Send + Sync {
    async fn search_contact(
        &self,
        creds: &SupportCredentials,
        phone: &str,
    ) -> Result<Vec<SupportContact>, RelayError>;

    async fn create_contact(
        &self,
        creds: &SupportCredentials,
        contact: &ContactInfo,
    ) -> Result<SupportContact, RelayError>;

    async fn create_contact_inbox(
        &self,
        creds: &SupportCredentials,
        contact_id: i64,
    ) -> Result<ContactInboxBinding, RelayError>;

    async fn list_contact_conversations(
        &self,
        creds: &SupportCredentials,
        contact_id: i64,
    ) -> Result<Vec<SupportConversation>, RelayError>;

    async fn create_conversation(
        &self,
        creds: &SupportCredentials,
        source_id: &str,
    ) -> Result<ConversationRef, RelayError>;

    async fn create_message(
        &self,
        creds: &SupportCredentials,
        conversation: &ConversationRef,
        message: &SupportMessage,
    ) -> Result<(), RelayError>;
}

#[derive(Debug, Deserialize)]
struct RawInbox {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawContactInbox {
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    inbox: Option<RawInbox>,
    #[serde(default)]
    inbox_id: Option<i64>,
}

impl RawContactInbox {
    fn into_binding(self) -> Option<ContactInboxBinding> {
        let inbox_id = self.inbox.map(|i| i.id).or(self.inbox_id)?;
        Some(ContactInboxBinding {
            source_id: self.source_id.unwrap_or_default(),
            inbox_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawContact {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    contact_inboxes: Option<Vec<RawContactInbox>>,
}

impl From<RawContact> for SupportContact {
    fn from(raw: RawContact) -> Self {
        SupportContact {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            phone_number: raw.phone_number,
            contact_inboxes: raw
                .contact_inboxes
                .unwrap_or_default()
                .into_iter()
                .filter_map(RawContactInbox::into_binding)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawContactList {
    #[serde(default)]
    payload: Vec<RawContact>,
}

#[derive(Debug, Deserialize)]
struct RawCreatedContact {
    contact: RawContact,
    #[serde(default)]
    contact_inbox: Option<RawContactInbox>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCreateContactResponse {
    Wrapped { payload: RawCreatedContact },
    Bare(RawContact),
}

#[derive(Debug, Deserialize)]
struct RawConversation {
    id: i64,
    #[serde(default)]
    inbox_id: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConversationList {
    #[serde(default)]
    payload: Vec<RawConversation>,
}

#[derive(Clone)]
pub struct SupportClient {
    http: Client,
    base_url: String,
}

impl SupportClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, creds: &SupportCredentials, path: &str) -> String {
        format!("{}/api/v1/accounts/{}{}", self.base_url, creds.account_id, path)
    }

    async fn call<T: DeserializeOwned>(&self, creds: &SupportCredentials, req: RequestBuilder) -> Result<T, RelayError> {
        let resp = req.header("api_access_token", &creds.token).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(RelayError::Upstream(format!(
                "support platform returned {status}: {body}"
            )));
        }
        serde_json::from_str(&body).map_err(|err| {
            RelayError::Upstream(format!("support platform response not understood: {err}"))
        })
    }
}

#[async_trait]
impl SupportApi for SupportClient {
    async fn search_contact(
        &self,
        creds: &SupportCredentials,
        phone: &str,
    ) -> Result<Vec<SupportContact>, RelayError> {
        let req = self
            .http
            .get(self.url(creds, "/contacts/search"))
            .query(&[("q", phone)]);
        let list: RawContactList = self.call(creds, req).await?;
        Ok(list.payload.into_iter().map(SupportContact::from).collect())
    }

    async fn create_contact(
        &self,
        creds: &SupportCredentials,
        contact: &ContactInfo,
    ) -> Result<SupportContact, RelayError> {
        let body = json!({
            "inbox_id": creds.inbox_id,
            "name": contact.name,
            "phone_number": contact.e164(),
        });
        let req = self.http.post(self.url(creds, "/contacts")).json(&body);
        let resp: RawCreateContactResponse = self.call(creds, req).await?;
        let contact = match resp {
            RawCreateContactResponse::Wrapped { payload } => {
                let mut contact = SupportContact::from(payload.contact);
                if let Some(binding) = payload.contact_inbox.and_then(RawContactInbox::into_binding) {
                    if contact.binding_for(binding.inbox_id).is_none() {
                        contact.contact_inboxes.push(binding);
                    }
                }
                contact
            }
            RawCreateContactResponse::Bare(raw) => SupportContact::from(raw),
        };
        Ok(contact)
    }

    async fn create_contact_inbox(
        &self,
        creds: &SupportCredentials,
        contact_id: i64,
    ) -> Result<ContactInboxBinding, RelayError> {
        let body = json!({ "inbox_id": creds.inbox_id });
        let req = self
            .http
            .post(self.url(creds, &format!("/contacts/{contact_id}/contact_inboxes")))
            .json(&body);
        let raw: RawContactInbox = self.call(creds, req).await?;
        Ok(raw.into_binding().unwrap_or(ContactInboxBinding {
            source_id: String::new(),
            inbox_id: creds.inbox_id,
        }))
    }

    async fn list_contact_conversations(
        &self,
        creds: &SupportCredentials,
        contact_id: i64,
    ) -> Result<Vec<SupportConversation>, RelayError> {
        let req = self
            .http
            .get(self.url(creds, &format!("/contacts/{contact_id}/conversations")));
        let list: RawConversationList = self.call(creds, req).await?;
        Ok(list
            .payload
            .into_iter()
            .filter_map(|c| {
                Some(SupportConversation {
                    id: c.id,
                    inbox_id: c.inbox_id?,
                    status: ConversationStatus::parse(c.status.as_deref()),
                })
            })
            .collect())
    }

    async fn create_conversation(
        &self,
        creds: &SupportCredentials,
        source_id: &str,
    ) -> Result<ConversationRef, RelayError> {
        let body = json!({
            "source_id": source_id,
            "inbox_id": creds.inbox_id,
        });
        let req = self.http.post(self.url(creds, "/conversations")).json(&body);
        let raw: RawConversation = self.call(creds, req).await?;
        Ok(ConversationRef {
            id: raw.id,
            inbox_id: raw.inbox_id.unwrap_or(creds.inbox_id),
        })
    }

    async fn create_message(
        &self,
        creds: &SupportCredentials,
        conversation: &ConversationRef,
        message: &SupportMessage,
    ) -> Result<(), RelayError> {
        let url = self.url(creds, &format!("/conversations/{}/messages", conversation.id));
        let req = match &message.attachment {
            None => self.http.post(url).json(&json!({
                "content": message.content.clone().unwrap_or_default(),
                "message_type": "incoming",
                "private": false,
            })),
            Some(file) => {
                let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
                    .file_name(file.filename.clone())
                    .mime_str(&file.mimetype)?;
                let mut form = reqwest::multipart::Form::new()
                    .text("message_type", "incoming")
                    .text("private", "false")
                    .part("attachments[]", part);
                if let Some(content) = message.content.as_ref().filter(|c| !c.is_empty()) {
                    form = form.text("content", content.clone());
                }
                self.http.post(url).multipart(form)
            }
        };
        let _: serde_json::Value = self.call(creds, req).await?;
        Ok(())
    }
}
