use crate::error::RelayError;
use crate::types::{GatewayInstance, InstanceStatus, MediaFile, OutboundMedia};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub const UPSERT_EVENT: &str = "messages.upsert";

/// Webhook envelope posted by the gateway. `data` stays raw until the event
/// is known to be a message upsert, since other events carry other shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayWebhook {
    pub event: String,
    #[serde(default)]
    pub instance: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMessageData {
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default, alias = "KeyRemoteJid")]
    pub key_remote_jid: String,
    #[serde(default)]
    pub key_from_me: Option<bool>,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub is_group: Option<bool>,
}

impl GatewayMessageData {
    pub fn is_group(&self) -> bool {
        self.is_group.unwrap_or(false) || self.key_remote_jid.ends_with("@g.us")
    }

    pub fn is_from_me(&self) -> bool {
        self.key_from_me.unwrap_or(false)
    }

    /// Sender number from the remote JID, with a leading `+`.
    /// `5511988776655:3@s.whatsapp.net` yields `+5511988776655`.
    pub fn sender_phone(&self) -> String {
        let user = self
            .key_remote_jid
            .split('@')
            .next()
            .unwrap_or_default()
            .split(':')
            .next()
            .unwrap_or_default();
        format!("+{user}")
    }

    pub fn sender_name(&self) -> Option<String> {
        self.push_name
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
    }
}

/// Operations on the WhatsApp gateway. Everything except instance creation is
/// scoped to one instance and authenticated with its token.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn create_instance(&self, name: &str, description: &str) -> Result<GatewayInstance, RelayError>;
    async fn fetch_instance(&self, instance: &GatewayInstance) -> Result<InstanceStatus, RelayError>;
    /// Returns the base64 pairing QR code.
    async fn connect_instance(&self, instance: &GatewayInstance) -> Result<String, RelayError>;
    async fn logout_instance(&self, instance: &GatewayInstance) -> Result<(), RelayError>;
    async fn delete_instance(&self, instance: &GatewayInstance) -> Result<(), RelayError>;
    async fn set_webhook(&self, instance: &GatewayInstance, url: &str) -> Result<(), RelayError>;
    async fn send_text(&self, instance: &GatewayInstance, number: &str, text: &str) -> Result<(), RelayError>;
    async fn send_media(
        &self,
        instance: &GatewayInstance,
        number: &str,
        media: &OutboundMedia,
        caption: Option<&str>,
    ) -> Result<(), RelayError>;
    async fn send_audio(&self, instance: &GatewayInstance, number: &str, url: &str) -> Result<(), RelayError>;
    /// Download the media of a received message. `message` is the webhook
    /// `data` object as the gateway sent it.
    async fn fetch_media(&self, instance: &GatewayInstance, message: &Value) -> Result<MediaFile, RelayError>;
}

#[derive(Debug, Deserialize)]
struct RawAuth {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct RawCreatedInstance {
    name: String,
    #[serde(rename = "Auth")]
    auth: Option<RawAuth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstance {
    #[serde(default)]
    name: String,
    #[serde(default)]
    connection_status: Option<String>,
    #[serde(default)]
    owner_jid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConnect {
    #[serde(default)]
    base64: Option<String>,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    global_token: Option<String>,
}

impl GatewayClient {
    pub fn new(http: Client, base_url: &str, global_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            global_token,
        }
    }

    fn url(&self, action: &str, instance: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            action,
            utf8_percent_encode(instance, NON_ALPHANUMERIC)
        )
    }

    fn authorize(&self, req: RequestBuilder, instance: Option<&GatewayInstance>) -> RequestBuilder {
        let req = match &self.global_token {
            Some(token) => req.header("apikey", token),
            None => req,
        };
        match instance {
            Some(instance) => req.bearer_auth(&instance.token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, instance: Option<&GatewayInstance>) -> Result<Response, RelayError> {
        let resp = self.authorize(req, instance).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!("gateway returned {status}: {body}")));
        }
        Ok(resp)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        instance: Option<&GatewayInstance>,
    ) -> Result<T, RelayError> {
        let body = self.send(req, instance).await?.text().await?;
        serde_json::from_str(&body)
            .map_err(|err| RelayError::Upstream(format!("gateway response not understood: {err}")))
    }

    async fn post_message(
        &self,
        action: &str,
        instance: &GatewayInstance,
        body: Value,
    ) -> Result<(), RelayError> {
        let req = self.http.post(self.url(action, &instance.name)).json(&body);
        self.send(req, Some(instance)).await?;
        Ok(())
    }
}

/// Pull `filename` out of a `Content-Disposition` header value.
pub fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn create_instance(&self, name: &str, description: &str) -> Result<GatewayInstance, RelayError> {
        let req = self
            .http
            .post(format!("{}/instance/create", self.base_url))
            .json(&json!({ "instanceName": name, "description": description }));
        let created: RawCreatedInstance = self.call(req, None).await?;
        let token = created.auth.map(|a| a.token).unwrap_or_default();
        if token.is_empty() {
            return Err(RelayError::Upstream(format!(
                "gateway created instance {} without a token",
                created.name
            )));
        }
        Ok(GatewayInstance {
            name: created.name,
            token,
        })
    }

    async fn fetch_instance(&self, instance: &GatewayInstance) -> Result<InstanceStatus, RelayError> {
        let req = self.http.get(self.url("instance/fetchInstance", &instance.name));
        let raw: RawInstance = self.call(req, Some(instance)).await?;
        Ok(InstanceStatus {
            name: if raw.name.is_empty() { instance.name.clone() } else { raw.name },
            connection_status: raw.connection_status.unwrap_or_else(|| "unknown".to_string()),
            owner_jid: raw.owner_jid.filter(|jid| !jid.is_empty()),
        })
    }

    async fn connect_instance(&self, instance: &GatewayInstance) -> Result<String, RelayError> {
        let req = self.http.get(self.url("instance/connect", &instance.name));
        let raw: RawConnect = self.call(req, Some(instance)).await?;
        raw.base64
            .filter(|qr| !qr.is_empty())
            .ok_or_else(|| RelayError::Upstream("gateway returned no pairing code".to_string()))
    }

    async fn logout_instance(&self, instance: &GatewayInstance) -> Result<(), RelayError> {
        let req = self.http.delete(self.url("instance/logout", &instance.name));
        self.send(req, Some(instance)).await?;
        Ok(())
    }

    async fn delete_instance(&self, instance: &GatewayInstance) -> Result<(), RelayError> {
        let req = self
            .http
            .delete(self.url("instance/delete", &instance.name))
            .query(&[("force", "true")]);
        self.send(req, Some(instance)).await?;
        Ok(())
    }

    async fn set_webhook(&self, instance: &GatewayInstance, url: &str) -> Result<(), RelayError> {
        let body = json!({
            "enabled": true,
            "url": url,
            "events": { "messagesUpsert": true },
        });
        let req = self.http.put(self.url("webhook/set", &instance.name)).json(&body);
        self.send(req, Some(instance)).await?;
        Ok(())
    }

    async fn send_text(&self, instance: &GatewayInstance, number: &str, text: &str) -> Result<(), RelayError> {
        let body = json!({
            "number": number,
            "textMessage": { "text": text },
        });
        self.post_message("message/sendText", instance, body).await
    }

    async fn send_media(
        &self,
        instance: &GatewayInstance,
        number: &str,
        media: &OutboundMedia,
        caption: Option<&str>,
    ) -> Result<(), RelayError> {
        let mut message = json!({
            "mediatype": media.kind.as_str(),
            "media": media.url,
        });
        if let Some(caption) = caption {
            message["caption"] = json!(caption);
        }
        if let Some(filename) = &media.filename {
            message["fileName"] = json!(filename);
        }
        let body = json!({ "number": number, "mediaMessage": message });
        self.post_message("message/sendMedia", instance, body).await
    }

    async fn send_audio(&self, instance: &GatewayInstance, number: &str, url: &str) -> Result<(), RelayError> {
        let body = json!({
            "number": number,
            "audioMessage": { "audio": url },
        });
        self.post_message("message/sendWhatsAppAudio", instance, body).await
    }

    async fn fetch_media(&self, instance: &GatewayInstance, message: &Value) -> Result<MediaFile, RelayError> {
        let req = self
            .http
            .post(self.url("chat/mediaData", &instance.name))
            .query(&[("binary", "true")])
            .json(message);
        let resp = self.send(req, Some(instance)).await?;
        let header = |name: HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let mimetype = header(CONTENT_TYPE).unwrap_or_else(|| "application/octet-stream".to_string());
        let filename = header(CONTENT_DISPOSITION)
            .as_deref()
            .and_then(disposition_filename)
            .unwrap_or_else(|| "media".to_string());
        let bytes = resp.bytes().await?;
        Ok(MediaFile {
            bytes,
            mimetype,
            filename,
        })
    }
}
