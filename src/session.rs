use crate::channels::gateway::GatewayApi;
use crate::config::webhook_url;
use crate::db::SessionStore;
use crate::error::RelayError;
use crate::types::{InstanceStatus, Session, SupportCredentials};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_SESSION_ID_LEN: usize = 64;

pub fn validate_session_id(id: &str) -> Result<(), RelayError> {
    if id.is_empty() {
        return Err(RelayError::Validation("session id is empty".to_string()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(RelayError::Validation(format!(
            "session id longer than {MAX_SESSION_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RelayError::Validation(format!(
            "session id {id:?} may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

fn validate_credentials(creds: &SupportCredentials) -> Result<(), RelayError> {
    if creds.token.trim().is_empty() {
        return Err(RelayError::Validation("support token is required".to_string()));
    }
    if creds.account_id <= 0 || creds.inbox_id <= 0 {
        return Err(RelayError::Validation(
            "support account id and inbox id must be positive".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Owns session records and the gateway instance provisioned for each.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn GatewayApi>,
    public_url: String,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, gateway: Arc<dyn GatewayApi>, public_url: &str) -> Self {
        Self {
            store,
            gateway,
            public_url: public_url.to_string(),
        }
    }

    pub fn gateway_webhook_url(&self, session_id: &str) -> String {
        webhook_url(&self.public_url, "gateway", session_id)
    }

    pub fn support_webhook_url(&self, session_id: &str) -> String {
        webhook_url(&self.public_url, "support", session_id)
    }

    /// Provision a gateway instance named after the session, persist the
    /// record and point the instance's webhook at this relay. A failure after
    /// provisioning undoes what was done so the id can be reused.
    pub async fn create(
        &self,
        requested_id: Option<&str>,
        description: &str,
        support: SupportCredentials,
    ) -> Result<Session, RelayError> {
        let id = match requested_id.map(str::trim) {
            Some(id) => {
                validate_session_id(id)?;
                id.to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        validate_credentials(&support)?;

        if self.store.get(&id).await?.is_some() {
            return Err(RelayError::SessionExists(id));
        }

        let gateway = self.gateway.create_instance(&id, description).await?;
        let session = Session {
            id: id.clone(),
            description: description.to_string(),
            support,
            gateway,
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.insert(&session).await {
            self.discard_instance(&session).await;
            return Err(err);
        }

        let hook = self.gateway_webhook_url(&id);
        if let Err(err) = self.gateway.set_webhook(&session.gateway, &hook).await {
            self.discard_instance(&session).await;
            if let Err(del) = self.store.delete(&id).await {
                warn!(session_id = %id, "rollback could not remove session record: {del}");
            }
            return Err(err);
        }

        info!(session_id = %id, instance = %session.gateway.name, "session created");
        Ok(session)
    }

    async fn discard_instance(&self, session: &Session) {
        if let Err(err) = self.gateway.delete_instance(&session.gateway).await {
            warn!(
                session_id = %session.id,
                instance = %session.gateway.name,
                "rollback could not delete gateway instance: {err}"
            );
        }
    }

    pub async fn get(&self, id: &str) -> Result<Session, RelayError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("session {id}")))
    }

    /// Logout then delete the gateway instance, then remove the local record.
    /// Gateway failures do not block the local removal and come back as a
    /// warning; a local failure is an error.
    pub async fn delete(&self, id: &str) -> Result<DeleteReport, RelayError> {
        let session = self.get(id).await?;
        let mut problems = Vec::new();

        if let Err(err) = self.gateway.logout_instance(&session.gateway).await {
            problems.push(format!("logout failed: {err}"));
        }
        if let Err(err) = self.gateway.delete_instance(&session.gateway).await {
            problems.push(format!("instance delete failed: {err}"));
        }

        self.store.delete(id).await?;

        let warning = if problems.is_empty() {
            None
        } else {
            let joined = problems.join("; ");
            warn!(session_id = %id, "session removed locally, gateway cleanup incomplete: {joined}");
            Some(joined)
        };
        info!(session_id = %id, "session deleted");
        Ok(DeleteReport {
            session_id: id.to_string(),
            warning,
        })
    }

    pub async fn connect(&self, id: &str) -> Result<String, RelayError> {
        let session = self.get(id).await?;
        self.gateway.connect_instance(&session.gateway).await
    }

    pub async fn status(&self, id: &str) -> Result<InstanceStatus, RelayError> {
        let session = self.get(id).await?;
        self.gateway.fetch_instance(&session.gateway).await
    }
}
