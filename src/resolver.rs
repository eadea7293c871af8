//! Find-or-create of the support-platform objects a relayed message lands in.
//!
//! Every step checks before it creates, so resolving the same phone twice
//! with no remote change in between performs no second create. Two concurrent
//! resolutions for a contact that has no conversation yet can still both
//! create one: the platform offers no get-or-create primitive and the relay
//! does not lock across requests.

use crate::channels::support::SupportApi;
use crate::error::RelayError;
use crate::phone;
use crate::types::{
    ContactInboxBinding, ContactInfo, ConversationRef, ConversationStatus, SupportContact,
    SupportConversation, SupportCredentials,
};
use tracing::{debug, info};

pub struct ContactResolver<'a> {
    support: &'a dyn SupportApi,
    creds: &'a SupportCredentials,
}

impl<'a> ContactResolver<'a> {
    pub fn new(support: &'a dyn SupportApi, creds: &'a SupportCredentials) -> Self {
        Self { support, creds }
    }

    pub async fn resolve(&self, contact: &ContactInfo) -> Result<ConversationRef, RelayError> {
        let found = self.find_or_create_contact(contact).await?;
        let binding = self.find_or_create_binding(&found).await?;

        let conversations = self
            .support
            .list_contact_conversations(self.creds, found.id)
            .await?;
        if let Some(existing) = pick_conversation(&conversations, self.creds.inbox_id) {
            debug!(conversation_id = existing.id, contact_id = found.id, "reusing conversation");
            return Ok(ConversationRef {
                id: existing.id,
                inbox_id: existing.inbox_id,
            });
        }

        let created = self
            .support
            .create_conversation(self.creds, &binding.source_id)
            .await?;
        info!(conversation_id = created.id, contact_id = found.id, "created conversation");
        Ok(created)
    }

    async fn find_or_create_contact(&self, contact: &ContactInfo) -> Result<SupportContact, RelayError> {
        let candidates = self.support.search_contact(self.creds, &contact.e164()).await?;
        if let Some(found) = pick_contact(candidates, &contact.phone) {
            return Ok(found);
        }
        let created = self.support.create_contact(self.creds, contact).await?;
        info!(contact_id = created.id, "created contact");
        Ok(created)
    }

    async fn find_or_create_binding(&self, contact: &SupportContact) -> Result<ContactInboxBinding, RelayError> {
        if let Some(binding) = contact.binding_for(self.creds.inbox_id) {
            if !binding.source_id.is_empty() {
                return Ok(binding.clone());
            }
        }
        let binding = self
            .support
            .create_contact_inbox(self.creds, contact.id)
            .await?;
        if binding.source_id.trim().is_empty() {
            return Err(RelayError::Binding(format!(
                "no source id for contact {} on inbox {}",
                contact.id, self.creds.inbox_id
            )));
        }
        Ok(binding)
    }
}

/// Search is fuzzy on the platform side (name, email and phone substrings),
/// so only a candidate whose phone matches digit for digit is accepted.
fn pick_contact(candidates: Vec<SupportContact>, number: &str) -> Option<SupportContact> {
    let wanted = phone::digits(number);
    candidates.into_iter().find(|c| {
        c.phone_number
            .as_deref()
            .map(|p| phone::digits(p) == wanted)
            .unwrap_or(false)
    })
}

/// First conversation on the inbox, preferring one that is not resolved.
/// The platform does not guarantee list order.
fn pick_conversation(conversations: &[SupportConversation], inbox_id: i64) -> Option<&SupportConversation> {
    let on_inbox = || conversations.iter().filter(move |c| c.inbox_id == inbox_id);
    on_inbox()
        .find(|c| c.status != ConversationStatus::Resolved)
        .or_else(|| on_inbox().next())
}
