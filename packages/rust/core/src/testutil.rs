//! In-memory transport double shared by publisher and pipeline tests.

use std::sync::Mutex;

use async_trait::async_trait;

use rosterboard_embeds::WebhookPayload;
use rosterboard_shared::{MessageRef, Result, RosterboardError};
use rosterboard_webhook::Transport;

/// Records every send/delete; failures are injected per matching title.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<WebhookPayload>>,
    deleted: Mutex<Vec<MessageRef>>,
    fail_sends_matching: Mutex<Option<String>>,
    fail_deletes: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any send whose first embed title contains `needle`.
    pub fn fail_sends_containing(&self, needle: &str) {
        *self.fail_sends_matching.lock().unwrap() = Some(needle.to_string());
    }

    /// Fail every delete.
    pub fn fail_all_deletes(&self) {
        *self.fail_deletes.lock().unwrap() = true;
    }

    /// Titles of every payload sent, in order.
    pub fn sent_titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|p| p.embeds.first().map(|e| e.title.clone()))
            .collect()
    }

    /// Message ids of every delete issued, in order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.message_id.clone())
            .collect()
    }

    /// Total transport calls (sends + deletes).
    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len() + self.deleted.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, payload: &WebhookPayload) -> Result<MessageRef> {
        let title = payload
            .embeds
            .first()
            .map(|e| e.title.clone())
            .unwrap_or_default();

        if let Some(needle) = self.fail_sends_matching.lock().unwrap().as_deref() {
            if title.contains(needle) {
                return Err(RosterboardError::Transport(format!(
                    "mock send failure for {title}"
                )));
            }
        }

        let message_id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("msg-{}", *next)
        };

        self.sent.lock().unwrap().push(payload.clone());
        Ok(MessageRef {
            channel_id: "chan".into(),
            message_id,
        })
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        if *self.fail_deletes.lock().unwrap() {
            return Err(RosterboardError::Transport("mock delete failure".into()));
        }
        self.deleted.lock().unwrap().push(message.clone());
        Ok(())
    }
}
