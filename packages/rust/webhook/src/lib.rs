//! Messaging transport: the send/delete seam and its Discord webhook
//! implementation.
//!
//! The [`Transport`] trait is the boundary the publication manager talks to;
//! tests substitute an in-memory implementation. The real transport executes
//! the webhook with `?wait=true` so the created message's ids come back, and
//! honors server-directed rate-limit waits a bounded number of times.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use rosterboard_embeds::WebhookPayload;
use rosterboard_shared::{MessageRef, Result, RosterboardError};

/// User-Agent string for transport requests.
const USER_AGENT: &str = concat!("rosterboard/", env!("CARGO_PKG_VERSION"));

/// Bounded attempts when the transport asks us to slow down.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Outbound messaging operations the publication manager depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload; returns a handle to the created message.
    async fn send(&self, payload: &WebhookPayload) -> Result<MessageRef>;

    /// Retract a previously published message.
    async fn delete(&self, message: &MessageRef) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Discord webhook implementation
// ---------------------------------------------------------------------------

/// Response body of a webhook execute call with `?wait=true`.
#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
    channel_id: String,
}

/// Body of a 429 response; `retry_after` is in seconds.
#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// [`Transport`] backed by a Discord channel webhook.
pub struct WebhookTransport {
    client: Client,
    url: Url,
}

impl WebhookTransport {
    /// Create a transport for the given webhook URL.
    pub fn new(url: Url, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                RosterboardError::Transport(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, url })
    }

    /// The execute endpoint, asking the server to return the created message.
    fn execute_url(&self) -> Url {
        let mut url = self.url.clone();
        url.set_query(Some("wait=true"));
        url
    }

    /// The per-message endpoint used for deletion.
    fn message_url(&self, message_id: &str) -> Url {
        let mut url = self.url.clone();
        let path = format!("{}/messages/{message_id}", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    #[instrument(skip_all)]
    async fn send(&self, payload: &WebhookPayload) -> Result<MessageRef> {
        let url = self.execute_url();
        let mut attempt = 0u32;

        loop {
            let response = self
                .client
                .post(url.clone())
                .json(payload)
                .send()
                .await
                .map_err(|e| RosterboardError::Transport(format!("send: {e}")))?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait_secs = response
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(1.0);

                attempt += 1;
                if attempt > MAX_RATE_LIMIT_RETRIES {
                    return Err(RosterboardError::Transport(format!(
                        "send: still rate limited after {MAX_RATE_LIMIT_RETRIES} retries"
                    )));
                }
                warn!(wait_secs, attempt, "rate limited, waiting before retry");
                tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
                continue;
            }

            if !status.is_success() {
                return Err(RosterboardError::Transport(format!("send: HTTP {status}")));
            }

            let created: CreatedMessage = response
                .json()
                .await
                .map_err(|e| RosterboardError::Transport(format!("send: invalid response: {e}")))?;

            debug!(message_id = %created.id, channel_id = %created.channel_id, "message published");
            return Ok(MessageRef {
                channel_id: created.channel_id,
                message_id: created.id,
            });
        }
    }

    #[instrument(skip_all, fields(message_id = %message.message_id))]
    async fn delete(&self, message: &MessageRef) -> Result<()> {
        let url = self.message_url(&message.message_id);

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| RosterboardError::Transport(format!("delete: {e}")))?;

        let status = response.status();

        // Already gone counts as retired.
        if status == StatusCode::NOT_FOUND {
            debug!("message already deleted");
            return Ok(());
        }

        if !status.is_success() {
            return Err(RosterboardError::Transport(format!("delete: HTTP {status}")));
        }

        debug!("message deleted");
        Ok(())
    }
}
