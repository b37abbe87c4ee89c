//! Webhook delivery with bounded exponential backoff.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::types::alert::Alert;
use crate::types::config::RetryPolicy;
use crate::types::health::StreamStatus;
use crate::types::webhook::{DeliveryOutcome, WebhookEvent, WebhookSubscription};

/// Body POSTed to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    pub event_type: WebhookEvent,
    pub timestamp: DateTime<Utc>,
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Alert(Alert),
    StreamStatus {
        stream_id: String,
        stream_name: String,
        status: StreamStatus,
        previous: StreamStatus,
    },
    Test {
        message: String,
    },
}

/// Delay before retry number `attempt` (1-based): base · 2^(attempt-1), capped.
pub fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(20);
    let delay = policy.base_delay_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay.min(policy.max_delay_ms))
}

pub struct WebhookNotifier {
    client: Client,
    subscriptions: RwLock<Arc<Vec<WebhookSubscription>>>,
    policy: RwLock<RetryPolicy>,
}

impl WebhookNotifier {
    pub fn new(policy: RetryPolicy) -> Result<Self, String> {
        let client = Client::builder().build().map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            subscriptions: RwLock::new(Arc::new(Vec::new())),
            policy: RwLock::new(policy),
        })
    }

    pub fn replace_subscriptions(&self, subscriptions: Vec<WebhookSubscription>) {
        let mut guard = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(subscriptions);
    }

    pub fn set_policy(&self, policy: RetryPolicy) {
        let mut guard = self.policy.write().unwrap_or_else(|e| e.into_inner());
        *guard = policy;
    }

    fn policy(&self) -> RetryPolicy {
        self.policy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Enabled subscriptions that listen for `event`.
    pub fn subscribers(&self, event: WebhookEvent) -> Vec<WebhookSubscription> {
        let subs = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        subs.iter().filter(|s| s.wants(event)).cloned().collect()
    }

    /// One POST, no retries. Returns the HTTP status on a 2xx response.
    pub async fn send_once(
        &self,
        subscription: &WebhookSubscription,
        envelope: &WebhookEnvelope,
    ) -> Result<u16, (Option<u16>, String)> {
        // Read per request so `set_policy` applies to the next send.
        let timeout = Duration::from_secs(self.policy().timeout_secs.max(1));
        let mut request = self
            .client
            .post(&subscription.url)
            .timeout(timeout)
            .json(envelope);
        for (name, value) in &subscription.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(|e| (None, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err((Some(status.as_u16()), format!("HTTP {status}")))
        }
    }

    /// Delivers with retries. Failure after the last attempt is logged and
    /// reported, never propagated.
    pub async fn deliver(
        &self,
        subscription: &WebhookSubscription,
        envelope: &WebhookEnvelope,
    ) -> DeliveryOutcome {
        let policy = self.policy();
        let max_attempts = policy.max_attempts.max(1);
        let mut last_status = None;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.send_once(subscription, envelope).await {
                Ok(status) => {
                    info!(
                        webhook_id = %subscription.id,
                        event = ?envelope.event_type,
                        attempt,
                        "webhook delivered"
                    );
                    return DeliveryOutcome {
                        webhook_id: subscription.id.clone(),
                        success: true,
                        attempts: attempt,
                        status_code: Some(status),
                        error: None,
                    };
                }
                Err((status, err)) => {
                    last_status = status;
                    last_error = Some(err.clone());
                    if attempt < max_attempts {
                        let delay = calculate_backoff(&policy, attempt);
                        warn!(
                            webhook_id = %subscription.id,
                            attempt,
                            max_attempts,
                            error = %err,
                            "webhook delivery failed, retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(
            webhook_id = %subscription.id,
            url = %subscription.url,
            attempts = max_attempts,
            "webhook delivery failed permanently"
        );
        DeliveryOutcome {
            webhook_id: subscription.id.clone(),
            success: false,
            attempts: max_attempts,
            status_code: last_status,
            error: last_error,
        }
    }

    /// Single-attempt test delivery for the webhook CRUD surface.
    pub async fn test(&self, subscription: &WebhookSubscription) -> DeliveryOutcome {
        let envelope = WebhookEnvelope {
            event_type: WebhookEvent::AlertRaised,
            timestamp: Utc::now(),
            payload: WebhookPayload::Test {
                message: format!("Test delivery for webhook '{}'", subscription.name),
            },
        };
        match self.send_once(subscription, &envelope).await {
            Ok(status) => DeliveryOutcome {
                webhook_id: subscription.id.clone(),
                success: true,
                attempts: 1,
                status_code: Some(status),
                error: None,
            },
            Err((status, err)) => DeliveryOutcome {
                webhook_id: subscription.id.clone(),
                success: false,
                attempts: 1,
                status_code: status,
                error: Some(err),
            },
        }
    }
}
