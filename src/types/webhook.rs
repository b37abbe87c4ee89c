use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    AlertRaised,
    AlertResolved,
    StreamDown,
    StreamUp,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 4] = [
        WebhookEvent::AlertRaised,
        WebhookEvent::AlertResolved,
        WebhookEvent::StreamDown,
        WebhookEvent::StreamUp,
    ];
}

fn default_events() -> Vec<WebhookEvent> {
    WebhookEvent::ALL.to_vec()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub events: Vec<WebhookEvent>,
    pub headers: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    pub fn wants(&self, event: WebhookEvent) -> bool {
        self.enabled && self.events.contains(&event)
    }
}

/// Payload for creating a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_events")]
    pub events: Vec<WebhookEvent>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub enabled: Option<bool>,
    pub events: Option<Vec<WebhookEvent>>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub webhook_id: String,
    pub success: bool,
    pub attempts: u32,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}
