pub mod notifier;
pub mod rules;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::AlertError;
use crate::types::alert::{Alert, AlertState, AlertType};
use crate::types::config::AlertThresholds;
use crate::types::webhook::WebhookEvent;

use self::rules::{Finding, Trigger};

/// A lifecycle change worth telling subscribers about.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    Raised(Alert),
    Resolved(Alert),
}

impl AlertTransition {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertTransition::Raised(a) | AlertTransition::Resolved(a) => a,
        }
    }

    pub fn webhook_event(&self) -> WebhookEvent {
        match self {
            AlertTransition::Raised(_) => WebhookEvent::AlertRaised,
            AlertTransition::Resolved(_) => WebhookEvent::AlertResolved,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenAlert {
    alert_id: String,
    clear_streak: u32,
}

/// Owns every alert of one stream. At most one unresolved alert exists per
/// alert type; its id is `{stream_id}:{alert_type}:{generation}`.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    stream_id: String,
    resolve_after_cycles: u32,
    resolve_cooldown: Duration,
    history_retention: Duration,
    alerts: Vec<Alert>,
    open: HashMap<AlertType, OpenAlert>,
    generations: HashMap<AlertType, u32>,
}

impl AlertEngine {
    pub fn new(stream_id: impl Into<String>, thresholds: &AlertThresholds) -> Self {
        let mut engine = Self {
            stream_id: stream_id.into(),
            resolve_after_cycles: 0,
            resolve_cooldown: Duration::zero(),
            history_retention: Duration::zero(),
            alerts: Vec::new(),
            open: HashMap::new(),
            generations: HashMap::new(),
        };
        engine.reconfigure(thresholds);
        engine
    }

    pub fn reconfigure(&mut self, thresholds: &AlertThresholds) {
        self.resolve_after_cycles = thresholds.resolve_after_cycles.max(1);
        self.resolve_cooldown = Duration::seconds(thresholds.resolve_cooldown_secs.max(0));
        self.history_retention = Duration::seconds(thresholds.history_retention_secs.max(0));
    }

    /// Applies one evaluation cycle's findings.
    pub fn apply(&mut self, findings: Vec<Finding>, now: DateTime<Utc>) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();
        for finding in findings {
            match finding.trigger {
                Some(trigger) => {
                    if let Some(alert) = self.raise(finding.alert_type, trigger, now) {
                        transitions.push(AlertTransition::Raised(alert));
                    }
                }
                None => {
                    if let Some(alert) = self.clear(finding.alert_type, now) {
                        transitions.push(AlertTransition::Resolved(alert));
                    }
                }
            }
        }
        transitions
    }

    /// Opens a new alert, or refreshes the open one. Returns the alert only
    /// when it is new.
    pub fn raise(
        &mut self,
        alert_type: AlertType,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if let Some(open) = self.open.get_mut(&alert_type) {
            open.clear_streak = 0;
            let alert_id = open.alert_id.clone();
            if let Some(alert) = self.find_mut(&alert_id) {
                alert.last_triggered_at = now;
                alert.metadata = trigger.metadata;
            }
            return None;
        }

        let generation = self.generations.entry(alert_type).or_insert(0);
        *generation += 1;
        let alert = Alert {
            alert_id: format!("{}:{}:{}", self.stream_id, alert_type.as_str(), generation),
            stream_id: self.stream_id.clone(),
            alert_type,
            severity: trigger.severity,
            message: trigger.message,
            timestamp: now,
            last_triggered_at: now,
            metadata: trigger.metadata,
            acknowledged: false,
            resolved: false,
            resolved_at: None,
        };
        info!(
            stream_id = %self.stream_id,
            alert_id = %alert.alert_id,
            severity = alert.severity.as_str(),
            "alert raised: {}",
            alert.message
        );
        self.open.insert(
            alert_type,
            OpenAlert {
                alert_id: alert.alert_id.clone(),
                clear_streak: 0,
            },
        );
        self.alerts.push(alert.clone());
        Some(alert)
    }

    /// Counts a clear cycle; resolves once the streak or cooldown is reached.
    fn clear(&mut self, alert_type: AlertType, now: DateTime<Utc>) -> Option<Alert> {
        let open = self.open.get_mut(&alert_type)?;
        open.clear_streak += 1;
        let streak = open.clear_streak;
        let alert_id = open.alert_id.clone();

        let quiet_for = self
            .find(&alert_id)
            .map(|a| now - a.last_triggered_at)
            .unwrap_or_else(Duration::zero);
        if streak < self.resolve_after_cycles && quiet_for < self.resolve_cooldown {
            return None;
        }
        debug!(stream_id = %self.stream_id, %alert_id, streak, "auto-resolving alert");
        self.resolve(&alert_id, now).ok()
    }

    /// Open or acknowledged → acknowledged. Idempotent.
    pub fn acknowledge(&mut self, alert_id: &str) -> Result<Alert, AlertError> {
        let alert = self
            .find_mut(alert_id)
            .ok_or_else(|| AlertError::NotFound(alert_id.to_string()))?;
        match alert.state() {
            AlertState::Resolved => Err(AlertError::AlreadyResolved(alert_id.to_string())),
            AlertState::Acknowledged => Ok(alert.clone()),
            AlertState::Open => {
                alert.acknowledged = true;
                Ok(alert.clone())
            }
        }
    }

    /// Resolution is terminal.
    pub fn resolve(&mut self, alert_id: &str, now: DateTime<Utc>) -> Result<Alert, AlertError> {
        let alert = self
            .find_mut(alert_id)
            .ok_or_else(|| AlertError::NotFound(alert_id.to_string()))?;
        if alert.state() == AlertState::Resolved {
            return Err(AlertError::AlreadyResolved(alert_id.to_string()));
        }
        alert.resolved = true;
        alert.resolved_at = Some(now);
        let resolved = alert.clone();
        self.open.remove(&resolved.alert_type);
        info!(stream_id = %self.stream_id, alert_id, "alert resolved");
        Ok(resolved)
    }

    /// Drops resolved alerts older than the history retention.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.history_retention;
        let before = self.alerts.len();
        self.alerts
            .retain(|a| !a.resolved || a.resolved_at.is_some_and(|at| at >= cutoff));
        before - self.alerts.len()
    }

    pub fn active(&self) -> Vec<Alert> {
        self.alerts.iter().filter(|a| a.is_open()).cloned().collect()
    }

    pub fn history(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn is_open(&self, alert_type: AlertType) -> bool {
        self.open.contains_key(&alert_type)
    }

    fn find(&self, alert_id: &str) -> Option<&Alert> {
        self.alerts.iter().rev().find(|a| a.alert_id == alert_id)
    }

    fn find_mut(&mut self, alert_id: &str) -> Option<&mut Alert> {
        self.alerts.iter_mut().rev().find(|a| a.alert_id == alert_id)
    }
}
