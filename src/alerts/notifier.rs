//! Notification handlers for alert transitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::lifecycle::Transition;
use crate::data::{Alert, ShipmentId};

/// Notification target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Notifier for opened, escalated and closed alerts
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl Notifier {
    /// Create a new notifier
    pub fn new(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    /// Log-only notifier
    pub fn log_only() -> Self {
        Self::new(vec![NotifyTarget::Log])
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    /// Whether a transition is worth telling anyone about
    pub fn is_notable(transition: &Transition) -> bool {
        matches!(
            transition,
            Transition::Opened { .. } | Transition::Escalated { .. } | Transition::Closed { .. }
        )
    }

    /// Send notification to all targets for a transition
    pub async fn notify(&self, transition: &Transition) -> Result<(), NotifierError> {
        let Some(alert) = transition.alert() else {
            return Ok(());
        };
        if !Self::is_notable(transition) {
            return Ok(());
        }

        let message = describe(transition, alert);
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(transition, alert, target, &message).await {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NotifierError::Multiple(errors)),
        }
    }

    /// Send notification to a single target
    async fn notify_target(
        &self,
        transition: &Transition,
        alert: &Alert,
        target: &NotifyTarget,
        message: &str,
    ) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    alert_id = %alert.id,
                    shipment_id = %alert.shipment_id,
                    sensor_type = %alert.sensor_type,
                    transition = transition.name(),
                    "{}",
                    message
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => {
                self.send_webhook(transition, alert, url, headers, message)
                    .await
            }
        }
    }

    /// Send webhook notification
    async fn send_webhook(
        &self,
        transition: &Transition,
        alert: &Alert,
        url: &str,
        headers: &HashMap<String, String>,
        message: &str,
    ) -> Result<(), NotifierError> {
        let payload = WebhookPayload {
            transition: transition.name(),
            message,
            shipment_id: &alert.shipment_id,
            alert,
            compromised: matches!(transition, Transition::Closed { compromised: true, .. }),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let mut request = self.client.post(url).json(&payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            NotifierError::Webhook(format!("Failed to send webhook: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            alert_id = %alert.id,
            url = %url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::log_only()
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    transition: &'static str,
    message: &'a str,
    shipment_id: &'a ShipmentId,
    alert: &'a Alert,
    compromised: bool,
    timestamp: String,
}

fn describe(transition: &Transition, alert: &Alert) -> String {
    match transition {
        Transition::Opened { .. } => format!(
            "{} alert opened for {} on shipment {}: value {:.2}",
            alert.severity, alert.sensor_type, alert.shipment_id, alert.peak_value
        ),
        Transition::Escalated { from, .. } => format!(
            "Alert {} on shipment {} escalated {} -> {} (peak {:.2})",
            alert.id, alert.shipment_id, from, alert.severity, alert.peak_value
        ),
        Transition::Closed { compromised, .. } => format!(
            "{} alert {} for {} on shipment {} closed after {} readings{}",
            alert.severity,
            alert.id,
            alert.sensor_type,
            alert.shipment_id,
            alert.triggering_readings.len(),
            if *compromised { "; shipment compromised" } else { "" }
        ),
        Transition::Extended { .. } | Transition::None => String::new(),
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
