//! Best-effort failure notifications to a Slack-style incoming webhook
//!
//! Delivery problems are logged and swallowed: a broken webhook must never
//! take down the poll loop that is already dealing with a broken proxy.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Serialize)]
struct WebhookPayload {
    text: String,
    username: String,
}

/// Posts apply-failure messages when a webhook URL is configured
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
    lb_name: String,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>, lb_name: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            webhook_url,
            lb_name: lb_name.to_string(),
        }
    }

    /// Report a failed config apply: the error detail and the exact config
    /// text that failed, so an operator can diagnose without shell access.
    pub async fn config_failed(&self, error: &str, config: &str) {
        let Some(url) = &self.webhook_url else {
            debug!("No notification webhook configured, skipping alert");
            return;
        };

        let payload = WebhookPayload {
            text: failure_text(&self.lb_name, error, config),
            username: format!("Nginx {}", self.lb_name),
        };

        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Failure notification delivered");
            }
            Ok(response) => {
                error!(
                    status = %response.status(),
                    "Notification endpoint rejected the alert"
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to deliver failure notification");
            }
        }
    }
}

fn failure_text(lb_name: &str, error: &str, config: &str) -> String {
    format!(
        "Nginx ({}) config failed:\n*Error:*\n```{}```\n*Config:*\n```{}```",
        lb_name, error, config
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_text_carries_name_error_and_config() {
        let text = failure_text("edge-1", "nginx: [emerg] boom", "upstream api {}\n");

        assert!(text.starts_with("Nginx (edge-1) config failed:"));
        assert!(text.contains("*Error:*\n```nginx: [emerg] boom```"));
        assert!(text.contains("*Config:*\n```upstream api {}\n```"));
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            text: failure_text("edge-1", "err", "conf"),
            username: "Nginx edge-1".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["username"], "Nginx edge-1");
        assert!(json["text"].as_str().unwrap().contains("edge-1"));
    }
}
