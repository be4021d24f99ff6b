pub mod error;

pub use error::{AlertError, Result};

use std::time::Duration;

/// Delivers alerts by POSTing a JSON payload to a configured webhook.
/// No partial success: Ok strictly means the webhook accepted the message.
pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            url: url.to_string(),
        }
    }

    pub async fn deliver(&self, payload: &serde_json::Value) -> Result<()> {
        let resp = self.client.post(&self.url).json(payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AlertError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
