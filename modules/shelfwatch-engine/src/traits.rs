// Trait abstractions for the poll pipeline's collaborators.
//
// CatalogSource is the remote fetch boundary; AlertSink is the delivery
// boundary. Both get fake implementations in tests: no network, no webhook.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use shelfwatch_common::CatalogItem;

// ---------------------------------------------------------------------------
// CatalogSource — the remote fetch boundary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the full remote catalog. Items arrive stamped with the fetch
    /// time; the store decides what survives of those stamps.
    async fn fetch_catalog(&self) -> Result<Vec<CatalogItem>>;
}

#[async_trait]
impl CatalogSource for storefront_client::StorefrontClient {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogItem>> {
        Ok(self.fetch_catalog().await?)
    }
}

// ---------------------------------------------------------------------------
// AlertSink — the delivery boundary
// ---------------------------------------------------------------------------

/// One formatted alert, ready for delivery.
#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub item_id: String,
    pub title: String,
    pub body: String,
    pub url: String,
}

impl AlertMessage {
    pub fn for_item(item: &CatalogItem, change: Option<&str>) -> Self {
        let body = match change {
            Some(change) => format!("{}: {} (price {:.2})", item.title, change, item.price),
            None => format!("{} (price {:.2})", item.title, item.price),
        };
        Self {
            item_id: item.id.clone(),
            title: item.title.clone(),
            body,
            url: item.url.clone(),
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert. No partial success: Ok means delivered.
    async fn deliver(&self, message: &AlertMessage) -> Result<()>;
}

#[async_trait]
impl AlertSink for webhook_alert::WebhookAlerter {
    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        let payload = serde_json::json!({
            "itemId": message.item_id,
            "title": message.title,
            "body": message.body,
            "url": message.url,
        });
        Ok(self.deliver(&payload).await?)
    }
}

/// Tracing-only sink used when no webhook is configured. Keeps the whole
/// pipeline exercisable in development.
pub struct LogAlerter;

#[async_trait]
impl AlertSink for LogAlerter {
    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        info!(item_id = %message.item_id, url = %message.url, "ALERT: {}", message.body);
        Ok(())
    }
}
