pub mod error;

pub use error::{FetchError, Result};

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

use shelfwatch_common::{CatalogItem, ImageRef, Variant};

/// Client for a storefront's public JSON product feed. Sends the session
/// cookie when one is configured and retries transient failures with
/// exponential backoff before giving up.
pub struct StorefrontClient {
    client: ClientWithMiddleware,
    base_url: String,
    session_cookie: Option<String>,
}

impl StorefrontClient {
    pub fn new(base_url: &str, session_cookie: Option<&str>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("shelfwatch/0.1")
            .build()
            .expect("Failed to build HTTP client");
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: session_cookie.map(String::from),
        }
    }

    /// Fetch the full catalog from `{base}/products.json`, translating
    /// transport failures into the `FetchError` taxonomy.
    pub async fn fetch_catalog(&self) -> Result<Vec<CatalogItem>> {
        let endpoint = format!("{}/products.json", self.base_url);
        let mut request = self.client.get(&endpoint);
        if let Some(ref cookie) = self.session_cookie {
            request = request.header(reqwest::header::COOKIE, cookie.clone());
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Auth {
                status: status.as_u16(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let feed: ProductFeed = resp.json().await.map_err(|e| FetchError::Server {
            status: status.as_u16(),
            message: format!("invalid catalog payload: {e}"),
        })?;

        let fetched_at = Utc::now();
        Ok(feed
            .products
            .into_iter()
            .map(|p| map_product(p, &self.base_url, fetched_at))
            .collect())
    }
}

// --- Feed payload ---

#[derive(Debug, Deserialize)]
struct ProductFeed {
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    id: u64,
    title: String,
    handle: String,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    variants: Vec<ProductVariant>,
    #[serde(default)]
    images: Vec<ProductImage>,
}

#[derive(Debug, Deserialize)]
struct ProductVariant {
    id: u64,
    title: String,
    /// The feed serializes prices as decimal strings.
    price: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    available: Option<bool>,
    #[serde(default)]
    inventory_quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ProductImage {
    id: u64,
    src: String,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Map one feed product into a catalog item: price is the minimum across
/// variants, availability is true when any variant has stock.
fn map_product(product: Product, base_url: &str, fetched_at: DateTime<Utc>) -> CatalogItem {
    let variants: Vec<Variant> = product
        .variants
        .into_iter()
        .map(|v| {
            let stock = v.inventory_quantity.unwrap_or(0);
            Variant {
                id: v.id.to_string(),
                title: v.title,
                price: v.price.parse().unwrap_or(0.0),
                sku: v.sku,
                available: v.available.unwrap_or(stock > 0),
                stock,
            }
        })
        .collect();

    let price = variants
        .iter()
        .map(|v| v.price)
        .fold(f64::INFINITY, f64::min);
    let price = if price.is_finite() { price } else { 0.0 };
    let available = variants.iter().any(|v| v.available || v.stock > 0);

    let images = product
        .images
        .into_iter()
        .map(|i| ImageRef {
            id: i.id.to_string(),
            src: i.src,
            alt: i.alt,
            width: i.width,
            height: i.height,
        })
        .collect();

    CatalogItem {
        id: product.id.to_string(),
        url: format!("{}/products/{}", base_url, product.handle),
        title: product.title,
        handle: product.handle,
        price,
        available,
        variants,
        images,
        description: product.body_html.unwrap_or_default(),
        first_seen_at: fetched_at,
        last_seen_at: fetched_at,
    }
}
