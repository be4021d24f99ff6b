use std::env;
use std::path::PathBuf;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the monitored storefront.
    pub shop_url: String,
    /// Session cookie sent with catalog fetches, when the shop requires one.
    pub session_cookie: Option<String>,

    // Storage
    pub data_dir: PathBuf,

    // Gateway
    pub socket_path: PathBuf,

    // Polling
    pub poll_interval_secs: u64,

    // Notifications
    pub notify_window_mins: i64,
    pub notify_max_price: Option<f64>,
    pub notify_keywords: Vec<String>,
    pub alert_webhook_url: Option<String>,
    pub notification_retention_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            shop_url: required_env("SHOP_URL"),
            session_cookie: env::var("SHOP_SESSION_COOKIE").ok(),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            socket_path: PathBuf::from(
                env::var("SOCKET_PATH").unwrap_or_else(|_| "/tmp/shelfwatch.sock".to_string()),
            ),
            poll_interval_secs: parsed_env("POLL_INTERVAL_SECS", 300),
            notify_window_mins: parsed_env("NOTIFY_WINDOW_MINS", 60),
            notify_max_price: env::var("NOTIFY_MAX_PRICE")
                .ok()
                .map(|v| v.parse().expect("NOTIFY_MAX_PRICE must be a number")),
            notify_keywords: env::var("NOTIFY_KEYWORDS")
                .map(|v| {
                    v.split(',')
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            alert_webhook_url: env::var("ALERT_WEBHOOK_URL").ok(),
            notification_retention_days: parsed_env("NOTIFICATION_RETENTION_DAYS", 30),
        }
    }

    /// Log the loaded configuration with secrets reduced to set/unset.
    pub fn log_redacted(&self) {
        info!(
            shop_url = %self.shop_url,
            data_dir = %self.data_dir.display(),
            socket = %self.socket_path.display(),
            poll_interval_secs = self.poll_interval_secs,
            notify_window_mins = self.notify_window_mins,
            retention_days = self.notification_retention_days,
            session_cookie = if self.session_cookie.is_some() { "set" } else { "unset" },
            alert_webhook = if self.alert_webhook_url.is_some() { "set" } else { "unset" },
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
