use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlertError>;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Webhook error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for AlertError {
    fn from(err: reqwest::Error) -> Self {
        AlertError::Network(err.to_string())
    }
}
