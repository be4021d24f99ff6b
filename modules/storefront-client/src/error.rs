use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

/// Transport-level failures collapsed into a small taxonomy. The poll loop
/// treats every variant the same way: the poll failed, no items processed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("storefront rejected credentials (status {status})")]
    Auth { status: u16 },

    #[error("storefront rate limited the request")]
    RateLimited,

    #[error("storefront server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("storefront request timed out")]
    Timeout,

    #[error("storefront unreachable: {0}")]
    Unreachable(String),
}

impl From<reqwest_middleware::Error> for FetchError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => FetchError::Timeout,
            reqwest_middleware::Error::Reqwest(e) if e.is_connect() => {
                FetchError::Unreachable(e.to_string())
            }
            other => FetchError::Unreachable(other.to_string()),
        }
    }
}
