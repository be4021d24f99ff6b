use thiserror::Error;

/// Failure modes of one poll cycle. Client crates carry their own richer
/// taxonomies; by the time an error reaches the orchestrator only the
/// category and message matter.
#[derive(Error, Debug)]
pub enum ShelfwatchError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Target item not found in feed: {0}")]
    TargetNotFound(String),
}
