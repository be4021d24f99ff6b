pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::Config;
pub use error::ShelfwatchError;
pub use events::{EventBus, GatewayEvent, GatewayRequest};
pub use types::*;
