pub mod store;

pub use store::{CatalogStore, ItemFilter, Result, StoreError};
