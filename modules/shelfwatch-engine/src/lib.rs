pub mod differ;
pub mod notifier;
pub mod poller;
pub mod traits;

pub use differ::compare;
pub use notifier::{should_notify, DispatchOutcome, Notifier, NotifyFilter, RateLimitCache};
pub use poller::{PollOutcome, Poller, PollSummary};
pub use traits::{AlertMessage, AlertSink, CatalogSource, LogAlerter};
