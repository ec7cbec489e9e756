//! Infrastructure layer: storage backends, the marketplace service, the
//! expiry scheduler, notification fan-out and configuration.

pub mod config;
pub mod error;
pub mod expiry;
pub mod marketplace;
pub mod notify;
pub mod settings;
pub mod store;
pub mod workers;

pub use config::MarketplaceConfig;
pub use error::{CommitError, ErrorKind, MarketError, MarketResult, StoreError, StoreResult};
pub use expiry::{ExpiryScheduler, ExpirySchedulerHandle};
pub use marketplace::{ExpirySweep, MarketplaceService, NewOrder, RatingReceipt};
pub use notify::{LogNotifier, Notification, Notifier, OrderEnvelope};
pub use settings::StaticSettings;
pub use store::{InMemoryMarketplaceStore, MarketplaceStore, PostgresMarketplaceStore};
pub use workers::{NotificationWorker, WorkerHandle};
