//! Infrastructure wiring: store backend, event bus, marketplace service.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use partsmarket_core::{Clock, SystemClock};
use partsmarket_events::InMemoryEventBus;
use partsmarket_infra::{
    ExpiryScheduler, ExpirySchedulerHandle, InMemoryMarketplaceStore, MarketplaceConfig,
    MarketplaceService, MarketplaceStore, OrderEnvelope, PostgresMarketplaceStore, StaticSettings,
};
use partsmarket_orders::OrderSla;

pub type AppBus = Arc<InMemoryEventBus<OrderEnvelope>>;
pub type Market = MarketplaceService<dyn MarketplaceStore, AppBus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::InMemory => "in_memory",
            StoreBackend::Postgres => "postgres",
        }
    }
}

pub struct AppServices {
    pub market: Arc<Market>,
    pub bus: AppBus,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<StaticSettings>,
    pub backend: StoreBackend,
}

impl AppServices {
    pub fn sla(&self) -> OrderSla {
        self.market.sla()
    }

    /// Start the periodic expiry sweep on the current runtime.
    pub fn spawn_expiry_scheduler(&self, config: &MarketplaceConfig) -> ExpirySchedulerHandle {
        ExpiryScheduler::new(self.market.clone(), self.clock.clone())
            .with_interval(config.sweep_interval)
            .spawn()
    }
}

pub async fn build_services(config: &MarketplaceConfig) -> anyhow::Result<AppServices> {
    let (store, backend): (Arc<dyn MarketplaceStore>, StoreBackend) = if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let store = PostgresMarketplaceStore::connect(url, config.max_db_connections)
            .await
            .context("failed to connect to the marketplace database")?;
        store.migrate().await.context("failed to migrate the marketplace schema")?;
        (Arc::new(store), StoreBackend::Postgres)
    } else {
        (Arc::new(InMemoryMarketplaceStore::new()), StoreBackend::InMemory)
    };

    wire(store, backend, Arc::new(SystemClock), config)
}

/// Assemble the services around an already constructed store.
pub fn wire(
    store: Arc<dyn MarketplaceStore>,
    backend: StoreBackend,
    clock: Arc<dyn Clock>,
    config: &MarketplaceConfig,
) -> anyhow::Result<AppServices> {
    let bus: AppBus = Arc::new(InMemoryEventBus::new());
    let settings = Arc::new(StaticSettings::new(config.settings).context("invalid marketplace settings")?);

    let market = MarketplaceService::new(store, bus.clone(), clock.clone(), settings.clone())
        .with_sla(config.sla)
        .with_local_offset(config.local_offset());

    info!(backend = backend.as_str(), "marketplace services ready");

    Ok(AppServices {
        market: Arc::new(market),
        bus,
        clock,
        settings,
        backend,
    })
}
