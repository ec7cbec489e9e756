//! Storage boundary of the marketplace.
//!
//! Backends are split by concern; [`MarketplaceStore`] is the union the
//! service works against. Both backends honor the same atomicity contract:
//!
//! - an order transition runs under an exclusive per-order lock;
//! - balances touched by the transition are locked in ascending tenant id;
//! - order state, order events and ledger entries commit together or not at all.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use partsmarket_core::{PartyRole, TenantId};
use partsmarket_credits::{BalanceGate, CreditAccount, CreditMutation, LedgerEntry};
use partsmarket_listings::{Listing, ListingId};
use partsmarket_orders::{Order, OrderError, OrderEvent, OrderId, OrderSla, OrderStatus};
use partsmarket_reputation::{Rating, Reputation};
use partsmarket_suppliers::{FavoriteSupplier, SupplierProfile};

use crate::error::{CommitError, StoreResult};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryMarketplaceStore;
pub use postgres::PostgresMarketplaceStore;

/// Everything a decided transition wants to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// State after the transition.
    pub order: Order,
    /// Events to append; empty means "nothing to do" and nothing is written.
    pub events: Vec<OrderEvent>,
    /// Read-only minimum-balance checks, evaluated before any debit.
    pub gates: Vec<BalanceGate>,
    pub debits: Vec<CreditMutation>,
    pub at: DateTime<Utc>,
}

impl TransitionPlan {
    pub fn new(order: Order, events: Vec<OrderEvent>, at: DateTime<Utc>) -> Self {
        Self {
            order,
            events,
            gates: Vec::new(),
            debits: Vec::new(),
            at,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    /// Tenants whose balances must be locked, in lock order.
    pub fn locked_tenants(&self) -> Vec<TenantId> {
        let tenants: BTreeSet<TenantId> = self
            .gates
            .iter()
            .map(|g| g.tenant_id)
            .chain(self.debits.iter().map(|d| d.tenant_id))
            .collect();
        tenants.into_iter().collect()
    }
}

/// Decision callback run under the order lock against the current state.
pub type TransitionFn<'a> = dyn Fn(&Order) -> Result<TransitionPlan, OrderError> + Send + Sync + 'a;

/// Committed result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub order: Order,
    pub events: Vec<OrderEvent>,
    pub ledger: Vec<LedgerEntry>,
}

/// Order list query for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub tenant_id: TenantId,
    /// Side the tenant played; `None` lists both.
    pub role: Option<PartyRole>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            role: None,
            status: None,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        let role_ok = match self.role {
            Some(role) => order.party(role) == self.tenant_id,
            None => order.role_of(self.tenant_id).is_some(),
        };
        role_ok && self.status.is_none_or(|s| s == order.status())
    }
}

/// Result of storing a rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingOutcome {
    pub rating: Rating,
    /// `false` when a rating for the same (order, role) already existed.
    pub created: bool,
    /// Counters of the rated tenant after the insert.
    pub reputation: Reputation,
}

#[async_trait]
pub trait SupplierStore: Send + Sync {
    async fn save_supplier(&self, profile: &SupplierProfile) -> StoreResult<()>;

    async fn supplier(&self, tenant_id: TenantId) -> StoreResult<Option<SupplierProfile>>;

    /// Returns `false` if the pin already existed.
    async fn add_favorite(&self, favorite: &FavoriteSupplier) -> StoreResult<bool>;

    /// Returns `false` if there was nothing to remove.
    async fn remove_favorite(&self, tenant_id: TenantId, supplier_id: TenantId) -> StoreResult<bool>;

    async fn favorites(&self, tenant_id: TenantId) -> StoreResult<Vec<FavoriteSupplier>>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn save_listing(&self, listing: &Listing) -> StoreResult<()>;

    async fn listing(&self, id: ListingId) -> StoreResult<Option<Listing>>;

    async fn supplier_listings(&self, supplier_id: TenantId) -> StoreResult<Vec<Listing>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a freshly placed order with its creation event.
    async fn insert_order(&self, order: &Order, placed: &OrderEvent) -> StoreResult<()>;

    async fn order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Orders of one tenant, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Audit trail of one order, oldest first.
    async fn order_events(&self, id: OrderId) -> StoreResult<Vec<OrderEvent>>;

    /// Run `decide` under the order's exclusive lock and commit its plan atomically.
    async fn transition(&self, id: OrderId, decide: &TransitionFn<'_>) -> Result<TransitionOutcome, CommitError>;

    /// Live orders whose deadline is at or before `now`.
    async fn expiry_candidates(&self, now: DateTime<Utc>, sla: &OrderSla) -> StoreResult<Vec<OrderId>>;
}

#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Unknown tenants have a zero balance.
    async fn account(&self, tenant_id: TenantId) -> StoreResult<CreditAccount>;

    async fn apply_credit(&self, mutation: &CreditMutation, at: DateTime<Utc>) -> Result<LedgerEntry, CommitError>;

    /// Most recent entries first.
    async fn ledger(&self, tenant_id: TenantId, limit: usize) -> StoreResult<Vec<LedgerEntry>>;

    async fn balance(&self, tenant_id: TenantId) -> StoreResult<Decimal> {
        Ok(self.account(tenant_id).await?.balance())
    }
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Insert `rating` and update the rated tenant's counters atomically.
    /// A second rating for the same (order, role) returns the stored one.
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<RatingOutcome>;

    async fn order_ratings(&self, order_id: OrderId) -> StoreResult<Vec<Rating>>;

    async fn reputation(&self, tenant_id: TenantId) -> StoreResult<Reputation>;
}

/// Full storage surface used by the marketplace service.
pub trait MarketplaceStore: SupplierStore + ListingStore + OrderStore + CreditStore + RatingStore {}

impl<T> MarketplaceStore for T where
    T: SupplierStore + ListingStore + OrderStore + CreditStore + RatingStore + ?Sized
{
}

/// Apply gates then debits of `plan` to working copies of the locked accounts.
///
/// Shared by both backends so the check order is identical: any gate failure
/// is reported before any debit is attempted.
pub(crate) fn settle_balances(
    plan: &TransitionPlan,
    accounts: &mut [CreditAccount],
) -> Result<Vec<LedgerEntry>, CommitError> {
    for gate in &plan.gates {
        let account = accounts
            .iter()
            .find(|a| a.tenant_id() == gate.tenant_id)
            .ok_or(CommitError::NotFound("credit account"))?;
        gate.check(account)?;
    }

    let mut entries = Vec::with_capacity(plan.debits.len());
    for mutation in &plan.debits {
        let account = accounts
            .iter_mut()
            .find(|a| a.tenant_id() == mutation.tenant_id)
            .ok_or(CommitError::NotFound("credit account"))?;
        entries.push(account.apply(mutation, plan.at)?);
    }
    Ok(entries)
}
