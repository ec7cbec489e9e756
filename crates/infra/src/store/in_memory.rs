use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use partsmarket_core::{PartyRole, TenantId};
use partsmarket_credits::{CreditAccount, CreditMutation, LedgerEntry};
use partsmarket_listings::{Listing, ListingId};
use partsmarket_orders::{Order, OrderEvent, OrderId, OrderSla};
use partsmarket_reputation::{Rating, Reputation};
use partsmarket_suppliers::{FavoriteSupplier, SupplierProfile};

use super::{
    CreditStore, ListingStore, OrderFilter, OrderStore, RatingOutcome, RatingStore, SupplierStore,
    TransitionFn, TransitionOutcome, settle_balances,
};
use crate::error::{CommitError, StoreError, StoreResult};

fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} lock poisoned"))
}

#[derive(Debug, Default)]
struct RatingBook {
    by_key: HashMap<(OrderId, PartyRole), Rating>,
    reputations: HashMap<TenantId, Reputation>,
}

/// In-memory marketplace store.
///
/// Intended for tests/dev. One mutex per order and one per tenant account
/// give the same exclusive-lock semantics as row locks in Postgres.
#[derive(Debug, Default)]
pub struct InMemoryMarketplaceStore {
    suppliers: RwLock<HashMap<TenantId, SupplierProfile>>,
    favorites: RwLock<BTreeMap<(TenantId, TenantId), FavoriteSupplier>>,
    listings: RwLock<HashMap<ListingId, Listing>>,
    orders: RwLock<HashMap<OrderId, Arc<Mutex<Order>>>>,
    order_events: Mutex<HashMap<OrderId, Vec<OrderEvent>>>,
    accounts: RwLock<HashMap<TenantId, Arc<Mutex<CreditAccount>>>>,
    ledger: Mutex<Vec<LedgerEntry>>,
    ratings: Mutex<RatingBook>,
}

impl InMemoryMarketplaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn order_cell(&self, id: OrderId) -> StoreResult<Option<Arc<Mutex<Order>>>> {
        let orders = self.orders.read().map_err(|_| poisoned("orders"))?;
        Ok(orders.get(&id).cloned())
    }

    fn account_cell(&self, tenant_id: TenantId, at: DateTime<Utc>) -> StoreResult<Arc<Mutex<CreditAccount>>> {
        if let Some(cell) = self
            .accounts
            .read()
            .map_err(|_| poisoned("accounts"))?
            .get(&tenant_id)
        {
            return Ok(cell.clone());
        }

        let mut accounts = self.accounts.write().map_err(|_| poisoned("accounts"))?;
        let cell = accounts
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(CreditAccount::open(tenant_id, at))));
        Ok(cell.clone())
    }

    fn append_ledger(&self, entries: &[LedgerEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut ledger = self.ledger.lock().map_err(|_| poisoned("ledger"))?;
        ledger.extend_from_slice(entries);
        Ok(())
    }
}

#[async_trait]
impl SupplierStore for InMemoryMarketplaceStore {
    async fn save_supplier(&self, profile: &SupplierProfile) -> StoreResult<()> {
        let mut suppliers = self.suppliers.write().map_err(|_| poisoned("suppliers"))?;
        suppliers.insert(profile.tenant_id(), profile.clone());
        Ok(())
    }

    async fn supplier(&self, tenant_id: TenantId) -> StoreResult<Option<SupplierProfile>> {
        let suppliers = self.suppliers.read().map_err(|_| poisoned("suppliers"))?;
        Ok(suppliers.get(&tenant_id).cloned())
    }

    async fn add_favorite(&self, favorite: &FavoriteSupplier) -> StoreResult<bool> {
        let mut favorites = self.favorites.write().map_err(|_| poisoned("favorites"))?;
        let key = (favorite.tenant_id, favorite.supplier_id);
        if favorites.contains_key(&key) {
            return Ok(false);
        }
        favorites.insert(key, *favorite);
        Ok(true)
    }

    async fn remove_favorite(&self, tenant_id: TenantId, supplier_id: TenantId) -> StoreResult<bool> {
        let mut favorites = self.favorites.write().map_err(|_| poisoned("favorites"))?;
        Ok(favorites.remove(&(tenant_id, supplier_id)).is_some())
    }

    async fn favorites(&self, tenant_id: TenantId) -> StoreResult<Vec<FavoriteSupplier>> {
        let favorites = self.favorites.read().map_err(|_| poisoned("favorites"))?;
        let mut pins: Vec<FavoriteSupplier> = favorites
            .values()
            .filter(|f| f.tenant_id == tenant_id)
            .copied()
            .collect();
        pins.sort_by_key(|f| f.created_at);
        Ok(pins)
    }
}

#[async_trait]
impl ListingStore for InMemoryMarketplaceStore {
    async fn save_listing(&self, listing: &Listing) -> StoreResult<()> {
        let mut listings = self.listings.write().map_err(|_| poisoned("listings"))?;
        listings.insert(listing.id(), listing.clone());
        Ok(())
    }

    async fn listing(&self, id: ListingId) -> StoreResult<Option<Listing>> {
        let listings = self.listings.read().map_err(|_| poisoned("listings"))?;
        Ok(listings.get(&id).cloned())
    }

    async fn supplier_listings(&self, supplier_id: TenantId) -> StoreResult<Vec<Listing>> {
        let listings = self.listings.read().map_err(|_| poisoned("listings"))?;
        let mut found: Vec<Listing> = listings
            .values()
            .filter(|l| l.supplier_id() == supplier_id)
            .cloned()
            .collect();
        found.sort_by_key(|l| l.created_at());
        Ok(found)
    }
}

#[async_trait]
impl OrderStore for InMemoryMarketplaceStore {
    async fn insert_order(&self, order: &Order, placed: &OrderEvent) -> StoreResult<()> {
        let id = order.id_typed();
        {
            let mut orders = self.orders.write().map_err(|_| poisoned("orders"))?;
            if orders.contains_key(&id) {
                return Err(StoreError::Conflict(format!("order {id} already exists")));
            }
            orders.insert(id, Arc::new(Mutex::new(order.clone())));
        }
        let mut events = self.order_events.lock().map_err(|_| poisoned("order events"))?;
        events.insert(id, vec![placed.clone()]);
        Ok(())
    }

    async fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let Some(cell) = self.order_cell(id)? else {
            return Ok(None);
        };
        let order = cell.lock().map_err(|_| poisoned("order"))?;
        Ok(Some(order.clone()))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let cells: Vec<Arc<Mutex<Order>>> = {
            let orders = self.orders.read().map_err(|_| poisoned("orders"))?;
            orders.values().cloned().collect()
        };

        let mut found = Vec::new();
        for cell in cells {
            let order = cell.lock().map_err(|_| poisoned("order"))?;
            if filter.matches(&order) {
                found.push(order.clone());
            }
        }
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(found)
    }

    async fn order_events(&self, id: OrderId) -> StoreResult<Vec<OrderEvent>> {
        let events = self.order_events.lock().map_err(|_| poisoned("order events"))?;
        Ok(events.get(&id).cloned().unwrap_or_default())
    }

    async fn transition(&self, id: OrderId, decide: &TransitionFn<'_>) -> Result<TransitionOutcome, CommitError> {
        let cell = self.order_cell(id)?.ok_or(CommitError::NotFound("order"))?;
        let mut order = cell.lock().map_err(|_| poisoned("order"))?;

        let plan = decide(&*order)?;
        if plan.is_noop() {
            return Ok(TransitionOutcome {
                order: order.clone(),
                events: Vec::new(),
                ledger: Vec::new(),
            });
        }

        // Balances in ascending tenant order; work on copies so a refused
        // gate or debit leaves every account untouched.
        let cells = plan
            .locked_tenants()
            .into_iter()
            .map(|tenant_id| self.account_cell(tenant_id, plan.at))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut guards: Vec<MutexGuard<'_, CreditAccount>> = cells
            .iter()
            .map(|c| c.lock().map_err(|_| poisoned("account")))
            .collect::<StoreResult<Vec<_>>>()?;
        let mut working: Vec<CreditAccount> = guards.iter().map(|g| (**g).clone()).collect();

        let ledger = settle_balances(&plan, &mut working)?;

        for (guard, updated) in guards.iter_mut().zip(working) {
            **guard = updated;
        }
        self.append_ledger(&ledger)?;
        {
            let mut events = self.order_events.lock().map_err(|_| poisoned("order events"))?;
            events.entry(id).or_default().extend(plan.events.iter().cloned());
        }
        *order = plan.order.clone();

        Ok(TransitionOutcome {
            order: plan.order,
            events: plan.events,
            ledger,
        })
    }

    async fn expiry_candidates(&self, now: DateTime<Utc>, sla: &OrderSla) -> StoreResult<Vec<OrderId>> {
        let cells: Vec<Arc<Mutex<Order>>> = {
            let orders = self.orders.read().map_err(|_| poisoned("orders"))?;
            orders.values().cloned().collect()
        };

        let mut due = Vec::new();
        for cell in cells {
            let order = cell.lock().map_err(|_| poisoned("order"))?;
            if order.is_due(sla, now) {
                due.push(order.id_typed());
            }
        }
        due.sort();
        Ok(due)
    }
}

#[async_trait]
impl CreditStore for InMemoryMarketplaceStore {
    async fn account(&self, tenant_id: TenantId) -> StoreResult<CreditAccount> {
        let accounts = self.accounts.read().map_err(|_| poisoned("accounts"))?;
        match accounts.get(&tenant_id) {
            Some(cell) => Ok(cell.lock().map_err(|_| poisoned("account"))?.clone()),
            None => Ok(CreditAccount::open(tenant_id, DateTime::<Utc>::UNIX_EPOCH)),
        }
    }

    async fn apply_credit(&self, mutation: &CreditMutation, at: DateTime<Utc>) -> Result<LedgerEntry, CommitError> {
        let cell = self.account_cell(mutation.tenant_id, at)?;
        let mut account = cell.lock().map_err(|_| poisoned("account"))?;

        let mut working = account.clone();
        let entry = working.apply(mutation, at)?;
        self.append_ledger(std::slice::from_ref(&entry))?;
        *account = working;
        Ok(entry)
    }

    async fn ledger(&self, tenant_id: TenantId, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        let ledger = self.ledger.lock().map_err(|_| poisoned("ledger"))?;
        Ok(ledger
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RatingStore for InMemoryMarketplaceStore {
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<RatingOutcome> {
        let mut book = self.ratings.lock().map_err(|_| poisoned("ratings"))?;

        let key = (rating.order_id, rating.rater_role);
        if let Some(existing) = book.by_key.get(&key).cloned() {
            let reputation = book
                .reputations
                .get(&existing.rated_tenant)
                .cloned()
                .unwrap_or_else(|| Reputation::empty(existing.rated_tenant));
            return Ok(RatingOutcome {
                rating: existing,
                created: false,
                reputation,
            });
        }

        let reputation = book
            .reputations
            .entry(rating.rated_tenant)
            .or_insert_with(|| Reputation::empty(rating.rated_tenant));
        reputation.record(rating);
        let reputation = reputation.clone();
        book.by_key.insert(key, rating.clone());

        Ok(RatingOutcome {
            rating: rating.clone(),
            created: true,
            reputation,
        })
    }

    async fn order_ratings(&self, order_id: OrderId) -> StoreResult<Vec<Rating>> {
        let book = self.ratings.lock().map_err(|_| poisoned("ratings"))?;
        let mut found: Vec<Rating> = book
            .by_key
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn reputation(&self, tenant_id: TenantId) -> StoreResult<Reputation> {
        let book = self.ratings.lock().map_err(|_| poisoned("ratings"))?;
        Ok(book
            .reputations
            .get(&tenant_id)
            .cloned()
            .unwrap_or_else(|| Reputation::empty(tenant_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TransitionPlan;
    use partsmarket_core::{Aggregate, AggregateId, AggregateRoot};
    use partsmarket_credits::{BalanceGate, CreditReason};
    use partsmarket_listings::{Currency, ListingSnapshot};
    use partsmarket_orders::{CancelOrder, OrderCommand, OrderError, PlaceOrder};
    use rust_decimal::Decimal;

    fn place(buyer: TenantId, seller: TenantId) -> (Order, OrderEvent) {
        Order::place(&PlaceOrder {
            order_id: OrderId::new(AggregateId::new()),
            buyer_id: buyer,
            seller_id: seller,
            listing: ListingSnapshot {
                listing_id: ListingId::new(AggregateId::new()),
                title: "Clutch kit".to_string(),
                brand: "Valeo".to_string(),
                category: "Clutch".to_string(),
                unit_price: Decimal::new(12000, 0),
                currency: Currency::Rsd,
                quantity: 1,
            },
            buyer_city: "Subotica".to_string(),
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    fn top_up(tenant_id: TenantId, amount: Decimal) -> CreditMutation {
        CreditMutation::credit(tenant_id, amount, CreditReason::TopUp { reference: None })
    }

    #[tokio::test]
    async fn refused_debit_rolls_back_every_balance_and_the_order() {
        let store = InMemoryMarketplaceStore::new();
        let (buyer, seller) = (TenantId::new(), TenantId::new());
        let (order, placed) = place(buyer, seller);
        let id = order.id_typed();
        store.insert_order(&order, &placed).await.unwrap();
        store.apply_credit(&top_up(buyer, Decimal::new(5, 0)), Utc::now()).await.unwrap();

        let decide = move |current: &Order| -> Result<TransitionPlan, OrderError> {
            let cmd = OrderCommand::Cancel(CancelOrder {
                actor: buyer,
                reason: None,
                occurred_at: Utc::now(),
            });
            let (next, events) = current.decide(&cmd)?;
            let mut plan = TransitionPlan::new(next, events, Utc::now());
            let reason = CreditReason::Adjustment { note: "test".into() };
            plan.debits.push(CreditMutation::debit(buyer, Decimal::ONE, reason.clone()));
            plan.debits.push(CreditMutation::debit(seller, Decimal::ONE, reason));
            Ok(plan)
        };

        let err = store.transition(id, &decide).await.unwrap_err();
        assert!(matches!(err, CommitError::Credit(_)));

        assert_eq!(store.balance(buyer).await.unwrap(), Decimal::new(5, 0));
        assert_eq!(store.balance(seller).await.unwrap(), Decimal::ZERO);
        assert_eq!(store.order(id).await.unwrap().unwrap(), order);
        assert_eq!(store.order_events(id).await.unwrap().len(), 1);
        assert_eq!(store.ledger(buyer, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gates_are_checked_before_debits() {
        let store = InMemoryMarketplaceStore::new();
        let (buyer, seller) = (TenantId::new(), TenantId::new());
        let (order, placed) = place(buyer, seller);
        store.insert_order(&order, &placed).await.unwrap();

        let decide = move |current: &Order| -> Result<TransitionPlan, OrderError> {
            let cmd = OrderCommand::Cancel(CancelOrder {
                actor: buyer,
                reason: None,
                occurred_at: Utc::now(),
            });
            let (next, events) = current.decide(&cmd)?;
            let mut plan = TransitionPlan::new(next, events, Utc::now());
            plan.gates.push(BalanceGate::new(seller, Decimal::ONE));
            Ok(plan)
        };

        let err = store.transition(order.id_typed(), &decide).await.unwrap_err();
        assert!(matches!(
            err,
            CommitError::Credit(partsmarket_credits::CreditError::BelowMinimum { .. })
        ));
        assert_eq!(store.order(order.id_typed()).await.unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn order_lists_filter_by_role() {
        let store = InMemoryMarketplaceStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());
        for (buyer, seller) in [(a, b), (b, a), (a, b)] {
            let (order, placed) = place(buyer, seller);
            store.insert_order(&order, &placed).await.unwrap();
        }

        let mut filter = OrderFilter::for_tenant(a);
        assert_eq!(store.list_orders(&filter).await.unwrap().len(), 3);
        filter.role = Some(PartyRole::Buyer);
        assert_eq!(store.list_orders(&filter).await.unwrap().len(), 2);
        filter.role = Some(PartyRole::Supplier);
        assert_eq!(store.list_orders(&filter).await.unwrap().len(), 1);
        assert!(store.list_orders(&OrderFilter::for_tenant(TenantId::new())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accounts_are_stamped_with_the_mutation_time() {
        let store = InMemoryMarketplaceStore::new();
        let tenant = TenantId::new();
        let untouched = store.account(tenant).await.unwrap();
        assert_eq!(untouched.balance(), Decimal::ZERO);
        assert_eq!(untouched.updated_at(), DateTime::<Utc>::UNIX_EPOCH);

        let at = DateTime::parse_from_rfc3339("2024-06-12T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        store.apply_credit(&top_up(tenant, Decimal::new(3, 0)), at).await.unwrap();
        let account = store.account(tenant).await.unwrap();
        assert_eq!(account.balance(), Decimal::new(3, 0));
        assert_eq!(account.updated_at(), at);
    }
}
