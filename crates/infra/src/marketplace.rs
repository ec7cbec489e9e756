//! Marketplace application service.
//!
//! Orchestrates every marketplace operation against a [`MarketplaceStore`]:
//! authorization (only an order's parties may act on it), settings and clock
//! reads, delivery resolution, and notification publishing after commit.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use partsmarket_core::{Aggregate, AggregateId, AggregateRoot, Clock, PartyRole, TenantId, UserId};
use partsmarket_credits::{BalanceGate, CreditAccount, CreditMutation, CreditReason, LedgerEntry};
use partsmarket_events::{Event, EventBus};
use partsmarket_listings::{Currency, Listing, ListingDraft, ListingId};
use partsmarket_orders::{
    CancelOrder, CompleteOrder, ConfirmOrder, ExpireOrder, OfferOrder, Order, OrderCommand,
    OrderError, OrderEvent, OrderId, OrderSla, OrderStatus, PlaceOrder, RejectOrder,
    SettingsProvider,
};
use partsmarket_reputation::{Rating, RatingValue, Reputation, SubmitRating};
use partsmarket_suppliers::{DeliveryConfig, DeliveryTerms, FavoriteSupplier, SupplierProfile};

use crate::error::{ErrorKind, MarketError, MarketResult};
use crate::notify::OrderEnvelope;
use crate::store::{MarketplaceStore, OrderFilter, TransitionOutcome, TransitionPlan};

const ORDER_AGGREGATE_TYPE: &str = "marketplace.order";
// Fixed UTC+1 all year; local summer time (UTC+2) is not followed.
const DEFAULT_UTC_OFFSET_SECS: i32 = 3600;

/// Largest ledger page a caller may request.
pub const MAX_LEDGER_PAGE: usize = 500;

/// Buyer input for a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub listing_id: ListingId,
    pub quantity: u32,
    pub buyer_city: String,
}

/// Committed result of a rating submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingReceipt {
    pub rating: Rating,
    /// `false` when the rater's role had already rated the order.
    pub created: bool,
    pub reputation: Reputation,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirySweep {
    pub expired: Vec<OrderId>,
    /// Candidates that moved on (offered, confirmed, closed) before the lock was taken.
    pub skipped: usize,
    pub failed: usize,
}

/// Marketplace service over a store `S` and an event bus `B`.
pub struct MarketplaceService<S: ?Sized, B> {
    store: Arc<S>,
    bus: B,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsProvider>,
    sla: OrderSla,
    local_offset: FixedOffset,
}

impl<S, B> MarketplaceService<S, B>
where
    S: MarketplaceStore + ?Sized,
    B: EventBus<OrderEnvelope>,
{
    /// Service with the default SLA and UTC+1 as the marketplace's local time.
    pub fn new(
        store: Arc<S>,
        bus: B,
        clock: Arc<dyn Clock>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            settings,
            sla: OrderSla::default(),
            local_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or(Utc.fix()),
        }
    }

    pub fn with_sla(mut self, sla: OrderSla) -> Self {
        self.sla = sla;
        self
    }

    /// Offset used to turn "now" into the local wall-clock time delivery rounds are expressed in.
    pub fn with_local_offset(mut self, offset: FixedOffset) -> Self {
        self.local_offset = offset;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn sla(&self) -> OrderSla {
        self.sla
    }

    // ---------------------------------------------------------------------
    // Suppliers & favorites
    // ---------------------------------------------------------------------

    /// Create or update the caller's supplier profile.
    pub async fn upsert_supplier(
        &self,
        tenant_id: TenantId,
        display_name: &str,
        eur_rate: Decimal,
    ) -> MarketResult<SupplierProfile> {
        let now = self.clock.now();
        let profile = match self.store.supplier(tenant_id).await? {
            Some(mut existing) => {
                existing.update(display_name, eur_rate, now)?;
                existing
            }
            None => SupplierProfile::new(tenant_id, display_name, eur_rate, now)?,
        };
        self.store.save_supplier(&profile).await?;
        info!(tenant_id = %tenant_id, eur_rate = %profile.eur_rate(), "supplier profile saved");
        Ok(profile)
    }

    pub async fn set_delivery_config(
        &self,
        tenant_id: TenantId,
        config: DeliveryConfig,
    ) -> MarketResult<SupplierProfile> {
        let mut profile = self.require_supplier(tenant_id).await?;
        profile.set_delivery(config, self.clock.now())?;
        self.store.save_supplier(&profile).await?;
        info!(
            tenant_id = %tenant_id,
            cities = profile.delivery().cities.len(),
            pickup = profile.delivery().pickup_allowed,
            "delivery configuration saved"
        );
        Ok(profile)
    }

    pub async fn supplier(&self, tenant_id: TenantId) -> MarketResult<SupplierProfile> {
        self.require_supplier(tenant_id).await
    }

    async fn require_supplier(&self, tenant_id: TenantId) -> MarketResult<SupplierProfile> {
        self.store
            .supplier(tenant_id)
            .await?
            .ok_or_else(|| MarketError::not_found("supplier"))
    }

    /// Pin a supplier; pinning twice is not an error.
    pub async fn add_favorite(
        &self,
        tenant_id: TenantId,
        supplier_id: TenantId,
    ) -> MarketResult<FavoriteSupplier> {
        self.require_supplier(supplier_id).await?;
        let favorite = FavoriteSupplier::new(tenant_id, supplier_id, self.clock.now())?;
        if self.store.add_favorite(&favorite).await? {
            debug!(tenant_id = %tenant_id, supplier_id = %supplier_id, "supplier pinned");
        }
        Ok(favorite)
    }

    pub async fn remove_favorite(&self, tenant_id: TenantId, supplier_id: TenantId) -> MarketResult<()> {
        if self.store.remove_favorite(tenant_id, supplier_id).await? {
            Ok(())
        } else {
            Err(MarketError::not_found("favorite"))
        }
    }

    pub async fn favorites(&self, tenant_id: TenantId) -> MarketResult<Vec<FavoriteSupplier>> {
        Ok(self.store.favorites(tenant_id).await?)
    }

    // ---------------------------------------------------------------------
    // Listings
    // ---------------------------------------------------------------------

    /// Publish a listing priced at the supplier's current EUR rate.
    pub async fn publish_listing(&self, supplier_id: TenantId, draft: ListingDraft) -> MarketResult<Listing> {
        let profile = self.require_supplier(supplier_id).await?;
        let listing = Listing::publish(
            ListingId::new(AggregateId::new()),
            supplier_id,
            draft,
            profile.eur_rate(),
            self.clock.now(),
        )?;
        self.store.save_listing(&listing).await?;
        info!(listing_id = %listing.id(), supplier_id = %supplier_id, "listing published");
        Ok(listing)
    }

    pub async fn reprice_listing(
        &self,
        supplier_id: TenantId,
        listing_id: ListingId,
        amount: Decimal,
        currency: Currency,
    ) -> MarketResult<Listing> {
        let mut listing = self.owned_listing(supplier_id, listing_id).await?;
        let profile = self.require_supplier(supplier_id).await?;
        listing.reprice(amount, currency, profile.eur_rate(), self.clock.now())?;
        self.store.save_listing(&listing).await?;
        info!(listing_id = %listing_id, amount = %amount, currency = currency.as_str(), "listing repriced");
        Ok(listing)
    }

    pub async fn set_listing_active(
        &self,
        supplier_id: TenantId,
        listing_id: ListingId,
        active: bool,
    ) -> MarketResult<Listing> {
        let mut listing = self.owned_listing(supplier_id, listing_id).await?;
        listing.set_active(active, self.clock.now());
        self.store.save_listing(&listing).await?;
        info!(listing_id = %listing_id, active, "listing visibility changed");
        Ok(listing)
    }

    pub async fn listing(&self, listing_id: ListingId) -> MarketResult<Listing> {
        self.store
            .listing(listing_id)
            .await?
            .ok_or_else(|| MarketError::not_found("listing"))
    }

    pub async fn supplier_listings(&self, supplier_id: TenantId) -> MarketResult<Vec<Listing>> {
        Ok(self.store.supplier_listings(supplier_id).await?)
    }

    async fn owned_listing(&self, supplier_id: TenantId, listing_id: ListingId) -> MarketResult<Listing> {
        let listing = self.listing(listing_id).await?;
        listing.ensure_owner(supplier_id)?;
        Ok(listing)
    }

    // ---------------------------------------------------------------------
    // Credits
    // ---------------------------------------------------------------------

    pub async fn account(&self, tenant_id: TenantId) -> MarketResult<CreditAccount> {
        Ok(self.store.account(tenant_id).await?)
    }

    pub async fn balance(&self, tenant_id: TenantId) -> MarketResult<Decimal> {
        Ok(self.store.balance(tenant_id).await?)
    }

    /// Most recent ledger entries first; `limit` is capped at [`MAX_LEDGER_PAGE`].
    pub async fn ledger(&self, tenant_id: TenantId, limit: usize) -> MarketResult<Vec<LedgerEntry>> {
        Ok(self.store.ledger(tenant_id, limit.clamp(1, MAX_LEDGER_PAGE)).await?)
    }

    /// Top up a tenant's credits (platform administration).
    pub async fn grant_credits(
        &self,
        tenant_id: TenantId,
        amount: Decimal,
        reference: Option<String>,
    ) -> MarketResult<LedgerEntry> {
        let reference = reference.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let mutation = CreditMutation::credit(tenant_id, amount, CreditReason::TopUp { reference });
        let entry = self.store.apply_credit(&mutation, self.clock.now()).await?;
        info!(tenant_id = %tenant_id, amount = %amount, balance = %entry.balance_after, "credits granted");
        Ok(entry)
    }

    /// Signed manual correction; a negative `delta` is a debit and may not overdraw.
    pub async fn adjust_credits(
        &self,
        tenant_id: TenantId,
        delta: Decimal,
        note: &str,
    ) -> MarketResult<LedgerEntry> {
        let note = note.trim();
        if note.is_empty() {
            return Err(MarketError::Validation("adjustment note cannot be empty".into()));
        }
        let reason = CreditReason::Adjustment { note: note.to_string() };
        let mutation = if delta.is_sign_negative() {
            CreditMutation::debit(tenant_id, -delta, reason)
        } else {
            CreditMutation::credit(tenant_id, delta, reason)
        };
        let entry = self.store.apply_credit(&mutation, self.clock.now()).await?;
        info!(tenant_id = %tenant_id, delta = %entry.delta, balance = %entry.balance_after, "credits adjusted");
        Ok(entry)
    }

    // ---------------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------------

    /// Place an order against an active listing (→ SENT).
    pub async fn create_order(&self, buyer_id: TenantId, input: NewOrder) -> MarketResult<Order> {
        let listing = self.listing(input.listing_id).await?;
        let snapshot = listing.snapshot(input.quantity)?;

        let settings = self.settings.settings();
        let account = self.store.account(buyer_id).await?;
        BalanceGate::new(buyer_id, settings.min_credits).check(&account)?;

        let (order, placed) = Order::place(&PlaceOrder {
            order_id: OrderId::new(AggregateId::new()),
            buyer_id,
            seller_id: listing.supplier_id(),
            listing: snapshot,
            buyer_city: input.buyer_city,
            occurred_at: self.clock.now(),
        })?;

        self.store.insert_order(&order, &placed).await?;
        info!(
            order_id = %order.id_typed(),
            buyer_id = %buyer_id,
            seller_id = %order.seller_id(),
            listing_id = %input.listing_id,
            "order placed"
        );
        self.publish(&order, std::slice::from_ref(&placed));
        Ok(order)
    }

    /// Supplier offers the order with delivery terms resolved for the buyer (SENT → OFFERED).
    pub async fn offer(&self, actor: TenantId, order_id: OrderId) -> MarketResult<Order> {
        let current = self.order(actor, order_id).await?;
        let now = self.clock.now();
        let local_now = now.with_timezone(&self.local_offset).naive_local();

        let config = self
            .store
            .supplier(current.seller_id())
            .await?
            .map(|p| p.delivery().clone())
            .unwrap_or_default();

        let delivery = match config.resolve(current.buyer_city(), local_now) {
            Ok(terms) => terms,
            Err(err) => {
                // Order rule violations take precedence over a missing delivery option.
                current.handle(&offer_command(actor, DeliveryTerms::pickup(), self.sla, now))?;
                return Err(err.into());
            }
        };

        let command = offer_command(actor, delivery, self.sla, now);
        let outcome = self.transition(order_id, move |order| plan_for(order, &command, now)).await?;
        Ok(outcome.order)
    }

    /// Supplier declines (SENT → REJECTED).
    pub async fn reject(&self, actor: TenantId, order_id: OrderId, reason: Option<String>) -> MarketResult<Order> {
        let now = self.clock.now();
        let command = OrderCommand::Reject(RejectOrder {
            actor,
            reason,
            occurred_at: now,
        });
        let outcome = self.transition(order_id, move |order| plan_for(order, &command, now)).await?;
        Ok(outcome.order)
    }

    /// Buyer confirms (OFFERED → CONFIRMED); both fees are debited in the same commit.
    pub async fn confirm(&self, actor: TenantId, order_id: OrderId) -> MarketResult<Order> {
        let settings = self.settings.settings();
        let now = self.clock.now();
        let command = OrderCommand::Confirm(ConfirmOrder {
            actor,
            buyer_fee: settings.buyer_fee,
            supplier_fee: settings.supplier_fee,
            occurred_at: now,
        });

        let outcome = self
            .transition(order_id, move |order| {
                let mut plan = plan_for(order, &command, now)?;
                if plan.is_noop() {
                    return Ok(plan);
                }

                let fees = [
                    (order.buyer_id(), settings.buyer_fee, PartyRole::Buyer),
                    (order.seller_id(), settings.supplier_fee, PartyRole::Supplier),
                ];
                plan.gates = fees
                    .iter()
                    .map(|(tenant_id, _, _)| BalanceGate::new(*tenant_id, settings.min_credits))
                    .collect();
                plan.debits = fees
                    .iter()
                    .filter(|(_, fee, _)| *fee > Decimal::ZERO)
                    .map(|(tenant_id, fee, role)| {
                        CreditMutation::debit(
                            *tenant_id,
                            *fee,
                            CreditReason::OrderFee {
                                order_id: order.id_typed().0,
                                role: *role,
                            },
                        )
                    })
                    .collect();
                Ok(plan)
            })
            .await?;

        for entry in &outcome.ledger {
            debug!(
                order_id = %order_id,
                tenant_id = %entry.tenant_id,
                delta = %entry.delta,
                balance = %entry.balance_after,
                "order fee debited"
            );
        }
        Ok(outcome.order)
    }

    /// Buyer withdraws (SENT/OFFERED → CANCELLED).
    pub async fn cancel(&self, actor: TenantId, order_id: OrderId, reason: Option<String>) -> MarketResult<Order> {
        let now = self.clock.now();
        let command = OrderCommand::Cancel(CancelOrder {
            actor,
            reason,
            occurred_at: now,
        });
        let outcome = self.transition(order_id, move |order| plan_for(order, &command, now)).await?;
        Ok(outcome.order)
    }

    /// Either party marks the order delivered (CONFIRMED → COMPLETED). Idempotent.
    pub async fn complete(&self, actor: TenantId, order_id: OrderId) -> MarketResult<Order> {
        let now = self.clock.now();
        let command = OrderCommand::Complete(CompleteOrder {
            actor,
            occurred_at: now,
        });
        let outcome = self.transition(order_id, move |order| plan_for(order, &command, now)).await?;
        Ok(outcome.order)
    }

    /// Force every overdue SENT/OFFERED order to EXPIRED.
    ///
    /// Each candidate is re-checked under its own lock; orders that moved on
    /// in the meantime are skipped.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> MarketResult<ExpirySweep> {
        let candidates = self.store.expiry_candidates(now, &self.sla).await?;
        let mut sweep = ExpirySweep::default();

        for order_id in candidates {
            let command = OrderCommand::Expire(ExpireOrder {
                sla: self.sla,
                occurred_at: now,
            });
            match self.transition(order_id, move |order| plan_for(order, &command, now)).await {
                Ok(outcome) if !outcome.events.is_empty() => sweep.expired.push(order_id),
                Ok(_) => sweep.skipped += 1,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::InvalidTransition | ErrorKind::OrderAlreadyClosed | ErrorKind::NotFound
                    ) =>
                {
                    debug!(order_id = %order_id, reason = %err, "expiry candidate skipped");
                    sweep.skipped += 1;
                }
                Err(err) => {
                    warn!(order_id = %order_id, error = %err, "failed to expire order");
                    sweep.failed += 1;
                }
            }
        }

        Ok(sweep)
    }

    /// Order visible to `tenant_id`; other tenants get `not_found`.
    pub async fn order(&self, tenant_id: TenantId, order_id: OrderId) -> MarketResult<Order> {
        match self.store.order(order_id).await? {
            Some(order) if order.role_of(tenant_id).is_some() => Ok(order),
            _ => Err(MarketError::not_found("order")),
        }
    }

    /// Audit trail of an order, oldest first.
    pub async fn order_history(&self, tenant_id: TenantId, order_id: OrderId) -> MarketResult<Vec<OrderEvent>> {
        self.order(tenant_id, order_id).await?;
        Ok(self.store.order_events(order_id).await?)
    }

    pub async fn list_orders(
        &self,
        tenant_id: TenantId,
        role: Option<PartyRole>,
        status: Option<OrderStatus>,
    ) -> MarketResult<Vec<Order>> {
        let filter = OrderFilter {
            tenant_id,
            role,
            status,
        };
        Ok(self.store.list_orders(&filter).await?)
    }

    // ---------------------------------------------------------------------
    // Reputation
    // ---------------------------------------------------------------------

    /// Rate the counterpart of a completed order. At most once per (order, role).
    pub async fn rate(
        &self,
        rater: TenantId,
        rater_user: Option<UserId>,
        order_id: OrderId,
        value: RatingValue,
        comment: Option<String>,
    ) -> MarketResult<RatingReceipt> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| MarketError::not_found("order"))?;

        // A repeat is answered with the stored rating before the new input is validated.
        if let Some(role) = order.role_of(rater) {
            let existing = self
                .store
                .order_ratings(order_id)
                .await?
                .into_iter()
                .find(|r| r.rater_role == role);
            if let Some(rating) = existing {
                debug!(order_id = %order_id, rater_role = %role, "duplicate rating ignored");
                let reputation = self.store.reputation(rating.rated_tenant).await?;
                return Ok(RatingReceipt {
                    rating,
                    created: false,
                    reputation,
                });
            }
        }

        let rating = Rating::submit(
            &order,
            SubmitRating {
                rater_tenant: rater,
                rater_user,
                value,
                comment,
                occurred_at: self.clock.now(),
            },
        )?;

        let outcome = self.store.insert_rating(&rating).await?;
        if outcome.created {
            info!(
                order_id = %order_id,
                rater_role = %outcome.rating.rater_role,
                rated_tenant = %outcome.rating.rated_tenant,
                value = outcome.rating.value.as_str(),
                "order rated"
            );
        } else {
            debug!(order_id = %order_id, rater_role = %outcome.rating.rater_role, "duplicate rating ignored");
        }

        Ok(RatingReceipt {
            rating: outcome.rating,
            created: outcome.created,
            reputation: outcome.reputation,
        })
    }

    pub async fn order_ratings(&self, tenant_id: TenantId, order_id: OrderId) -> MarketResult<Vec<Rating>> {
        self.order(tenant_id, order_id).await?;
        Ok(self.store.order_ratings(order_id).await?)
    }

    pub async fn reputation(&self, tenant_id: TenantId) -> MarketResult<Reputation> {
        Ok(self.store.reputation(tenant_id).await?)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn transition<F>(&self, order_id: OrderId, decide: F) -> MarketResult<TransitionOutcome>
    where
        F: Fn(&Order) -> Result<TransitionPlan, OrderError> + Send + Sync,
    {
        let outcome = self.store.transition(order_id, &decide).await?;
        if let Some(last) = outcome.events.last() {
            info!(
                order_id = %order_id,
                event_type = last.event_type(),
                status = %outcome.order.status(),
                version = outcome.order.version(),
                "order transition committed"
            );
            self.publish(&outcome.order, &outcome.events);
        }
        Ok(outcome)
    }

    /// Fan committed events out to both parties. Never fails the operation.
    fn publish(&self, order: &Order, events: &[OrderEvent]) {
        let first_sequence = order.version() + 1 - events.len() as u64;
        for (idx, event) in events.iter().enumerate() {
            for tenant_id in [order.buyer_id(), order.seller_id()] {
                let envelope = OrderEnvelope::new(
                    Uuid::now_v7(),
                    tenant_id,
                    order.id_typed().0,
                    ORDER_AGGREGATE_TYPE,
                    first_sequence + idx as u64,
                    event.event_type(),
                    event.occurred_at(),
                    event.clone(),
                );
                if let Err(err) = self.bus.publish(envelope) {
                    warn!(
                        order_id = %order.id_typed(),
                        tenant_id = %tenant_id,
                        event_type = event.event_type(),
                        error = ?err,
                        "failed to publish order event"
                    );
                }
            }
        }
    }
}

fn offer_command(actor: TenantId, delivery: DeliveryTerms, sla: OrderSla, at: DateTime<Utc>) -> OrderCommand {
    OrderCommand::Offer(OfferOrder {
        actor,
        delivery,
        sla,
        occurred_at: at,
    })
}

fn plan_for(order: &Order, command: &OrderCommand, at: DateTime<Utc>) -> Result<TransitionPlan, OrderError> {
    let (next, events) = order.decide(command)?;
    Ok(TransitionPlan::new(next, events, at))
}
