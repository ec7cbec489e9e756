use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use partsmarket_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PartyRole, TenantId};
use partsmarket_events::Event;
use partsmarket_listings::ListingSnapshot;
use partsmarket_suppliers::DeliveryTerms;

use crate::settings::OrderSla;

const MAX_REASON_LEN: usize = 500;

/// Marketplace order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order lifecycle status. Closed set; terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Sent,
    Offered,
    Confirmed,
    Completed,
    Rejected,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Sent,
        OrderStatus::Offered,
        OrderStatus::Confirmed,
        OrderStatus::Completed,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
        OrderStatus::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Sent => "SENT",
            OrderStatus::Offered => "OFFERED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Rejected
                | OrderStatus::Cancelled
                | OrderStatus::Expired
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{}'", s.trim())))
    }
}

/// What a caller attempted; carried by errors and the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Offer,
    Reject,
    Confirm,
    Cancel,
    Complete,
    Expire,
}

impl OrderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderAction::Offer => "offer",
            OrderAction::Reject => "reject",
            OrderAction::Confirm => "confirm",
            OrderAction::Cancel => "cancel",
            OrderAction::Complete => "complete",
            OrderAction::Expire => "expire",
        }
    }

    /// The only role allowed to perform the action, if restricted.
    fn required_role(self) -> Option<PartyRole> {
        match self {
            OrderAction::Offer | OrderAction::Reject => Some(PartyRole::Supplier),
            OrderAction::Confirm | OrderAction::Cancel => Some(PartyRole::Buyer),
            OrderAction::Complete | OrderAction::Expire => None,
        }
    }
}

impl core::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cannot {action} an order in status {status}")]
    InvalidTransition {
        status: OrderStatus,
        action: OrderAction,
    },

    #[error("order is already closed ({status})")]
    AlreadyClosed { status: OrderStatus },

    #[error("cannot {action}: the deadline passed at {deadline}")]
    DeadlinePassed {
        action: OrderAction,
        deadline: DateTime<Utc>,
    },

    #[error("order is not due for expiry before {deadline}")]
    NotYetExpired { deadline: DateTime<Utc> },

    #[error("only the {required} may {action} this order")]
    Forbidden {
        action: OrderAction,
        required: PartyRole,
    },

    #[error("tenant is not a party to this order")]
    NotAParty,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Aggregate root: marketplace Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: TenantId,
    seller_id: TenantId,
    listing: ListingSnapshot,
    buyer_city: String,
    status: OrderStatus,
    delivery: Option<DeliveryTerms>,
    created_at: DateTime<Utc>,
    offered_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    version: u64,
}

/// Command: PlaceOrder (creation; not part of [`OrderCommand`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub buyer_id: TenantId,
    pub seller_id: TenantId,
    pub listing: ListingSnapshot,
    pub buyer_city: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferOrder {
    pub actor: TenantId,
    pub delivery: DeliveryTerms,
    pub sla: OrderSla,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectOrder {
    pub actor: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub actor: TenantId,
    pub buyer_fee: Decimal,
    pub supplier_fee: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub actor: TenantId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub actor: TenantId,
    pub occurred_at: DateTime<Utc>,
}

/// Scheduler-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireOrder {
    pub sla: OrderSla,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Offer(OfferOrder),
    Reject(RejectOrder),
    Confirm(ConfirmOrder),
    Cancel(CancelOrder),
    Complete(CompleteOrder),
    Expire(ExpireOrder),
}

impl OrderCommand {
    pub fn action(&self) -> OrderAction {
        match self {
            OrderCommand::Offer(_) => OrderAction::Offer,
            OrderCommand::Reject(_) => OrderAction::Reject,
            OrderCommand::Confirm(_) => OrderAction::Confirm,
            OrderCommand::Cancel(_) => OrderAction::Cancel,
            OrderCommand::Complete(_) => OrderAction::Complete,
            OrderCommand::Expire(_) => OrderAction::Expire,
        }
    }

    fn actor(&self) -> Option<TenantId> {
        match self {
            OrderCommand::Offer(c) => Some(c.actor),
            OrderCommand::Reject(c) => Some(c.actor),
            OrderCommand::Confirm(c) => Some(c.actor),
            OrderCommand::Cancel(c) => Some(c.actor),
            OrderCommand::Complete(c) => Some(c.actor),
            OrderCommand::Expire(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub buyer_id: TenantId,
    pub seller_id: TenantId,
    pub listing: ListingSnapshot,
    pub buyer_city: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOffered {
    pub order_id: OrderId,
    pub delivery: DeliveryTerms,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    pub buyer_fee: Decimal,
    pub supplier_fee: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub order_id: OrderId,
    pub completed_by: PartyRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpired {
    pub order_id: OrderId,
    pub expired_from: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Offered(OrderOffered),
    Rejected(OrderRejected),
    Confirmed(OrderConfirmed),
    Cancelled(OrderCancelled),
    Completed(OrderCompleted),
    Expired(OrderExpired),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Placed(e) => e.order_id,
            OrderEvent::Offered(e) => e.order_id,
            OrderEvent::Rejected(e) => e.order_id,
            OrderEvent::Confirmed(e) => e.order_id,
            OrderEvent::Cancelled(e) => e.order_id,
            OrderEvent::Completed(e) => e.order_id,
            OrderEvent::Expired(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "marketplace.order.placed",
            OrderEvent::Offered(_) => "marketplace.order.offered",
            OrderEvent::Rejected(_) => "marketplace.order.rejected",
            OrderEvent::Confirmed(_) => "marketplace.order.confirmed",
            OrderEvent::Cancelled(_) => "marketplace.order.cancelled",
            OrderEvent::Completed(_) => "marketplace.order.completed",
            OrderEvent::Expired(_) => "marketplace.order.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.occurred_at,
            OrderEvent::Offered(e) => e.occurred_at,
            OrderEvent::Rejected(e) => e.occurred_at,
            OrderEvent::Confirmed(e) => e.occurred_at,
            OrderEvent::Cancelled(e) => e.occurred_at,
            OrderEvent::Completed(e) => e.occurred_at,
            OrderEvent::Expired(e) => e.occurred_at,
        }
    }
}

fn clean_reason(reason: &Option<String>) -> Result<Option<String>, OrderError> {
    let reason = reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    if let Some(r) = &reason {
        if r.chars().count() > MAX_REASON_LEN {
            return Err(DomainError::validation(format!(
                "reason cannot exceed {MAX_REASON_LEN} characters"
            ))
            .into());
        }
    }
    Ok(reason)
}

impl Order {
    /// Validate a placement and build the creation event plus the resulting order.
    pub fn place(cmd: &PlaceOrder) -> Result<(Self, OrderEvent), OrderError> {
        if cmd.buyer_id == cmd.seller_id {
            return Err(DomainError::validation("a tenant cannot order its own listing").into());
        }
        if cmd.listing.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive").into());
        }
        let buyer_city = cmd.buyer_city.trim();
        if buyer_city.is_empty() {
            return Err(DomainError::validation("buyer_city cannot be empty").into());
        }

        let placed = OrderPlaced {
            order_id: cmd.order_id,
            buyer_id: cmd.buyer_id,
            seller_id: cmd.seller_id,
            listing: cmd.listing.clone(),
            buyer_city: buyer_city.to_string(),
            occurred_at: cmd.occurred_at,
        };
        Ok((Self::from_placed(&placed), OrderEvent::Placed(placed)))
    }

    /// Initial state produced by the creation event (version 1).
    pub fn from_placed(e: &OrderPlaced) -> Self {
        Self {
            id: e.order_id,
            buyer_id: e.buyer_id,
            seller_id: e.seller_id,
            listing: e.listing.clone(),
            buyer_city: e.buyer_city.clone(),
            status: OrderStatus::Sent,
            delivery: None,
            created_at: e.occurred_at,
            offered_at: None,
            expires_at: None,
            closed_at: None,
            reason: None,
            version: 1,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> TenantId {
        self.buyer_id
    }

    pub fn seller_id(&self) -> TenantId {
        self.seller_id
    }

    pub fn listing(&self) -> &ListingSnapshot {
        &self.listing
    }

    pub fn buyer_city(&self) -> &str {
        &self.buyer_city
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn delivery(&self) -> Option<&DeliveryTerms> {
        self.delivery.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn offered_at(&self) -> Option<DateTime<Utc>> {
        self.offered_at
    }

    /// Stored only once offered; see [`Order::deadline`] for SENT orders.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn total(&self) -> Decimal {
        self.listing.total()
    }

    pub fn role_of(&self, tenant_id: TenantId) -> Option<PartyRole> {
        if tenant_id == self.buyer_id {
            Some(PartyRole::Buyer)
        } else if tenant_id == self.seller_id {
            Some(PartyRole::Supplier)
        } else {
            None
        }
    }

    pub fn party(&self, role: PartyRole) -> TenantId {
        match role {
            PartyRole::Buyer => self.buyer_id,
            PartyRole::Supplier => self.seller_id,
        }
    }

    pub fn is_ratable(&self) -> bool {
        self.status == OrderStatus::Completed
    }

    /// When the current live state lapses: `created_at + sent window` for SENT,
    /// the stored `expires_at` for OFFERED, none otherwise.
    pub fn deadline(&self, sla: &OrderSla) -> Option<DateTime<Utc>> {
        match self.status {
            OrderStatus::Sent => Some(self.created_at + sla.sent_window()),
            OrderStatus::Offered => self.expires_at,
            _ => None,
        }
    }

    pub fn is_due(&self, sla: &OrderSla, now: DateTime<Utc>) -> bool {
        self.deadline(sla).is_some_and(|deadline| deadline <= now)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(e) => {
                *self = Self::from_placed(e);
                return;
            }
            OrderEvent::Offered(e) => {
                self.status = OrderStatus::Offered;
                self.delivery = Some(e.delivery.clone());
                self.offered_at = Some(e.occurred_at);
                self.expires_at = Some(e.expires_at);
            }
            OrderEvent::Rejected(e) => {
                self.status = OrderStatus::Rejected;
                self.reason = e.reason.clone();
                self.closed_at = Some(e.occurred_at);
            }
            OrderEvent::Confirmed(_) => {
                self.status = OrderStatus::Confirmed;
            }
            OrderEvent::Cancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.reason = e.reason.clone();
                self.closed_at = Some(e.occurred_at);
            }
            OrderEvent::Completed(e) => {
                self.status = OrderStatus::Completed;
                self.closed_at = Some(e.occurred_at);
            }
            OrderEvent::Expired(e) => {
                self.status = OrderStatus::Expired;
                self.closed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let action = command.action();
        if let Some(actor) = command.actor() {
            self.ensure_actor(actor, action)?;
        }

        match command {
            OrderCommand::Offer(cmd) => self.handle_offer(cmd),
            OrderCommand::Reject(cmd) => self.handle_reject(cmd),
            OrderCommand::Confirm(cmd) => self.handle_confirm(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::Complete(cmd) => self.handle_complete(cmd),
            OrderCommand::Expire(cmd) => self.handle_expire(cmd),
        }
    }
}

impl Order {
    fn ensure_actor(&self, actor: TenantId, action: OrderAction) -> Result<PartyRole, OrderError> {
        let role = self.role_of(actor).ok_or(OrderError::NotAParty)?;
        match action.required_role() {
            Some(required) if required != role => Err(OrderError::Forbidden { action, required }),
            _ => Ok(role),
        }
    }

    /// Terminal states are closed; any other status not in `allowed` is a rule violation.
    fn ensure_status(&self, action: OrderAction, allowed: &[OrderStatus]) -> Result<(), OrderError> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyClosed {
                status: self.status,
            });
        }
        Err(OrderError::InvalidTransition {
            status: self.status,
            action,
        })
    }

    fn handle_offer(&self, cmd: &OfferOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_status(OrderAction::Offer, &[OrderStatus::Sent])?;

        let deadline = self.created_at + cmd.sla.sent_window();
        if cmd.occurred_at >= deadline {
            return Err(OrderError::DeadlinePassed {
                action: OrderAction::Offer,
                deadline,
            });
        }

        Ok(vec![OrderEvent::Offered(OrderOffered {
            order_id: self.id,
            delivery: cmd.delivery.clone(),
            expires_at: cmd.occurred_at + cmd.sla.offer_window(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_status(OrderAction::Reject, &[OrderStatus::Sent])?;

        Ok(vec![OrderEvent::Rejected(OrderRejected {
            order_id: self.id,
            reason: clean_reason(&cmd.reason)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_status(OrderAction::Confirm, &[OrderStatus::Offered])?;

        // An offered order always carries expires_at; a missing one is treated as lapsed.
        let deadline = self.expires_at.unwrap_or(self.created_at);
        if cmd.occurred_at >= deadline {
            return Err(OrderError::DeadlinePassed {
                action: OrderAction::Confirm,
                deadline,
            });
        }

        Ok(vec![OrderEvent::Confirmed(OrderConfirmed {
            order_id: self.id,
            buyer_fee: cmd.buyer_fee,
            supplier_fee: cmd.supplier_fee,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_status(
            OrderAction::Cancel,
            &[OrderStatus::Sent, OrderStatus::Offered],
        )?;

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            order_id: self.id,
            reason: clean_reason(&cmd.reason)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteOrder) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status == OrderStatus::Completed {
            return Ok(Vec::new());
        }
        self.ensure_status(OrderAction::Complete, &[OrderStatus::Confirmed])?;

        let completed_by = self.role_of(cmd.actor).ok_or(OrderError::NotAParty)?;
        Ok(vec![OrderEvent::Completed(OrderCompleted {
            order_id: self.id,
            completed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireOrder) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_status(
            OrderAction::Expire,
            &[OrderStatus::Sent, OrderStatus::Offered],
        )?;

        if let Some(deadline) = self.deadline(&cmd.sla) {
            if cmd.occurred_at < deadline {
                return Err(OrderError::NotYetExpired { deadline });
            }
        }

        Ok(vec![OrderEvent::Expired(OrderExpired {
            order_id: self.id,
            expired_from: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use partsmarket_listings::{Currency, ListingId};
    use proptest::prelude::*;

    struct Parties {
        buyer: TenantId,
        seller: TenantId,
    }

    fn parties() -> Parties {
        Parties {
            buyer: TenantId::new(),
            seller: TenantId::new(),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-12T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snapshot() -> ListingSnapshot {
        ListingSnapshot {
            listing_id: ListingId::new(AggregateId::new()),
            title: "Brake pads".to_string(),
            brand: "Bosch".to_string(),
            category: "Brakes".to_string(),
            unit_price: Decimal::new(5000, 0),
            currency: Currency::Rsd,
            quantity: 2,
        }
    }

    fn placed(p: &Parties) -> Order {
        let (order, event) = Order::place(&PlaceOrder {
            order_id: OrderId::new(AggregateId::new()),
            buyer_id: p.buyer,
            seller_id: p.seller,
            listing: snapshot(),
            buyer_city: " Novi Sad ".to_string(),
            occurred_at: t0(),
        })
        .unwrap();
        assert!(matches!(event, OrderEvent::Placed(_)));
        order
    }

    fn offer(p: &Parties, at: DateTime<Utc>) -> OrderCommand {
        OrderCommand::Offer(OfferOrder {
            actor: p.seller,
            delivery: DeliveryTerms::pickup(),
            sla: OrderSla::default(),
            occurred_at: at,
        })
    }

    fn confirm(p: &Parties, at: DateTime<Utc>) -> OrderCommand {
        OrderCommand::Confirm(ConfirmOrder {
            actor: p.buyer,
            buyer_fee: Decimal::new(5, 1),
            supplier_fee: Decimal::new(5, 1),
            occurred_at: at,
        })
    }

    fn complete(actor: TenantId, at: DateTime<Utc>) -> OrderCommand {
        OrderCommand::Complete(CompleteOrder {
            actor,
            occurred_at: at,
        })
    }

    fn expire(at: DateTime<Utc>) -> OrderCommand {
        OrderCommand::Expire(ExpireOrder {
            sla: OrderSla::default(),
            occurred_at: at,
        })
    }

    #[test]
    fn place_starts_in_sent_without_stored_expiry() {
        let p = parties();
        let order = placed(&p);
        assert_eq!(order.status(), OrderStatus::Sent);
        assert_eq!(order.version(), 1);
        assert_eq!(order.buyer_city(), "Novi Sad");
        assert_eq!(order.expires_at(), None);
        assert_eq!(
            order.deadline(&OrderSla::default()),
            Some(t0() + Duration::hours(2))
        );
        assert_eq!(order.total(), Decimal::new(10000, 0));
    }

    #[test]
    fn self_orders_are_rejected() {
        let me = TenantId::new();
        let err = Order::place(&PlaceOrder {
            order_id: OrderId::new(AggregateId::new()),
            buyer_id: me,
            seller_id: me,
            listing: snapshot(),
            buyer_city: "Niš".to_string(),
            occurred_at: t0(),
        })
        .unwrap_err();
        assert!(matches!(err, OrderError::Domain(DomainError::Validation(_))));
    }

    #[test]
    fn full_lifecycle_reaches_completed() {
        let p = parties();
        let order = placed(&p);

        let (order, events) = order.decide(&offer(&p, t0() + Duration::minutes(30))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(order.status(), OrderStatus::Offered);
        assert_eq!(
            order.expires_at(),
            Some(t0() + Duration::minutes(30) + Duration::hours(4))
        );

        let (order, _) = order.decide(&confirm(&p, t0() + Duration::hours(4))).unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);

        let (order, events) = order.decide(&complete(p.seller, t0() + Duration::hours(30))).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(order.is_ratable());
        assert!(matches!(
            &events[0],
            OrderEvent::Completed(e) if e.completed_by == PartyRole::Supplier
        ));
        assert_eq!(order.version(), 4);
    }

    #[test]
    fn complete_on_completed_is_a_no_op() {
        let p = parties();
        let order = placed(&p);
        let (order, _) = order.decide(&offer(&p, t0())).unwrap();
        let (order, _) = order.decide(&confirm(&p, t0())).unwrap();
        let (order, _) = order.decide(&complete(p.buyer, t0())).unwrap();

        let (again, events) = order.decide(&complete(p.seller, t0())).unwrap();
        assert!(events.is_empty());
        assert_eq!(again, order);
    }

    #[test]
    fn only_the_seller_may_offer_and_strangers_are_not_parties() {
        let p = parties();
        let order = placed(&p);

        let buyer_offer = OrderCommand::Offer(OfferOrder {
            actor: p.buyer,
            delivery: DeliveryTerms::pickup(),
            sla: OrderSla::default(),
            occurred_at: t0(),
        });
        assert_eq!(
            order.handle(&buyer_offer).unwrap_err(),
            OrderError::Forbidden {
                action: OrderAction::Offer,
                required: PartyRole::Supplier
            }
        );

        assert_eq!(
            order.handle(&complete(TenantId::new(), t0())).unwrap_err(),
            OrderError::NotAParty
        );
    }

    #[test]
    fn confirm_from_sent_is_an_invalid_transition() {
        let p = parties();
        let order = placed(&p);
        assert_eq!(
            order.handle(&confirm(&p, t0())).unwrap_err(),
            OrderError::InvalidTransition {
                status: OrderStatus::Sent,
                action: OrderAction::Confirm
            }
        );
    }

    #[test]
    fn terminal_orders_report_already_closed() {
        let p = parties();
        let order = placed(&p);
        let reject = OrderCommand::Reject(RejectOrder {
            actor: p.seller,
            reason: Some("  out of stock ".to_string()),
            occurred_at: t0(),
        });
        let (order, _) = order.decide(&reject).unwrap();
        assert_eq!(order.status(), OrderStatus::Rejected);
        assert_eq!(order.reason(), Some("out of stock"));
        assert!(order.closed_at().is_some());

        assert_eq!(
            order.handle(&offer(&p, t0())).unwrap_err(),
            OrderError::AlreadyClosed {
                status: OrderStatus::Rejected
            }
        );
    }

    #[test]
    fn late_confirm_fails_even_before_the_sweep() {
        let p = parties();
        let (order, _) = placed(&p).decide(&offer(&p, t0())).unwrap();

        let err = order
            .handle(&confirm(&p, t0() + Duration::hours(4)))
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::DeadlinePassed {
                action: OrderAction::Confirm,
                ..
            }
        ));

        let ok = order.handle(&confirm(&p, t0() + Duration::minutes(239)));
        assert!(ok.is_ok());
    }

    #[test]
    fn offer_after_sent_window_is_too_late() {
        let p = parties();
        let order = placed(&p);
        let err = order
            .handle(&offer(&p, t0() + Duration::minutes(121)))
            .unwrap_err();
        assert!(matches!(err, OrderError::DeadlinePassed { .. }));
    }

    #[test]
    fn expire_respects_deadlines() {
        let p = parties();
        let order = placed(&p);

        assert!(matches!(
            order.handle(&expire(t0() + Duration::minutes(119))),
            Err(OrderError::NotYetExpired { .. })
        ));

        let (expired, events) = order.decide(&expire(t0() + Duration::minutes(121))).unwrap();
        assert_eq!(expired.status(), OrderStatus::Expired);
        assert!(matches!(
            &events[0],
            OrderEvent::Expired(e) if e.expired_from == OrderStatus::Sent
        ));

        assert_eq!(
            expired.handle(&confirm(&p, t0())).unwrap_err(),
            OrderError::AlreadyClosed {
                status: OrderStatus::Expired
            }
        );
    }

    #[test]
    fn confirmed_orders_cannot_expire_or_be_cancelled() {
        let p = parties();
        let (order, _) = placed(&p).decide(&offer(&p, t0())).unwrap();
        let (order, _) = order.decide(&confirm(&p, t0())).unwrap();

        assert!(matches!(
            order.handle(&expire(t0() + Duration::days(3))),
            Err(OrderError::InvalidTransition { .. })
        ));
        let cancel = OrderCommand::Cancel(CancelOrder {
            actor: p.buyer,
            reason: None,
            occurred_at: t0(),
        });
        assert!(matches!(
            order.handle(&cancel),
            Err(OrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("offered".parse::<OrderStatus>().unwrap(), OrderStatus::Offered);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    fn allowed(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (from, to),
            (Sent, Offered)
                | (Sent, Rejected)
                | (Sent, Cancelled)
                | (Sent, Expired)
                | (Offered, Confirmed)
                | (Offered, Cancelled)
                | (Offered, Expired)
                | (Confirmed, Completed)
        )
    }

    proptest! {
        /// Any sequence of commands by any actor at any time only ever moves
        /// along the lifecycle graph, and terminal states never change.
        #[test]
        fn transitions_follow_the_lifecycle_graph(
            steps in prop::collection::vec((0u8..6, 0u8..3, 0i64..600), 1..25)
        ) {
            let p = parties();
            let stranger = TenantId::new();
            let mut order = placed(&p);

            for (kind, who, minutes) in steps {
                let actor = match who {
                    0 => p.buyer,
                    1 => p.seller,
                    _ => stranger,
                };
                let at = t0() + Duration::minutes(minutes);
                let command = match kind {
                    0 => OrderCommand::Offer(OfferOrder {
                        actor,
                        delivery: DeliveryTerms::pickup(),
                        sla: OrderSla::default(),
                        occurred_at: at,
                    }),
                    1 => OrderCommand::Reject(RejectOrder { actor, reason: None, occurred_at: at }),
                    2 => OrderCommand::Confirm(ConfirmOrder {
                        actor,
                        buyer_fee: Decimal::ONE,
                        supplier_fee: Decimal::ONE,
                        occurred_at: at,
                    }),
                    3 => OrderCommand::Cancel(CancelOrder { actor, reason: None, occurred_at: at }),
                    4 => complete(actor, at),
                    _ => expire(at),
                };

                let before = order.status();
                match order.decide(&command) {
                    Ok((next, events)) => {
                        if events.is_empty() {
                            prop_assert_eq!(&next, &order);
                        } else {
                            prop_assert!(allowed(before, next.status()));
                            prop_assert_eq!(next.version(), order.version() + events.len() as u64);
                        }
                        order = next;
                    }
                    Err(OrderError::AlreadyClosed { status }) => {
                        prop_assert!(status.is_terminal());
                    }
                    Err(_) => {}
                }
                prop_assert!(OrderStatus::ALL.contains(&order.status()));
            }
        }
    }
}
