//! Marketplace order state machine.
//!
//! ```text
//! SENT ──offer──▶ OFFERED ──confirm──▶ CONFIRMED ──complete──▶ COMPLETED
//!  │ └─reject──▶ REJECTED    │
//!  ├──cancel / expire────────┴──▶ CANCELLED / EXPIRED
//! ```
//!
//! The aggregate is pure: storage backends load it under an exclusive per-order
//! lock, call [`Aggregate::decide`](partsmarket_core::Aggregate::decide) and
//! persist the result together with any credit debits.

pub mod order;
pub mod settings;

pub use order::{
    CancelOrder, CompleteOrder, ConfirmOrder, ExpireOrder, OfferOrder, Order, OrderAction,
    OrderCancelled, OrderCommand, OrderCompleted, OrderConfirmed, OrderError, OrderEvent,
    OrderExpired, OrderId, OrderOffered, OrderPlaced, OrderRejected, OrderStatus, PlaceOrder,
    RejectOrder,
};
pub use settings::{MarketplaceSettings, OrderSla, SettingsProvider};
