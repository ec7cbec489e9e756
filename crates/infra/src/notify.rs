//! Outbound notifications (SMS/email dispatch lives behind [`Notifier`]).

use serde::{Deserialize, Serialize};
use tracing::info;

use partsmarket_core::TenantId;
use partsmarket_events::{Event, EventEnvelope};
use partsmarket_orders::{OrderEvent, OrderId};

/// Envelope type published for every committed order event.
pub type OrderEnvelope = EventEnvelope<OrderEvent>;

/// One message for one tenant about one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub event_type: String,
    pub message: String,
}

impl Notification {
    pub fn from_envelope(envelope: &OrderEnvelope) -> Self {
        let event = envelope.payload();
        Self {
            tenant_id: envelope.tenant_id(),
            order_id: event.order_id(),
            event_type: event.event_type().to_string(),
            message: describe(event),
        }
    }
}

fn describe(event: &OrderEvent) -> String {
    match event {
        OrderEvent::Placed(e) => format!("new order for {} x {}", e.listing.quantity, e.listing.title),
        OrderEvent::Offered(e) => format!("offer received, confirm before {}", e.expires_at.to_rfc3339()),
        OrderEvent::Rejected(e) => match &e.reason {
            Some(reason) => format!("order rejected: {reason}"),
            None => "order rejected".to_string(),
        },
        OrderEvent::Confirmed(_) => "order confirmed".to_string(),
        OrderEvent::Cancelled(e) => match &e.reason {
            Some(reason) => format!("order cancelled: {reason}"),
            None => "order cancelled".to_string(),
        },
        OrderEvent::Completed(e) => format!("order completed by the {}", e.completed_by),
        OrderEvent::Expired(e) => format!("order expired while {}", e.expired_from),
    }
}

/// Delivery of notifications to tenants. Implementations must tolerate duplicates.
pub trait Notifier: Send + Sync {
    type Error: core::fmt::Debug + Send + 'static;

    fn notify(&self, notification: &Notification) -> Result<(), Self::Error>;
}

/// Writes notifications to the log instead of dispatching them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    type Error = core::convert::Infallible;

    fn notify(&self, notification: &Notification) -> Result<(), Self::Error> {
        info!(
            tenant_id = %notification.tenant_id,
            order_id = %notification.order_id,
            event_type = %notification.event_type,
            "{}",
            notification.message
        );
        Ok(())
    }
}
