use std::io;
use std::sync::Arc;

use partsmarket_core::TenantId;
use partsmarket_events::EventBus;

use super::{WorkerHandle, spawn_subscriber};
use crate::notify::{Notification, Notifier, OrderEnvelope};

/// Hands every published order envelope to a [`Notifier`].
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    pub fn spawn<B, N>(bus: &B, notifier: Arc<N>) -> io::Result<WorkerHandle>
    where
        B: EventBus<OrderEnvelope> + ?Sized,
        N: Notifier + ?Sized + 'static,
    {
        Self::spawn_for(bus, None, notifier)
    }

    /// Like [`NotificationWorker::spawn`], restricted to one tenant's envelopes.
    pub fn spawn_for<B, N>(
        bus: &B,
        tenant_id: Option<TenantId>,
        notifier: Arc<N>,
    ) -> io::Result<WorkerHandle>
    where
        B: EventBus<OrderEnvelope> + ?Sized,
        N: Notifier + ?Sized + 'static,
    {
        spawn_subscriber("marketplace-notifier", bus, tenant_id, move |envelope: OrderEnvelope| {
            notifier.notify(&Notification::from_envelope(&envelope))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use partsmarket_core::AggregateId;
    use partsmarket_events::InMemoryEventBus;
    use partsmarket_orders::{OrderCompleted, OrderEvent, OrderId};
    use partsmarket_core::PartyRole;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        type Error = ();

        fn notify(&self, notification: &Notification) -> Result<(), ()> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn envelope(tenant_id: TenantId) -> OrderEnvelope {
        let order_id = OrderId::new(AggregateId::new());
        OrderEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            order_id.0,
            "marketplace.order",
            4,
            "marketplace.order.completed",
            Utc::now(),
            OrderEvent::Completed(OrderCompleted {
                order_id,
                completed_by: PartyRole::Buyer,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn tenant_filtered_worker_only_sees_its_tenant() {
        let bus = InMemoryEventBus::<OrderEnvelope>::new();
        let recorder = Arc::new(Recorder::default());
        let mine = TenantId::new();

        let handle = NotificationWorker::spawn_for(&bus, Some(mine), recorder.clone()).unwrap();
        bus.publish(envelope(TenantId::new())).unwrap();
        bus.publish(envelope(mine)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while recorder.0.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].tenant_id, mine);
        assert_eq!(seen[0].message, "order completed by the buyer");
    }
}
