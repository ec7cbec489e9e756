use partsmarket_core::TenantId;

use crate::EventEnvelope;

/// Messages addressed to a single tenant.
///
/// Workers use this to filter a shared subscription down to one tenant.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl<E> TenantScoped for EventEnvelope<E> {
    fn tenant_id(&self) -> TenantId {
        EventEnvelope::tenant_id(self)
    }
}
