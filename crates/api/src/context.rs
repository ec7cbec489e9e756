use partsmarket_core::{TenantId, UserId};

/// Tenant context for a request, set by the upstream gateway.
///
/// This is immutable and must be present for all marketplace routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    user_id: Option<UserId>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, user_id: Option<UserId>) -> Self {
        Self { tenant_id, user_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Acting user within the tenant, when the gateway forwards one.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}
