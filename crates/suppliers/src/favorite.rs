use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use partsmarket_core::{DomainError, DomainResult, TenantId};

/// A tenant's pin on a supplier it buys from often. Unique per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteSupplier {
    pub tenant_id: TenantId,
    pub supplier_id: TenantId,
    pub created_at: DateTime<Utc>,
}

impl FavoriteSupplier {
    pub fn new(tenant_id: TenantId, supplier_id: TenantId, at: DateTime<Utc>) -> DomainResult<Self> {
        if tenant_id == supplier_id {
            return Err(DomainError::validation("a tenant cannot pin itself as a favorite supplier"));
        }
        Ok(Self {
            tenant_id,
            supplier_id,
            created_at: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_pin_is_rejected() {
        let me = TenantId::new();
        assert!(FavoriteSupplier::new(me, me, Utc::now()).is_err());
        assert!(FavoriteSupplier::new(me, TenantId::new(), Utc::now()).is_ok());
    }
}
