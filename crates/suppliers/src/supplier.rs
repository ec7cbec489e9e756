use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use partsmarket_core::{DomainError, DomainResult, TenantId};

use crate::delivery::DeliveryConfig;

/// A tenant's seller-side profile.
///
/// `eur_rate` is RSD per EUR and is captured into every listing edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierProfile {
    tenant_id: TenantId,
    display_name: String,
    eur_rate: Decimal,
    delivery: DeliveryConfig,
    updated_at: DateTime<Utc>,
}

fn validate_rate(eur_rate: Decimal) -> DomainResult<Decimal> {
    if eur_rate <= Decimal::ZERO {
        return Err(DomainError::validation("eur_rate must be positive"));
    }
    Ok(eur_rate)
}

fn validate_name(display_name: &str) -> DomainResult<String> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("display_name cannot be empty"));
    }
    if trimmed.chars().count() > 200 {
        return Err(DomainError::validation("display_name is too long"));
    }
    Ok(trimmed.to_string())
}

impl SupplierProfile {
    /// New profile with an empty delivery configuration (no cities, no pickup).
    pub fn new(
        tenant_id: TenantId,
        display_name: &str,
        eur_rate: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            tenant_id,
            display_name: validate_name(display_name)?,
            eur_rate: validate_rate(eur_rate)?,
            delivery: DeliveryConfig::default(),
            updated_at: at,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn eur_rate(&self) -> Decimal {
        self.eur_rate
    }

    pub fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Update name and rate; existing listings keep the rate they were priced with.
    pub fn update(
        &mut self,
        display_name: &str,
        eur_rate: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let display_name = validate_name(display_name)?;
        let eur_rate = validate_rate(eur_rate)?;
        self.display_name = display_name;
        self.eur_rate = eur_rate;
        self.updated_at = at;
        Ok(())
    }

    pub fn set_delivery(&mut self, config: DeliveryConfig, at: DateTime<Utc>) -> DomainResult<()> {
        self.delivery = config.normalized()?;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{CourierService, DayType, DeliveryRound};
    use chrono::NaiveTime;

    fn profile() -> SupplierProfile {
        SupplierProfile::new(TenantId::new(), " Auto Delovi ", Decimal::new(1175, 1), Utc::now())
            .unwrap()
    }

    #[test]
    fn new_profile_trims_name_and_has_no_delivery() {
        let p = profile();
        assert_eq!(p.display_name(), "Auto Delovi");
        assert!(p.delivery().cities.is_empty());
        assert!(!p.delivery().pickup_allowed);
    }

    #[test]
    fn rate_must_be_positive() {
        let mut p = profile();
        let err = p.update("Auto Delovi", Decimal::ZERO, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(p.eur_rate(), Decimal::new(1175, 1));
    }

    #[test]
    fn invalid_delivery_config_is_not_applied() {
        let mut p = profile();
        let mut config = DeliveryConfig {
            cities: vec!["Niš".to_string()],
            couriers: vec![CourierService {
                name: "Post".to_string(),
                cost: Decimal::new(-1, 0),
            }],
            ..DeliveryConfig::default()
        };
        config.rounds.insert(
            DayType::Weekday,
            vec![DeliveryRound {
                cutoff: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                delivery_days: 1,
                courier: "Post".to_string(),
            }],
        );

        assert!(p.set_delivery(config, Utc::now()).is_err());
        assert!(p.delivery().cities.is_empty());
    }
}
