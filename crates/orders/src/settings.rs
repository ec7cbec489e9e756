use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use partsmarket_core::{DomainError, DomainResult};

/// Platform-wide fee settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceSettings {
    /// Credits debited from the buyer on confirmation.
    pub buyer_fee: Decimal,
    /// Credits debited from the supplier on confirmation.
    pub supplier_fee: Decimal,
    /// Balance both parties need to place or confirm an order.
    pub min_credits: Decimal,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            buyer_fee: Decimal::new(5, 1),
            supplier_fee: Decimal::new(5, 1),
            min_credits: Decimal::ONE,
        }
    }
}

impl MarketplaceSettings {
    pub fn validate(&self) -> DomainResult<()> {
        if self.buyer_fee < Decimal::ZERO || self.supplier_fee < Decimal::ZERO {
            return Err(DomainError::validation("fees cannot be negative"));
        }
        if self.min_credits < Decimal::ZERO {
            return Err(DomainError::validation("min_credits cannot be negative"));
        }
        Ok(())
    }
}

/// Read access to the current settings (owned by platform administration).
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> MarketplaceSettings;
}

/// Response windows of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSla {
    /// Supplier must offer within this many minutes of creation.
    pub sent_window_minutes: i64,
    /// Buyer must confirm within this many minutes of the offer.
    pub offer_window_minutes: i64,
}

impl Default for OrderSla {
    fn default() -> Self {
        Self {
            sent_window_minutes: 120,
            offer_window_minutes: 240,
        }
    }
}

impl OrderSla {
    pub fn sent_window(&self) -> Duration {
        Duration::minutes(self.sent_window_minutes)
    }

    pub fn offer_window(&self) -> Duration {
        Duration::minutes(self.offer_window_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_configuration() {
        let s = MarketplaceSettings::default();
        assert_eq!(s.buyer_fee.to_string(), "0.5");
        assert_eq!(s.supplier_fee.to_string(), "0.5");
        assert_eq!(s.min_credits, Decimal::ONE);
        assert!(s.validate().is_ok());

        let sla = OrderSla::default();
        assert_eq!(sla.sent_window(), Duration::hours(2));
        assert_eq!(sla.offer_window(), Duration::hours(4));
    }

    #[test]
    fn negative_fees_are_invalid() {
        let s = MarketplaceSettings {
            buyer_fee: Decimal::new(-1, 0),
            ..MarketplaceSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
