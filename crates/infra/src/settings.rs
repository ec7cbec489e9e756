//! Settings providers.

use std::sync::RwLock;

use partsmarket_core::DomainResult;
use partsmarket_orders::{MarketplaceSettings, SettingsProvider};

/// Settings fixed at startup, replaceable by platform administration.
#[derive(Debug)]
pub struct StaticSettings {
    current: RwLock<MarketplaceSettings>,
}

impl StaticSettings {
    pub fn new(settings: MarketplaceSettings) -> DomainResult<Self> {
        settings.validate()?;
        Ok(Self {
            current: RwLock::new(settings),
        })
    }

    /// Swap the settings; later operations read the new values.
    pub fn replace(&self, settings: MarketplaceSettings) -> DomainResult<()> {
        settings.validate()?;
        match self.current.write() {
            Ok(mut current) => *current = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
        Ok(())
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            current: RwLock::new(MarketplaceSettings::default()),
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn settings(&self) -> MarketplaceSettings {
        match self.current.read() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn replaced_settings_are_visible_and_validated() {
        let provider = StaticSettings::default();
        let cheaper = MarketplaceSettings {
            buyer_fee: Decimal::new(25, 2),
            ..MarketplaceSettings::default()
        };
        provider.replace(cheaper).unwrap();
        assert_eq!(provider.settings().buyer_fee, Decimal::new(25, 2));

        let broken = MarketplaceSettings {
            min_credits: Decimal::new(-1, 0),
            ..MarketplaceSettings::default()
        };
        assert!(provider.replace(broken).is_err());
        assert_eq!(provider.settings(), cheaper);
    }
}
