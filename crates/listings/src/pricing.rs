//! Dual-currency pricing.
//!
//! A listing price is one authoritative amount plus the supplier's RSD-per-EUR
//! rate captured at edit time. The amount in the other currency is always
//! derived through [`convert`], never stored or edited on its own.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use partsmarket_core::{DomainError, DomainResult};

/// Prices are kept with two decimals (midpoint away from zero).
pub const PRICE_DECIMALS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Rsd,
    Eur,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Rsd => "RSD",
            Currency::Eur => "EUR",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Currency::Rsd => Currency::Eur,
            Currency::Eur => Currency::Rsd,
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RSD" => Ok(Currency::Rsd),
            "EUR" => Ok(Currency::Eur),
            other => Err(DomainError::validation(format!(
                "currency must be RSD or EUR (got '{other}')"
            ))),
        }
    }
}

fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert `amount` from one currency to another using an RSD-per-EUR rate.
///
/// A non-positive rate yields zero; callers validate the rate before pricing.
pub fn convert(amount: Decimal, from: Currency, to: Currency, eur_rate: Decimal) -> Decimal {
    if from == to {
        return round_price(amount);
    }
    if eur_rate <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let converted = match from {
        Currency::Rsd => amount.checked_div(eur_rate).unwrap_or(Decimal::ZERO),
        Currency::Eur => amount.checked_mul(eur_rate).unwrap_or(Decimal::ZERO),
    };
    round_price(converted)
}

/// Authoritative price + the rate it was entered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualPrice {
    currency: Currency,
    amount: Decimal,
    eur_rate: Decimal,
}

impl DualPrice {
    pub fn new(amount: Decimal, currency: Currency, eur_rate: Decimal) -> DomainResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("price must be positive"));
        }
        if eur_rate <= Decimal::ZERO {
            return Err(DomainError::validation("eur_rate must be positive"));
        }

        Ok(Self {
            currency,
            amount: round_price(amount),
            eur_rate,
        })
    }

    /// The currency that was edited.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// The edited amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn eur_rate(&self) -> Decimal {
        self.eur_rate
    }

    pub fn amount_in(&self, currency: Currency) -> Decimal {
        convert(self.amount, self.currency, currency, self.eur_rate)
    }

    pub fn price_rsd(&self) -> Decimal {
        self.amount_in(Currency::Rsd)
    }

    pub fn price_eur(&self) -> Decimal {
        self.amount_in(Currency::Eur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rsd_price_derives_eur_with_two_decimals() {
        let price = DualPrice::new(dec("5000"), Currency::Rsd, dec("117.5")).unwrap();
        assert_eq!(price.price_eur(), dec("42.55"));
        assert_eq!(price.price_rsd(), dec("5000"));
    }

    #[test]
    fn eur_price_derives_rsd() {
        let price = DualPrice::new(dec("42.55"), Currency::Eur, dec("117.5")).unwrap();
        assert_eq!(price.price_rsd(), dec("4999.63"));
        assert_eq!(price.currency(), Currency::Eur);
    }

    #[test]
    fn midpoint_rounds_away_from_zero() {
        // 1 / 8 = 0.125
        assert_eq!(convert(dec("1"), Currency::Rsd, Currency::Eur, dec("8")), dec("0.13"));
    }

    #[test]
    fn rejects_non_positive_inputs() {
        assert!(DualPrice::new(Decimal::ZERO, Currency::Rsd, dec("117")).is_err());
        assert!(DualPrice::new(dec("10"), Currency::Rsd, Decimal::ZERO).is_err());
    }

    #[test]
    fn parses_currency_codes() {
        assert_eq!("eur".parse::<Currency>().unwrap(), Currency::Eur);
        assert!("usd".parse::<Currency>().is_err());
    }

    proptest! {
        /// Recomputing the derived price from the stored authoritative price
        /// and rate always reproduces it; going back lands within the rounding
        /// error of one derived cent.
        #[test]
        fn derived_price_is_reproducible(
            rsd_cents in 1i64..100_000_000i64,
            rate_milli in 50_000i64..200_000i64,
        ) {
            let rsd = Decimal::new(rsd_cents, 2);
            let rate = Decimal::new(rate_milli, 3);
            let price = DualPrice::new(rsd, Currency::Rsd, rate).unwrap();

            let eur = price.price_eur();
            prop_assert_eq!(eur, convert(rsd, Currency::Rsd, Currency::Eur, rate));
            prop_assert!(eur.scale() <= PRICE_DECIMALS);

            let back = convert(eur, Currency::Eur, Currency::Rsd, rate);
            let tolerance = rate * Decimal::new(5, 3) + Decimal::new(1, 2);
            prop_assert!((back - rsd).abs() <= tolerance);
        }
    }
}
