//! Supplier delivery configuration and the delivery resolver.
//!
//! Resolution walks the supplier's scheduled rounds starting from the request
//! time:
//!
//! 1. buyer city served: the first round whose cutoff has not passed yet
//!    (today first, then following days by day-type) fixes courier, cost and
//!    estimated days;
//! 2. city not served (or no usable round) and pickup allowed: pickup terms
//!    with zero cost and zero days;
//! 3. otherwise: [`DeliveryError::NoDeliveryOption`].

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use partsmarket_core::{DomainError, DomainResult};

/// How far ahead the resolver looks for the next round.
const LOOKAHEAD_DAYS: u32 = 7;
const MAX_DELIVERY_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Saturday,
    Sunday,
}

impl DayType {
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat => DayType::Saturday,
            Weekday::Sun => DayType::Sunday,
            _ => DayType::Weekday,
        }
    }
}

/// A courier service the supplier ships with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierService {
    pub name: String,
    /// Delivery cost charged to the buyer (RSD).
    pub cost: Decimal,
}

/// One scheduled delivery round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRound {
    /// Requests strictly before this local time make the round.
    pub cutoff: NaiveTime,
    /// Days from dispatch to delivery promised for this round.
    pub delivery_days: u32,
    /// Name of the courier service that runs the round.
    pub courier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub rounds: BTreeMap<DayType, Vec<DeliveryRound>>,
    #[serde(default)]
    pub couriers: Vec<CourierService>,
    #[serde(default)]
    pub pickup_allowed: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Courier,
    Pickup,
}

/// Terms attached to an order when the supplier offers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTerms {
    pub method: DeliveryMethod,
    pub courier: Option<String>,
    pub cost: Decimal,
    pub estimated_days: u32,
    pub cutoff: Option<NaiveTime>,
    pub dispatch_date: Option<NaiveDate>,
}

impl DeliveryTerms {
    pub fn pickup() -> Self {
        Self {
            method: DeliveryMethod::Pickup,
            courier: None,
            cost: Decimal::ZERO,
            estimated_days: 0,
            cutoff: None,
            dispatch_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("supplier cannot deliver to '{city}' and does not allow pickup")]
    NoDeliveryOption { city: String },
}

fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

impl DeliveryConfig {
    /// Validate and normalize a configuration submitted by a supplier.
    pub fn normalized(mut self) -> DomainResult<Self> {
        let mut cities: Vec<String> = Vec::with_capacity(self.cities.len());
        for city in &self.cities {
            let trimmed = city.trim();
            if trimmed.is_empty() {
                return Err(DomainError::validation("city names cannot be empty"));
            }
            if !cities.iter().any(|c| normalize_city(c) == normalize_city(trimmed)) {
                cities.push(trimmed.to_string());
            }
        }
        self.cities = cities;

        for (idx, courier) in self.couriers.iter_mut().enumerate() {
            courier.name = courier.name.trim().to_string();
            if courier.name.is_empty() {
                return Err(DomainError::validation(format!("courier #{idx} has no name")));
            }
            if courier.cost < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "courier '{}' has a negative cost",
                    courier.name
                )));
            }
        }
        for (idx, courier) in self.couriers.iter().enumerate() {
            if self.couriers[..idx].iter().any(|c| c.name == courier.name) {
                return Err(DomainError::validation(format!(
                    "courier '{}' is listed twice",
                    courier.name
                )));
            }
        }

        for (day_type, rounds) in self.rounds.iter_mut() {
            for round in rounds.iter_mut() {
                round.courier = round.courier.trim().to_string();
                if !self.couriers.iter().any(|c| c.name == round.courier) {
                    return Err(DomainError::validation(format!(
                        "{day_type:?} round at {} uses unknown courier '{}'",
                        round.cutoff, round.courier
                    )));
                }
                if round.delivery_days > MAX_DELIVERY_DAYS {
                    return Err(DomainError::validation(format!(
                        "delivery_days cannot exceed {MAX_DELIVERY_DAYS}"
                    )));
                }
            }
            rounds.sort_by_key(|r| r.cutoff);
        }

        self.notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(self)
    }

    pub fn serves(&self, city: &str) -> bool {
        let wanted = normalize_city(city);
        !wanted.is_empty() && self.cities.iter().any(|c| normalize_city(c) == wanted)
    }

    fn courier(&self, name: &str) -> Option<&CourierService> {
        self.couriers.iter().find(|c| c.name == name)
    }

    /// Resolve delivery terms for a buyer in `buyer_city` at local time `at`.
    pub fn resolve(&self, buyer_city: &str, at: NaiveDateTime) -> Result<DeliveryTerms, DeliveryError> {
        if self.serves(buyer_city) {
            if let Some(terms) = self.next_round(at) {
                return Ok(terms);
            }
        }

        if self.pickup_allowed {
            return Ok(DeliveryTerms::pickup());
        }

        Err(DeliveryError::NoDeliveryOption {
            city: buyer_city.trim().to_string(),
        })
    }

    fn next_round(&self, at: NaiveDateTime) -> Option<DeliveryTerms> {
        for days_ahead in 0..LOOKAHEAD_DAYS {
            let date = at.date().checked_add_days(Days::new(u64::from(days_ahead)))?;
            let Some(rounds) = self.rounds.get(&DayType::of(date)) else {
                continue;
            };

            let mut ordered: Vec<&DeliveryRound> = rounds.iter().collect();
            ordered.sort_by_key(|r| r.cutoff);

            for round in ordered {
                if days_ahead == 0 && at.time() >= round.cutoff {
                    continue;
                }
                let Some(courier) = self.courier(&round.courier) else {
                    continue;
                };

                return Some(DeliveryTerms {
                    method: DeliveryMethod::Courier,
                    courier: Some(courier.name.clone()),
                    cost: courier.cost,
                    estimated_days: days_ahead + round.delivery_days,
                    cutoff: Some(round.cutoff),
                    dispatch_date: Some(date),
                });
            }
        }
        None
    }
}
