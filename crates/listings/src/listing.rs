use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use partsmarket_core::{AggregateId, DomainError, DomainResult, TenantId};

use crate::pricing::{Currency, DualPrice};

/// Listing identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub AggregateId);

impl ListingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ListingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supplier input for a new listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub brand: String,
    pub category: String,
    pub color: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
}

/// A priced part offered on the marketplace by one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    id: ListingId,
    supplier_id: TenantId,
    title: String,
    brand: String,
    category: String,
    color: Option<String>,
    price: DualPrice,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

impl Listing {
    /// Publish a new, active listing priced against the supplier's current rate.
    pub fn publish(
        id: ListingId,
        supplier_id: TenantId,
        draft: ListingDraft,
        eur_rate: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let price = DualPrice::new(draft.amount, draft.currency, eur_rate)?;
        let color = draft
            .color
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            id,
            supplier_id,
            title: required("title", &draft.title)?,
            brand: required("brand", &draft.brand)?,
            category: required("category", &draft.category)?,
            color,
            price,
            active: true,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn id(&self) -> ListingId {
        self.id
    }

    pub fn supplier_id(&self) -> TenantId {
        self.supplier_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn price(&self) -> &DualPrice {
        &self.price
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn ensure_owner(&self, tenant_id: TenantId) -> DomainResult<()> {
        if self.supplier_id != tenant_id {
            return Err(DomainError::unauthorized("listing belongs to another supplier"));
        }
        Ok(())
    }

    /// Replace the authoritative price; the other currency is re-derived from
    /// `eur_rate`, which must be the supplier's rate at the time of the edit.
    pub fn reprice(
        &mut self,
        amount: Decimal,
        currency: Currency,
        eur_rate: Decimal,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.price = DualPrice::new(amount, currency, eur_rate)?;
        self.updated_at = at;
        Ok(())
    }

    pub fn set_active(&mut self, active: bool, at: DateTime<Utc>) {
        if self.active != active {
            self.active = active;
            self.updated_at = at;
        }
    }

    /// Capture the price an order is placed at.
    pub fn snapshot(&self, quantity: u32) -> DomainResult<ListingSnapshot> {
        if !self.active {
            return Err(DomainError::invariant("listing is not active"));
        }
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(ListingSnapshot {
            listing_id: self.id,
            title: self.title.clone(),
            brand: self.brand.clone(),
            category: self.category.clone(),
            unit_price: self.price.amount(),
            currency: self.price.currency(),
            quantity,
        })
    }
}

/// Listing data frozen into an order at creation time.
///
/// Later listing edits never change an in-flight order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub listing_id: ListingId,
    pub title: String,
    pub brand: String,
    pub category: String,
    pub unit_price: Decimal,
    pub currency: Currency,
    pub quantity: u32,
}

impl ListingSnapshot {
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn draft() -> ListingDraft {
        ListingDraft {
            title: " Brake pads ".to_string(),
            brand: "Bosch".to_string(),
            category: "Brakes".to_string(),
            color: Some("".to_string()),
            amount: dec("5000"),
            currency: Currency::Rsd,
        }
    }

    fn publish() -> Listing {
        Listing::publish(
            ListingId::new(AggregateId::new()),
            TenantId::new(),
            draft(),
            dec("117.5"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn publish_trims_fields_and_derives_eur() {
        let listing = publish();
        assert_eq!(listing.title(), "Brake pads");
        assert_eq!(listing.color(), None);
        assert_eq!(listing.price().price_eur(), dec("42.55"));
        assert!(listing.is_active());
    }

    #[test]
    fn publish_requires_brand() {
        let mut d = draft();
        d.brand = "  ".to_string();
        let err = Listing::publish(
            ListingId::new(AggregateId::new()),
            TenantId::new(),
            d,
            dec("117.5"),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("brand")));
    }

    #[test]
    fn snapshot_is_immune_to_later_reprice() {
        let mut listing = publish();
        let snapshot = listing.snapshot(2).unwrap();

        listing
            .reprice(dec("60"), Currency::Eur, dec("118"), Utc::now())
            .unwrap();

        assert_eq!(snapshot.unit_price, dec("5000"));
        assert_eq!(snapshot.currency, Currency::Rsd);
        assert_eq!(snapshot.total(), dec("10000"));
        assert_eq!(listing.price().price_rsd(), dec("7080"));
    }

    #[test]
    fn inactive_listing_cannot_be_ordered() {
        let mut listing = publish();
        listing.set_active(false, Utc::now());
        assert!(matches!(
            listing.snapshot(1),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn only_owner_may_edit() {
        let listing = publish();
        assert!(listing.ensure_owner(listing.supplier_id()).is_ok());
        assert!(matches!(
            listing.ensure_owner(TenantId::new()),
            Err(DomainError::Unauthorized(_))
        ));
    }
}
