use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use partsmarket_core::{AggregateId, TenantId};
use partsmarket_credits::LedgerEntry;
use partsmarket_listings::{Listing, ListingId};
use partsmarket_orders::{Order, OrderId, OrderSla};
use partsmarket_reputation::{Rating, Reputation};
use partsmarket_suppliers::{FavoriteSupplier, SupplierProfile};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub listing_id: String,
    pub quantity: u32,
    pub buyer_city: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateOrderRequest {
    /// POSITIVE or NEGATIVE.
    pub value: String,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    pub amount: Decimal,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Signed; negative values debit.
    pub delta: Decimal,
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct UpsertSupplierRequest {
    pub display_name: String,
    pub eur_rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct PublishListingRequest {
    pub title: String,
    pub brand: String,
    pub category: String,
    pub color: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct RepriceListingRequest {
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct SetListingActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddFavoriteRequest {
    pub supplier_id: String,
}

// -------------------------
// Path / value parsing
// -------------------------

pub fn parse_tenant_id(raw: &str) -> Result<TenantId, axum::response::Response> {
    TenantId::from_str(raw.trim()).map_err(|_| errors::bad_request("invalid tenant id"))
}

pub fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    AggregateId::from_str(raw.trim())
        .map(OrderId::new)
        .map_err(|_| errors::bad_request("invalid order id"))
}

pub fn parse_listing_id(raw: &str) -> Result<ListingId, axum::response::Response> {
    AggregateId::from_str(raw.trim())
        .map(ListingId::new)
        .map_err(|_| errors::bad_request("invalid listing id"))
}

/// Parse an optional query/body value with the type's `FromStr`.
pub fn parse_optional<T>(raw: Option<&str>) -> Result<Option<T>, axum::response::Response>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| errors::bad_request(e.to_string())),
    }
}

pub fn parse_value<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| errors::bad_request(e.to_string()))
}

// -------------------------
// Response mapping
// -------------------------

pub fn order_to_json(order: &Order, sla: &OrderSla) -> serde_json::Value {
    let listing = order.listing();
    json!({
        "id": order.id_typed().to_string(),
        "buyer_id": order.buyer_id().to_string(),
        "seller_id": order.seller_id().to_string(),
        "status": order.status().as_str(),
        "listing": {
            "listing_id": listing.listing_id.to_string(),
            "title": listing.title,
            "brand": listing.brand,
            "category": listing.category,
            "unit_price": listing.unit_price,
            "currency": listing.currency.as_str(),
            "quantity": listing.quantity,
        },
        "total": order.total(),
        "buyer_city": order.buyer_city(),
        "delivery": order.delivery(),
        "created_at": order.created_at(),
        "offered_at": order.offered_at(),
        "expires_at": order.expires_at(),
        "deadline": order.deadline(sla),
        "closed_at": order.closed_at(),
        "reason": order.reason(),
        "version": partsmarket_core::AggregateRoot::version(order),
    })
}

pub fn listing_to_json(listing: &Listing) -> serde_json::Value {
    let price = listing.price();
    json!({
        "id": listing.id().to_string(),
        "supplier_id": listing.supplier_id().to_string(),
        "title": listing.title(),
        "brand": listing.brand(),
        "category": listing.category(),
        "color": listing.color(),
        "currency": price.currency().as_str(),
        "price_rsd": price.price_rsd(),
        "price_eur": price.price_eur(),
        "eur_rate": price.eur_rate(),
        "active": listing.is_active(),
        "created_at": listing.created_at(),
        "updated_at": listing.updated_at(),
    })
}

pub fn supplier_to_json(profile: &SupplierProfile) -> serde_json::Value {
    json!({
        "tenant_id": profile.tenant_id().to_string(),
        "display_name": profile.display_name(),
        "eur_rate": profile.eur_rate(),
        "delivery": profile.delivery(),
        "updated_at": profile.updated_at(),
    })
}

pub fn ledger_entry_to_json(entry: &LedgerEntry) -> serde_json::Value {
    json!({
        "entry_id": entry.entry_id.to_string(),
        "delta": entry.delta,
        "reason": entry.reason,
        "balance_after": entry.balance_after,
        "occurred_at": entry.occurred_at,
    })
}

pub fn favorite_to_json(favorite: &FavoriteSupplier) -> serde_json::Value {
    json!({
        "supplier_id": favorite.supplier_id.to_string(),
        "created_at": favorite.created_at,
    })
}

pub fn rating_to_json(rating: &Rating) -> serde_json::Value {
    json!({
        "id": rating.id.to_string(),
        "order_id": rating.order_id.to_string(),
        "rater_role": rating.rater_role.as_str(),
        "rated_tenant": rating.rated_tenant.to_string(),
        "value": rating.value.as_str(),
        "comment": rating.comment,
        "created_at": rating.created_at,
    })
}

pub fn reputation_to_json(reputation: &Reputation) -> serde_json::Value {
    json!({
        "tenant_id": reputation.tenant_id.to_string(),
        "positive_as_buyer": reputation.positive_as_buyer,
        "negative_as_buyer": reputation.negative_as_buyer,
        "positive_as_supplier": reputation.positive_as_supplier,
        "negative_as_supplier": reputation.negative_as_supplier,
        "score": reputation.score,
        "updated_at": reputation.updated_at,
    })
}
