//! Listings domain module: supplier parts with a dual-currency price.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod listing;
pub mod pricing;

pub use listing::{Listing, ListingDraft, ListingId, ListingSnapshot};
pub use pricing::{convert, Currency, DualPrice, PRICE_DECIMALS};
