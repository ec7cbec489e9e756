//! Supplier directory: supplier profiles, delivery configuration with the
//! delivery resolver, and favorite-supplier pins.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod delivery;
pub mod favorite;
pub mod supplier;

pub use delivery::{
    CourierService, DayType, DeliveryConfig, DeliveryError, DeliveryMethod, DeliveryRound,
    DeliveryTerms,
};
pub use favorite::FavoriteSupplier;
pub use supplier::SupplierProfile;
