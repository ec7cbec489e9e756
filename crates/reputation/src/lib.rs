//! Ratings and per-tenant reputation counters.

pub mod rating;
pub mod reputation;

pub use rating::{Rating, RatingError, RatingId, RatingValue, SubmitRating, MAX_COMMENT_LEN};
pub use reputation::Reputation;
