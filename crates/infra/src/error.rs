//! Error model of the marketplace service.
//!
//! Every failure surfaced to callers is a [`MarketError`] whose [`ErrorKind`]
//! is a stable machine code. Storage backends report [`StoreError`] for
//! infrastructure failures and [`CommitError`] when an atomic unit is refused.

use thiserror::Error;

use partsmarket_core::DomainError;
use partsmarket_credits::CreditError;
use partsmarket_orders::OrderError;
use partsmarket_reputation::RatingError;
use partsmarket_suppliers::DeliveryError;

/// Infrastructure failure of a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend unreachable, lock poisoned, transaction aborted.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A uniqueness constraint fired outside the expected paths.
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Why an atomic unit (order transition, balance mutation) did not commit.
///
/// Nothing is written when any of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stable error codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTransition,
    OrderAlreadyClosed,
    InsufficientFunds,
    InsufficientCredits,
    NoDeliveryOption,
    NotFound,
    Forbidden,
    Validation,
    StorageUnavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::OrderAlreadyClosed => "order_already_closed",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InsufficientCredits => "insufficient_credits",
            ErrorKind::NoDeliveryOption => "no_delivery_option",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation_error",
            ErrorKind::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a marketplace operation.
///
/// Everything except `StorageUnavailable` is a local, recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("order already closed: {0}")]
    OrderAlreadyClosed(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("no delivery option: {0}")]
    NoDeliveryOption(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            MarketError::OrderAlreadyClosed(_) => ErrorKind::OrderAlreadyClosed,
            MarketError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            MarketError::InsufficientCredits(_) => ErrorKind::InsufficientCredits,
            MarketError::NoDeliveryOption(_) => ErrorKind::NoDeliveryOption,
            MarketError::NotFound(_) => ErrorKind::NotFound,
            MarketError::Forbidden(_) => ErrorKind::Forbidden,
            MarketError::Validation(_) => ErrorKind::Validation,
            MarketError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }
}

impl From<DomainError> for MarketError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => MarketError::Validation(msg),
            DomainError::Unauthorized(msg) => MarketError::Forbidden(msg),
        }
    }
}

impl From<OrderError> for MarketError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { .. } | OrderError::NotYetExpired { .. } => {
                MarketError::InvalidTransition(err.to_string())
            }
            OrderError::AlreadyClosed { .. } | OrderError::DeadlinePassed { .. } => {
                MarketError::OrderAlreadyClosed(err.to_string())
            }
            OrderError::Forbidden { .. } => MarketError::Forbidden(err.to_string()),
            // Non-parties must not learn that the order exists.
            OrderError::NotAParty => MarketError::not_found("order"),
            OrderError::Domain(e) => e.into(),
        }
    }
}

impl From<CreditError> for MarketError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientFunds { .. } => MarketError::InsufficientFunds(err.to_string()),
            CreditError::BelowMinimum { .. } => MarketError::InsufficientCredits(err.to_string()),
            CreditError::InvalidAmount(_) => MarketError::Validation(err.to_string()),
        }
    }
}

impl From<DeliveryError> for MarketError {
    fn from(err: DeliveryError) -> Self {
        MarketError::NoDeliveryOption(err.to_string())
    }
}

impl From<RatingError> for MarketError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::NotRatable { .. } => MarketError::InvalidTransition(err.to_string()),
            RatingError::NotAParty => MarketError::not_found("order"),
            RatingError::Domain(e) => e.into(),
        }
    }
}

impl From<StoreError> for MarketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => MarketError::InvalidTransition(msg),
            other => MarketError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<CommitError> for MarketError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::NotFound(what) => MarketError::not_found(what),
            CommitError::Order(e) => e.into(),
            CommitError::Credit(e) => e.into(),
            CommitError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use partsmarket_core::{PartyRole, TenantId};
    use partsmarket_orders::{OrderAction, OrderStatus};
    use rust_decimal::Decimal;

    #[test]
    fn order_errors_map_to_stable_kinds() {
        let closed: MarketError = OrderError::AlreadyClosed {
            status: OrderStatus::Expired,
        }
        .into();
        assert_eq!(closed.kind().as_str(), "order_already_closed");

        let late: MarketError = OrderError::DeadlinePassed {
            action: OrderAction::Confirm,
            deadline: Utc::now(),
        }
        .into();
        assert_eq!(late.kind(), ErrorKind::OrderAlreadyClosed);

        let forbidden: MarketError = OrderError::Forbidden {
            action: OrderAction::Offer,
            required: PartyRole::Supplier,
        }
        .into();
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

        let stranger: MarketError = OrderError::NotAParty.into();
        assert_eq!(stranger.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn domain_errors_map_to_validation_or_forbidden() {
        let bad: MarketError = DomainError::validation("quantity must be positive").into();
        assert_eq!(bad.kind(), ErrorKind::Validation);

        let inactive: MarketError = DomainError::invariant("listing is not active").into();
        assert_eq!(inactive.kind(), ErrorKind::Validation);

        let not_owner: MarketError = DomainError::unauthorized("listing belongs to another supplier").into();
        assert_eq!(not_owner.kind(), ErrorKind::Forbidden);
        assert_eq!(not_owner.kind().as_str(), "forbidden");
    }

    #[test]
    fn credit_gate_and_debit_failures_are_distinct() {
        let tenant_id = TenantId::new();
        let gate: MarketError = CreditError::BelowMinimum {
            tenant_id,
            balance: Decimal::ZERO,
            minimum: Decimal::ONE,
        }
        .into();
        let debit: MarketError = CreditError::InsufficientFunds {
            tenant_id,
            balance: Decimal::ZERO,
            requested: Decimal::ONE,
        }
        .into();
        assert_eq!(gate.kind(), ErrorKind::InsufficientCredits);
        assert_eq!(debit.kind(), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn storage_failures_are_unavailable() {
        let err: MarketError = CommitError::Store(StoreError::Unavailable("pool closed".into())).into();
        assert_eq!(err.kind().as_str(), "storage_unavailable");
    }
}
