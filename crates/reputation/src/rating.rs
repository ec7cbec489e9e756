use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use partsmarket_core::{AggregateId, DomainError, PartyRole, TenantId, UserId};
use partsmarket_orders::{Order, OrderId, OrderStatus};

pub const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingId(pub AggregateId);

impl core::fmt::Display for RatingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RatingValue {
    Positive,
    Negative,
}

impl RatingValue {
    pub fn as_str(self) -> &'static str {
        match self {
            RatingValue::Positive => "POSITIVE",
            RatingValue::Negative => "NEGATIVE",
        }
    }
}

impl FromStr for RatingValue {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(RatingValue::Positive),
            "NEGATIVE" => Ok(RatingValue::Negative),
            other => Err(DomainError::validation(format!(
                "rating must be POSITIVE or NEGATIVE (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatingError {
    #[error("only completed orders can be rated (order is {status})")]
    NotRatable { status: OrderStatus },

    #[error("tenant is not a party to this order")]
    NotAParty,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Input for rating the counterpart of a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRating {
    pub rater_tenant: TenantId,
    pub rater_user: Option<UserId>,
    pub value: RatingValue,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// One rating per (order, rater role).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub order_id: OrderId,
    pub rater_role: PartyRole,
    pub rater_tenant: TenantId,
    pub rater_user: Option<UserId>,
    pub rated_tenant: TenantId,
    pub value: RatingValue,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    /// Build a rating for `order`; the rater's role is derived from the order.
    pub fn submit(order: &Order, input: SubmitRating) -> Result<Self, RatingError> {
        let rater_role = order
            .role_of(input.rater_tenant)
            .ok_or(RatingError::NotAParty)?;
        if order.status() != OrderStatus::Completed {
            return Err(RatingError::NotRatable {
                status: order.status(),
            });
        }

        let comment = input
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
        {
            return Err(DomainError::validation(format!(
                "comment cannot exceed {MAX_COMMENT_LEN} characters"
            ))
            .into());
        }

        Ok(Self {
            id: RatingId(AggregateId::new()),
            order_id: order.id_typed(),
            rater_role,
            rater_tenant: input.rater_tenant,
            rater_user: input.rater_user,
            rated_tenant: order.party(rater_role.counterpart()),
            value: input.value,
            comment,
            created_at: input.occurred_at,
        })
    }

    /// The role the rated tenant played in the order.
    pub fn rated_role(&self) -> PartyRole {
        self.rater_role.counterpart()
    }
}
