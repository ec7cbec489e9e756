use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The side a tenant plays in a marketplace order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Buyer,
    Supplier,
}

impl PartyRole {
    /// The role played by the other party of the same order.
    pub fn counterpart(self) -> Self {
        match self {
            PartyRole::Buyer => PartyRole::Supplier,
            PartyRole::Supplier => PartyRole::Buyer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Buyer => "buyer",
            PartyRole::Supplier => "supplier",
        }
    }
}

impl core::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(PartyRole::Buyer),
            "supplier" | "seller" => Ok(PartyRole::Supplier),
            other => Err(DomainError::validation(format!(
                "role must be one of: buyer, supplier (got '{other}')"
            ))),
        }
    }
}
