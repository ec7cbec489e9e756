//! Credit ledger domain: per-tenant fee-credit balances and the immutable
//! entries every balance mutation appends.
//!
//! Serialization of mutations per tenant is the storage backend's job; this
//! crate only guarantees that a single account never goes negative.

pub mod account;

pub use account::{
    BalanceGate, CreditAccount, CreditError, CreditMutation, CreditReason, LedgerEntry,
    MutationKind,
};
