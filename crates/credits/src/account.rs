use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use partsmarket_core::{AggregateId, PartyRole, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditError {
    #[error("tenant {tenant_id} has {balance} credits, cannot debit {requested}")]
    InsufficientFunds {
        tenant_id: TenantId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("tenant {tenant_id} has {balance} credits, at least {minimum} required")]
    BelowMinimum {
        tenant_id: TenantId,
        balance: Decimal,
        minimum: Decimal,
    },

    #[error("credit amount must be positive (got {0})")]
    InvalidAmount(Decimal),
}

/// Why a balance changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreditReason {
    /// Platform fee charged when an order is confirmed.
    OrderFee { order_id: AggregateId, role: PartyRole },
    TopUp { reference: Option<String> },
    Adjustment { note: String },
}

/// Immutable audit record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub tenant_id: TenantId,
    /// Signed: negative for debits.
    pub delta: Decimal,
    pub reason: CreditReason,
    pub balance_after: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Debit,
    Credit,
}

/// A pending balance change, applied by the store under the tenant's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditMutation {
    pub tenant_id: TenantId,
    pub amount: Decimal,
    pub kind: MutationKind,
    pub reason: CreditReason,
}

impl CreditMutation {
    pub fn debit(tenant_id: TenantId, amount: Decimal, reason: CreditReason) -> Self {
        Self {
            tenant_id,
            amount,
            kind: MutationKind::Debit,
            reason,
        }
    }

    pub fn credit(tenant_id: TenantId, amount: Decimal, reason: CreditReason) -> Self {
        Self {
            tenant_id,
            amount,
            kind: MutationKind::Credit,
            reason,
        }
    }
}

/// Read-only "balance ≥ minimum" check evaluated under the tenant's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceGate {
    pub tenant_id: TenantId,
    pub minimum: Decimal,
}

impl BalanceGate {
    pub fn new(tenant_id: TenantId, minimum: Decimal) -> Self {
        Self { tenant_id, minimum }
    }

    pub fn check(&self, account: &CreditAccount) -> Result<(), CreditError> {
        if account.balance() < self.minimum {
            return Err(CreditError::BelowMinimum {
                tenant_id: self.tenant_id,
                balance: account.balance(),
                minimum: self.minimum,
            });
        }
        Ok(())
    }
}

/// One tenant's credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    tenant_id: TenantId,
    balance: Decimal,
    updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Unknown tenants start at zero.
    pub fn open(tenant_id: TenantId, at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            balance: Decimal::ZERO,
            updated_at: at,
        }
    }

    /// Rehydrate from storage.
    pub fn restore(tenant_id: TenantId, balance: Decimal, updated_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            balance,
            updated_at,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn debit(
        &mut self,
        amount: Decimal,
        reason: CreditReason,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, CreditError> {
        if amount <= Decimal::ZERO {
            return Err(CreditError::InvalidAmount(amount));
        }
        let next = self.balance - amount;
        if next < Decimal::ZERO {
            return Err(CreditError::InsufficientFunds {
                tenant_id: self.tenant_id,
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(self.commit(-amount, next, reason, at))
    }

    pub fn credit(
        &mut self,
        amount: Decimal,
        reason: CreditReason,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, CreditError> {
        if amount <= Decimal::ZERO {
            return Err(CreditError::InvalidAmount(amount));
        }
        let next = self.balance + amount;
        Ok(self.commit(amount, next, reason, at))
    }

    pub fn apply(
        &mut self,
        mutation: &CreditMutation,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, CreditError> {
        match mutation.kind {
            MutationKind::Debit => self.debit(mutation.amount, mutation.reason.clone(), at),
            MutationKind::Credit => self.credit(mutation.amount, mutation.reason.clone(), at),
        }
    }

    fn commit(
        &mut self,
        delta: Decimal,
        next: Decimal,
        reason: CreditReason,
        at: DateTime<Utc>,
    ) -> LedgerEntry {
        self.balance = next;
        self.updated_at = at;
        LedgerEntry {
            entry_id: Uuid::now_v7(),
            tenant_id: self.tenant_id,
            delta,
            reason,
            balance_after: next,
            occurred_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn top_up() -> CreditReason {
        CreditReason::TopUp { reference: None }
    }

    fn fee() -> CreditReason {
        CreditReason::OrderFee {
            order_id: AggregateId::new(),
            role: PartyRole::Buyer,
        }
    }

    #[test]
    fn debit_records_signed_delta_and_resulting_balance() {
        let mut account = CreditAccount::open(TenantId::new(), Utc::now());
        account.credit(Decimal::new(2, 0), top_up(), Utc::now()).unwrap();

        let entry = account.debit(Decimal::new(5, 1), fee(), Utc::now()).unwrap();

        assert_eq!(entry.delta, Decimal::new(-5, 1));
        assert_eq!(entry.balance_after, Decimal::new(15, 1));
        assert_eq!(account.balance(), Decimal::new(15, 1));
    }

    #[test]
    fn overdraft_leaves_balance_untouched() {
        let mut account = CreditAccount::open(TenantId::new(), Utc::now());
        account.credit(Decimal::new(3, 1), top_up(), Utc::now()).unwrap();

        let err = account.debit(Decimal::new(5, 1), fee(), Utc::now()).unwrap_err();

        assert!(matches!(err, CreditError::InsufficientFunds { .. }));
        assert_eq!(account.balance(), Decimal::new(3, 1));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut account = CreditAccount::open(TenantId::new(), Utc::now());
        assert_eq!(
            account.credit(Decimal::ZERO, top_up(), Utc::now()),
            Err(CreditError::InvalidAmount(Decimal::ZERO))
        );
        assert!(account.debit(Decimal::new(-1, 0), fee(), Utc::now()).is_err());
    }

    #[test]
    fn gate_compares_against_minimum() {
        let tenant = TenantId::new();
        let mut account = CreditAccount::open(tenant, Utc::now());
        let gate = BalanceGate::new(tenant, Decimal::ONE);

        assert!(matches!(gate.check(&account), Err(CreditError::BelowMinimum { .. })));
        account.credit(Decimal::ONE, top_up(), Utc::now()).unwrap();
        assert!(gate.check(&account).is_ok());
    }

    proptest! {
        /// Arbitrary debit/credit sequences never drive the balance negative,
        /// and the balance always equals the sum of committed deltas.
        #[test]
        fn balance_is_sum_of_deltas_and_never_negative(
            ops in prop::collection::vec((any::<bool>(), 1i64..10_000i64), 1..60)
        ) {
            let mut account = CreditAccount::open(TenantId::new(), Utc::now());
            let mut entries = Vec::new();

            for (is_debit, cents) in ops {
                let amount = Decimal::new(cents, 2);
                let before = account.balance();
                let result = if is_debit {
                    account.debit(amount, fee(), Utc::now())
                } else {
                    account.credit(amount, top_up(), Utc::now())
                };
                match result {
                    Ok(entry) => {
                        prop_assert_eq!(entry.balance_after, account.balance());
                        entries.push(entry);
                    }
                    Err(_) => prop_assert_eq!(account.balance(), before),
                }
                prop_assert!(account.balance() >= Decimal::ZERO);
            }

            let sum: Decimal = entries.iter().map(|e| e.delta).sum();
            prop_assert_eq!(sum, account.balance());
        }
    }
}
