//! Postgres-backed marketplace store.
//!
//! Aggregates are stored as JSONB `state` next to the columns queries filter
//! on. Every order transition runs in one transaction:
//!
//! 1. `SELECT … FOR UPDATE` on the order row (the per-order exclusive lock)
//! 2. decide against the locked state
//! 3. `SELECT … FOR UPDATE` on each touched balance row, ascending tenant id
//! 4. write balances, ledger entries, order row and order events
//! 5. commit
//!
//! Any early return drops the transaction, which rolls it back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolClosed / Io / Tls / other | N/A | `Unavailable` |
//! | Decode / ColumnNotFound | N/A | `Corrupt` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use partsmarket_core::{AggregateId, AggregateRoot, PartyRole, TenantId, UserId};
use partsmarket_credits::{CreditAccount, CreditMutation, LedgerEntry};
use partsmarket_events::Event;
use partsmarket_listings::{Listing, ListingId};
use partsmarket_orders::{Order, OrderEvent, OrderId, OrderSla};
use partsmarket_reputation::{Rating, RatingId, RatingValue, Reputation};
use partsmarket_suppliers::{FavoriteSupplier, SupplierProfile};

use super::{
    CreditStore, ListingStore, OrderFilter, OrderStore, RatingOutcome, RatingStore, SupplierStore,
    TransitionFn, TransitionOutcome, settle_balances,
};
use crate::error::{CommitError, StoreError, StoreResult};

/// Postgres marketplace store. Cheap to clone (pool handle).
#[derive(Debug, Clone)]
pub struct PostgresMarketplaceStore {
    pool: PgPool,
}

impl PostgresMarketplaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        info!("marketplace schema migrations applied");
        Ok(())
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode_state<T: DeserializeOwned>(row: &PgRow, column: &str) -> StoreResult<T> {
    let Json(value): Json<T> = row
        .try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))?;
    Ok(value)
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("{name}: {e}")))
}

fn counter(row: &PgRow, name: &str) -> StoreResult<u64> {
    let value: i64 = column(row, name)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{name} is negative")))
}

fn account_from_row(tenant_id: TenantId, row: &PgRow) -> StoreResult<CreditAccount> {
    Ok(CreditAccount::restore(
        tenant_id,
        column(row, "balance")?,
        column(row, "updated_at")?,
    ))
}

fn ledger_entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    let tenant_id: Uuid = column(row, "tenant_id")?;
    Ok(LedgerEntry {
        entry_id: column(row, "entry_id")?,
        tenant_id: TenantId::from_uuid(tenant_id),
        delta: column(row, "delta")?,
        reason: decode_state(row, "reason")?,
        balance_after: column(row, "balance_after")?,
        occurred_at: column(row, "occurred_at")?,
    })
}

fn rating_from_row(row: &PgRow) -> StoreResult<Rating> {
    let id: Uuid = column(row, "id")?;
    let order_id: Uuid = column(row, "order_id")?;
    let rater_role: String = column(row, "rater_role")?;
    let rater_tenant: Uuid = column(row, "rater_tenant")?;
    let rater_user: Option<Uuid> = column(row, "rater_user")?;
    let rated_tenant: Uuid = column(row, "rated_tenant")?;
    let value: String = column(row, "value")?;

    Ok(Rating {
        id: RatingId(AggregateId::from_uuid(id)),
        order_id: OrderId::new(AggregateId::from_uuid(order_id)),
        rater_role: rater_role
            .parse::<PartyRole>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        rater_tenant: TenantId::from_uuid(rater_tenant),
        rater_user: rater_user.map(UserId::from_uuid),
        rated_tenant: TenantId::from_uuid(rated_tenant),
        value: value
            .parse::<RatingValue>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        comment: column(row, "comment")?,
        created_at: column(row, "created_at")?,
    })
}

fn reputation_from_row(tenant_id: TenantId, row: &PgRow) -> StoreResult<Reputation> {
    Ok(Reputation {
        tenant_id,
        positive_as_buyer: counter(row, "positive_as_buyer")?,
        negative_as_buyer: counter(row, "negative_as_buyer")?,
        positive_as_supplier: counter(row, "positive_as_supplier")?,
        negative_as_supplier: counter(row, "negative_as_supplier")?,
        score: column(row, "score")?,
        updated_at: column(row, "updated_at")?,
    })
}

/// Upsert a zero row if missing, then lock it.
async fn lock_account(
    tx: &mut Transaction<'static, Postgres>,
    tenant_id: TenantId,
) -> StoreResult<CreditAccount> {
    sqlx::query(
        r#"
        INSERT INTO credit_balances (tenant_id, balance, updated_at)
        VALUES ($1, 0, NOW())
        ON CONFLICT (tenant_id) DO NOTHING
        "#,
    )
    .bind(tenant_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("open_balance", e))?;

    let row = sqlx::query(
        "SELECT balance, updated_at FROM credit_balances WHERE tenant_id = $1 FOR UPDATE",
    )
    .bind(tenant_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_balance", e))?;

    account_from_row(tenant_id, &row)
}

async fn write_account(
    tx: &mut Transaction<'static, Postgres>,
    account: &CreditAccount,
) -> StoreResult<()> {
    sqlx::query("UPDATE credit_balances SET balance = $2, updated_at = $3 WHERE tenant_id = $1")
        .bind(account.tenant_id().as_uuid())
        .bind(account.balance())
        .bind(account.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_balance", e))?;
    Ok(())
}

async fn insert_ledger_entry(
    tx: &mut Transaction<'static, Postgres>,
    entry: &LedgerEntry,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_ledger_entries
            (entry_id, tenant_id, delta, reason, balance_after, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.entry_id)
    .bind(entry.tenant_id.as_uuid())
    .bind(entry.delta)
    .bind(Json(&entry.reason))
    .bind(entry.balance_after)
    .bind(entry.occurred_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_ledger_entry", e))?;
    Ok(())
}

async fn insert_order_event(
    tx: &mut Transaction<'static, Postgres>,
    order_id: OrderId,
    sequence_number: u64,
    event: &OrderEvent,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO marketplace_order_events
            (order_id, sequence_number, event_type, occurred_at, payload)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order_id.0.as_uuid())
    .bind(sequence_number as i64)
    .bind(event.event_type())
    .bind(event.occurred_at())
    .bind(Json(event))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_order_event", e))?;
    Ok(())
}

#[async_trait]
impl SupplierStore for PostgresMarketplaceStore {
    #[instrument(skip(self, profile), fields(tenant_id = %profile.tenant_id()), err)]
    async fn save_supplier(&self, profile: &SupplierProfile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO marketplace_suppliers (tenant_id, display_name, eur_rate, state, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                eur_rate = EXCLUDED.eur_rate,
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.tenant_id().as_uuid())
        .bind(profile.display_name())
        .bind(profile.eur_rate())
        .bind(Json(profile))
        .bind(profile.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_supplier", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn supplier(&self, tenant_id: TenantId) -> StoreResult<Option<SupplierProfile>> {
        let row = sqlx::query("SELECT state FROM marketplace_suppliers WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("supplier", e))?;
        row.map(|r| decode_state(&r, "state")).transpose()
    }

    #[instrument(skip(self, favorite), fields(tenant_id = %favorite.tenant_id, supplier_id = %favorite.supplier_id), err)]
    async fn add_favorite(&self, favorite: &FavoriteSupplier) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO favorite_suppliers (tenant_id, supplier_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, supplier_id) DO NOTHING
            "#,
        )
        .bind(favorite.tenant_id.as_uuid())
        .bind(favorite.supplier_id.as_uuid())
        .bind(favorite.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_favorite", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, supplier_id = %supplier_id), err)]
    async fn remove_favorite(&self, tenant_id: TenantId, supplier_id: TenantId) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM favorite_suppliers WHERE tenant_id = $1 AND supplier_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(supplier_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove_favorite", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn favorites(&self, tenant_id: TenantId) -> StoreResult<Vec<FavoriteSupplier>> {
        let rows = sqlx::query(
            r#"
            SELECT supplier_id, created_at FROM favorite_suppliers
            WHERE tenant_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("favorites", e))?;

        rows.iter()
            .map(|row| {
                let supplier_id: Uuid = column(row, "supplier_id")?;
                Ok(FavoriteSupplier {
                    tenant_id,
                    supplier_id: TenantId::from_uuid(supplier_id),
                    created_at: column(row, "created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ListingStore for PostgresMarketplaceStore {
    #[instrument(skip(self, listing), fields(listing_id = %listing.id()), err)]
    async fn save_listing(&self, listing: &Listing) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO marketplace_listings (id, supplier_id, active, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                active = EXCLUDED.active,
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(listing.id().0.as_uuid())
        .bind(listing.supplier_id().as_uuid())
        .bind(listing.is_active())
        .bind(Json(listing))
        .bind(listing.created_at())
        .bind(listing.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_listing", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(listing_id = %id), err)]
    async fn listing(&self, id: ListingId) -> StoreResult<Option<Listing>> {
        let row = sqlx::query("SELECT state FROM marketplace_listings WHERE id = $1")
            .bind(id.0.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("listing", e))?;
        row.map(|r| decode_state(&r, "state")).transpose()
    }

    #[instrument(skip(self), fields(supplier_id = %supplier_id), err)]
    async fn supplier_listings(&self, supplier_id: TenantId) -> StoreResult<Vec<Listing>> {
        let rows = sqlx::query(
            "SELECT state FROM marketplace_listings WHERE supplier_id = $1 ORDER BY created_at ASC",
        )
        .bind(supplier_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("supplier_listings", e))?;
        rows.iter().map(|r| decode_state(r, "state")).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresMarketplaceStore {
    #[instrument(skip(self, order, placed), fields(order_id = %order.id_typed()), err)]
    async fn insert_order(&self, order: &Order, placed: &OrderEvent) -> StoreResult<()> {
        let mut tx = self.begin("insert_order").await?;

        sqlx::query(
            r#"
            INSERT INTO marketplace_orders
                (id, buyer_id, seller_id, status, created_at, expires_at, version, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id_typed().0.as_uuid())
        .bind(order.buyer_id().as_uuid())
        .bind(order.seller_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.expires_at())
        .bind(order.version() as i64)
        .bind(Json(order))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        insert_order_event(&mut tx, order.id_typed(), order.version(), placed).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_insert_order", e))
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query("SELECT state FROM marketplace_orders WHERE id = $1")
            .bind(id.0.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("order", e))?;
        row.map(|r| decode_state(&r, "state")).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %filter.tenant_id), err)]
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT state FROM marketplace_orders
            WHERE (
                    ($2::text IS NULL AND (buyer_id = $1 OR seller_id = $1))
                 OR ($2 = 'buyer' AND buyer_id = $1)
                 OR ($2 = 'supplier' AND seller_id = $1)
                  )
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.tenant_id.as_uuid())
        .bind(filter.role.map(PartyRole::as_str))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;
        rows.iter().map(|r| decode_state(r, "state")).collect()
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn order_events(&self, id: OrderId) -> StoreResult<Vec<OrderEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM marketplace_order_events
            WHERE order_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(id.0.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_events", e))?;
        rows.iter().map(|r| decode_state(r, "payload")).collect()
    }

    #[instrument(skip(self, decide), fields(order_id = %id), err)]
    async fn transition(&self, id: OrderId, decide: &TransitionFn<'_>) -> Result<TransitionOutcome, CommitError> {
        let mut tx = self.begin("transition").await?;

        let row = sqlx::query("SELECT state FROM marketplace_orders WHERE id = $1 FOR UPDATE")
            .bind(id.0.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?
            .ok_or(CommitError::NotFound("order"))?;
        let current: Order = decode_state(&row, "state")?;

        let plan = decide(&current)?;
        if plan.is_noop() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(TransitionOutcome {
                order: current,
                events: Vec::new(),
                ledger: Vec::new(),
            });
        }

        let mut accounts = Vec::new();
        for tenant_id in plan.locked_tenants() {
            accounts.push(lock_account(&mut tx, tenant_id).await?);
        }

        let ledger = settle_balances(&plan, &mut accounts)?;

        for account in &accounts {
            if ledger.iter().any(|e| e.tenant_id == account.tenant_id()) {
                write_account(&mut tx, account).await?;
            }
        }
        for entry in &ledger {
            insert_ledger_entry(&mut tx, entry).await?;
        }

        sqlx::query(
            r#"
            UPDATE marketplace_orders
            SET status = $2, expires_at = $3, version = $4, state = $5
            WHERE id = $1
            "#,
        )
        .bind(id.0.as_uuid())
        .bind(plan.order.status().as_str())
        .bind(plan.order.expires_at())
        .bind(plan.order.version() as i64)
        .bind(Json(&plan.order))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        for (idx, event) in plan.events.iter().enumerate() {
            insert_order_event(&mut tx, id, current.version() + idx as u64 + 1, event).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transition", e))?;

        Ok(TransitionOutcome {
            order: plan.order,
            events: plan.events,
            ledger,
        })
    }

    #[instrument(skip(self, sla), err)]
    async fn expiry_candidates(&self, now: DateTime<Utc>, sla: &OrderSla) -> StoreResult<Vec<OrderId>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM marketplace_orders
            WHERE (status = 'SENT' AND created_at <= $1)
               OR (status = 'OFFERED' AND expires_at <= $2)
            ORDER BY id ASC
            "#,
        )
        .bind(now - sla.sent_window())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("expiry_candidates", e))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = column(row, "id")?;
                Ok(OrderId::new(AggregateId::from_uuid(id)))
            })
            .collect()
    }
}

#[async_trait]
impl CreditStore for PostgresMarketplaceStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn account(&self, tenant_id: TenantId) -> StoreResult<CreditAccount> {
        let row = sqlx::query("SELECT balance, updated_at FROM credit_balances WHERE tenant_id = $1")
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("account", e))?;
        match row {
            Some(row) => account_from_row(tenant_id, &row),
            None => Ok(CreditAccount::open(tenant_id, DateTime::<Utc>::UNIX_EPOCH)),
        }
    }

    #[instrument(skip(self, mutation), fields(tenant_id = %mutation.tenant_id, kind = ?mutation.kind), err)]
    async fn apply_credit(&self, mutation: &CreditMutation, at: DateTime<Utc>) -> Result<LedgerEntry, CommitError> {
        let mut tx = self.begin("apply_credit").await?;

        let mut account = lock_account(&mut tx, mutation.tenant_id).await?;
        let entry = account.apply(mutation, at)?;
        write_account(&mut tx, &account).await?;
        insert_ledger_entry(&mut tx, &entry).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_apply_credit", e))?;
        Ok(entry)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn ledger(&self, tenant_id: TenantId, limit: usize) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, tenant_id, delta, reason, balance_after, occurred_at
            FROM credit_ledger_entries
            WHERE tenant_id = $1
            ORDER BY occurred_at DESC, entry_id DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger", e))?;
        rows.iter().map(ledger_entry_from_row).collect()
    }
}

#[async_trait]
impl RatingStore for PostgresMarketplaceStore {
    #[instrument(
        skip(self, rating),
        fields(order_id = %rating.order_id, rater_role = %rating.rater_role),
        err
    )]
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<RatingOutcome> {
        let mut tx = self.begin("insert_rating").await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO marketplace_ratings
                (id, order_id, rater_role, rater_tenant, rater_user, rated_tenant, value, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (order_id, rater_role) DO NOTHING
            "#,
        )
        .bind(rating.id.0.as_uuid())
        .bind(rating.order_id.0.as_uuid())
        .bind(rating.rater_role.as_str())
        .bind(rating.rater_tenant.as_uuid())
        .bind(rating.rater_user.map(Uuid::from))
        .bind(rating.rated_tenant.as_uuid())
        .bind(rating.value.as_str())
        .bind(rating.comment.as_deref())
        .bind(rating.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_rating", e))?
        .rows_affected()
            == 1;

        if !inserted {
            let row = sqlx::query(
                r#"
                SELECT id, order_id, rater_role, rater_tenant, rater_user, rated_tenant, value, comment, created_at
                FROM marketplace_ratings
                WHERE order_id = $1 AND rater_role = $2
                "#,
            )
            .bind(rating.order_id.0.as_uuid())
            .bind(rating.rater_role.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("existing_rating", e))?;
            let existing = rating_from_row(&row)?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;

            let reputation = self.reputation(existing.rated_tenant).await?;
            return Ok(RatingOutcome {
                rating: existing,
                created: false,
                reputation,
            });
        }

        sqlx::query(
            "INSERT INTO tenant_reputation (tenant_id) VALUES ($1) ON CONFLICT (tenant_id) DO NOTHING",
        )
        .bind(rating.rated_tenant.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("open_reputation", e))?;

        let row = sqlx::query(
            r#"
            SELECT positive_as_buyer, negative_as_buyer, positive_as_supplier,
                   negative_as_supplier, score, updated_at
            FROM tenant_reputation
            WHERE tenant_id = $1
            FOR UPDATE
            "#,
        )
        .bind(rating.rated_tenant.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_reputation", e))?;

        let mut reputation = reputation_from_row(rating.rated_tenant, &row)?;
        reputation.record(rating);

        sqlx::query(
            r#"
            UPDATE tenant_reputation SET
                positive_as_buyer = $2,
                negative_as_buyer = $3,
                positive_as_supplier = $4,
                negative_as_supplier = $5,
                score = $6,
                updated_at = $7
            WHERE tenant_id = $1
            "#,
        )
        .bind(rating.rated_tenant.as_uuid())
        .bind(reputation.positive_as_buyer as i64)
        .bind(reputation.negative_as_buyer as i64)
        .bind(reputation.positive_as_supplier as i64)
        .bind(reputation.negative_as_supplier as i64)
        .bind(reputation.score)
        .bind(reputation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_reputation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_insert_rating", e))?;

        Ok(RatingOutcome {
            rating: rating.clone(),
            created: true,
            reputation,
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn order_ratings(&self, order_id: OrderId) -> StoreResult<Vec<Rating>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, rater_role, rater_tenant, rater_user, rated_tenant, value, comment, created_at
            FROM marketplace_ratings
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.0.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_ratings", e))?;
        rows.iter().map(rating_from_row).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn reputation(&self, tenant_id: TenantId) -> StoreResult<Reputation> {
        let row = sqlx::query(
            r#"
            SELECT positive_as_buyer, negative_as_buyer, positive_as_supplier,
                   negative_as_supplier, score, updated_at
            FROM tenant_reputation
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reputation", e))?;
        match row {
            Some(row) => reputation_from_row(tenant_id, &row),
            None => Ok(Reputation::empty(tenant_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_decode_failures_are_corrupt_records() {
        let err = map_sqlx_error("order", sqlx::Error::ColumnNotFound("state".into()));
        assert!(matches!(err, StoreError::Corrupt(_)));

        let err = map_sqlx_error("order", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Unavailable(msg) if msg.contains("pool closed")));
    }
}
