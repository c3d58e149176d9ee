//! Postgres-backed ledger store.
//!
//! ## Atomic scope
//!
//! Every scope is one database transaction. It starts by taking a
//! transaction-level advisory lock keyed on the owner, then locks the owner's
//! account rows with `SELECT ... FOR UPDATE` (ordered by id). Two scopes of the
//! same owner therefore serialize; scopes of different owners never touch the
//! same lock.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateAccount` / `Database` |
//! | Database (foreign key violation) | `23503` | `InvalidAccount` |
//! | Database (check constraint violation) | `23514` | `InvalidAccount` |
//! | Database (other) | Any other | `Database` |
//! | PoolClosed / RowNotFound / other | N/A | `Database` |
//!
//! ## Sync access
//!
//! `LedgerStore` is synchronous. The impl below drives the async methods with
//! `tokio::runtime::Handle::block_on`, so it must be called from a blocking
//! context inside a tokio runtime (e.g. `spawn_blocking`).

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{instrument, warn, Span};
use uuid::Uuid;

use fintrack_accounts::{Account, AccountKind, AccountSet, AccountStatus};
use fintrack_core::{AccountId, EntryId, Money, OwnerId};
use fintrack_ledger::{EntryFilter, EntryKind, EntryStatus, LedgerEntry, Page};

use super::r#trait::{LedgerStore, LedgerTx, StoreError, ensure_owned};

/// DDL applied by [`PostgresLedgerStore::migrate`], one statement per item.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ledger_accounts (
        id           UUID PRIMARY KEY,
        owner_id     UUID NOT NULL,
        name         TEXT NOT NULL,
        status       TEXT NOT NULL,
        kind         TEXT NOT NULL CHECK (kind IN ('debit', 'credit')),
        balance      NUMERIC(15, 2) NOT NULL DEFAULT 0 CHECK (balance >= 0),
        credit_limit NUMERIC(15, 2) NOT NULL DEFAULT 0 CHECK (credit_limit >= 0),
        debt         NUMERIC(15, 2) NOT NULL DEFAULT 0 CHECK (debt >= 0),
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_accounts_owner_idx ON ledger_accounts (owner_id)",
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id                     UUID PRIMARY KEY,
        owner_id               UUID NOT NULL,
        kind                   TEXT NOT NULL CHECK (kind IN ('income', 'expense', 'transfer')),
        amount                 NUMERIC(15, 2) NOT NULL CHECK (amount > 0),
        source_account_id      UUID NULL REFERENCES ledger_accounts (id),
        destination_account_id UUID NULL REFERENCES ledger_accounts (id),
        status                 TEXT NOT NULL,
        occurred_at            TIMESTAMPTZ NOT NULL,
        category               TEXT NOT NULL,
        description            TEXT NOT NULL,
        created_at             TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_entries_owner_date_idx ON ledger_entries (owner_id, occurred_at DESC)",
    "CREATE INDEX IF NOT EXISTS ledger_entries_source_idx ON ledger_entries (source_account_id)",
    "CREATE INDEX IF NOT EXISTS ledger_entries_destination_idx ON ledger_entries (destination_account_id)",
];

const ACCOUNT_COLUMNS: &str = "id, owner_id, name, status, kind, balance, credit_limit, debt";
const ENTRY_COLUMNS: &str =
    "id, owner_id, kind, amount, source_account_id, destination_account_id, status, occurred_at, category, description";

/// Postgres-backed ledger store.
///
/// Every query is scoped by `owner_id`; rows of another owner are only ever
/// observed as "exists, not yours" during cross-owner detection.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    /// Open an owner scope: begin a transaction and take the owner's lock.
    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    pub async fn begin(&self, owner_id: OwnerId) -> Result<PgLedgerTx, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(owner_id.as_uuid().to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("owner_lock", e))?;

        Ok(PgLedgerTx { owner_id, tx })
    }

    #[instrument(skip(self, account), fields(account_id = %account.id, owner_id = %account.owner_id), err)]
    pub async fn open_account(&self, account: Account) -> Result<(), StoreError> {
        account
            .validate()
            .map_err(|e| StoreError::InvalidAccount(e.to_string()))?;

        let (balance, credit_limit, debt) = account_columns(&account);
        let query = format!("INSERT INTO ledger_accounts ({ACCOUNT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)");
        sqlx::query(&query)
            .bind(account.id.as_uuid())
            .bind(account.owner_id.as_uuid())
            .bind(&account.name)
            .bind(account.status.as_str())
            .bind(kind_str(&account.kind))
            .bind(balance)
            .bind(credit_limit)
            .bind(debt)
            .execute(&*self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateAccount(account.id)
                } else {
                    map_sqlx_error("open_account", e)
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, account_count = tracing::field::Empty), err)]
    pub async fn accounts(&self, owner_id: OwnerId) -> Result<AccountSet, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE owner_id = $1 ORDER BY id");
        let rows = sqlx::query(&query)
            .bind(owner_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("accounts", e))?;

        Span::current().record("account_count", rows.len());
        account_set(owner_id, &rows)
    }

    #[instrument(skip(self, filter), fields(owner_id = %owner_id, page = filter.page), err)]
    pub async fn list_entries(&self, owner_id: OwnerId, filter: &EntryFilter) -> Result<Page<LedgerEntry>, StoreError> {
        let kind = filter.kind.map(|k| k.as_str());
        let category = filter.category.as_deref();

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM ledger_entries
             WHERE owner_id = $1 AND ($2::text IS NULL OR kind = $2) AND ($3::text IS NULL OR category = $3)",
        )
        .bind(owner_id.as_uuid())
        .bind(kind)
        .bind(category)
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("total"))
        .map_err(|e| map_sqlx_error("count_entries", e))?;

        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE owner_id = $1 AND ($2::text IS NULL OR kind = $2) AND ($3::text IS NULL OR category = $3)
             ORDER BY occurred_at DESC, id DESC
             LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query(&query)
            .bind(owner_id.as_uuid())
            .bind(kind)
            .bind(category)
            .bind(i64::from(filter.limit()))
            .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_entries", e))?;

        Ok(Page {
            items: rows.iter().map(entry_from_row).collect::<Result<_, _>>()?,
            total: u64::try_from(total).unwrap_or(0),
            page: filter.page.max(1),
            limit: filter.limit(),
        })
    }
}

/// An open owner scope (one Postgres transaction).
pub struct PgLedgerTx {
    owner_id: OwnerId,
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    #[instrument(skip(self, referenced), fields(owner_id = %self.owner_id), err)]
    pub async fn lock_accounts(&mut self, referenced: &[AccountId]) -> Result<AccountSet, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE owner_id = $1 ORDER BY id FOR UPDATE");
        let rows = sqlx::query(&query)
            .bind(self.owner_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_accounts", e))?;

        let ids: Vec<Uuid> = referenced.iter().map(|id| *id.as_uuid()).collect();
        let foreign: Vec<AccountId> = if ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query("SELECT id FROM ledger_accounts WHERE id = ANY($1) AND owner_id <> $2")
                .bind(&ids)
                .bind(self.owner_id.as_uuid())
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("foreign_accounts", e))?
                .iter()
                .map(|row| row.try_get::<Uuid, _>("id").map(AccountId::from_uuid))
                .collect::<Result<_, _>>()
                .map_err(|e| map_sqlx_error("foreign_accounts", e))?
        };

        Ok(account_set(self.owner_id, &rows)?.with_foreign(foreign))
    }

    #[instrument(skip(self, accounts), fields(owner_id = %self.owner_id, count = accounts.len()), err)]
    pub async fn save_accounts(&mut self, accounts: &[Account]) -> Result<(), StoreError> {
        for account in accounts {
            ensure_owned(self.owner_id, account)?;
            let (balance, _, debt) = account_columns(account);
            let result = sqlx::query(
                "UPDATE ledger_accounts SET balance = $3, debt = $4, status = $5 WHERE id = $1 AND owner_id = $2",
            )
            .bind(account.id.as_uuid())
            .bind(self.owner_id.as_uuid())
            .bind(balance)
            .bind(debt)
            .bind(account.status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("save_accounts", e))?;

            if result.rows_affected() != 1 {
                return Err(StoreError::OwnerIsolation(format!(
                    "account {} is not an account of owner {}",
                    account.id, self.owner_id
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, entries), fields(owner_id = %self.owner_id, count = entries.len()), err)]
    pub async fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        let query = format!("INSERT INTO ledger_entries ({ENTRY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)");
        for entry in entries {
            ensure_owned(self.owner_id, entry)?;
            sqlx::query(&query)
                .bind(entry.id.as_uuid())
                .bind(entry.owner_id.as_uuid())
                .bind(entry.kind.as_str())
                .bind(entry.amount.amount())
                .bind(entry.source_account_id.map(|id| *id.as_uuid()))
                .bind(entry.destination_account_id.map(|id| *id.as_uuid()))
                .bind(entry.status.as_str())
                .bind(entry.occurred_at)
                .bind(&entry.category)
                .bind(&entry.description)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("insert_entries", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %self.owner_id), err)]
    pub async fn find_entry(&mut self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let query = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1 AND owner_id = $2 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .bind(self.owner_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_entry", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    #[instrument(skip(self), fields(owner_id = %self.owner_id), err)]
    pub async fn remove_entry(&mut self, id: EntryId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM ledger_entries WHERE id = $1 AND owner_id = $2")
            .bind(id.as_uuid())
            .bind(self.owner_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("remove_entry", e))?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(owner_id = %self.owner_id, entry_id = %entry.id), err)]
    pub async fn update_entry_metadata(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE ledger_entries SET description = $3, category = $4, occurred_at = $5 WHERE id = $1 AND owner_id = $2",
        )
        .bind(entry.id.as_uuid())
        .bind(self.owner_id.as_uuid())
        .bind(&entry.description)
        .bind(&entry.category)
        .bind(entry.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_entry_metadata", e))?;
        Ok(())
    }

    #[instrument(skip(self, account_ids), fields(owner_id = %self.owner_id), err)]
    pub async fn entries_referencing(&mut self, account_ids: &[AccountId]) -> Result<Vec<LedgerEntry>, StoreError> {
        let ids: Vec<Uuid> = account_ids.iter().map(|id| *id.as_uuid()).collect();
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE owner_id = $1 AND (source_account_id = ANY($2) OR destination_account_id = ANY($2))
             ORDER BY occurred_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(self.owner_id.as_uuid())
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("entries_referencing", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn kind_str(kind: &AccountKind) -> &'static str {
    match kind {
        AccountKind::Debit { .. } => "debit",
        AccountKind::Credit { .. } => "credit",
    }
}

/// `(balance, credit_limit, debt)` column values.
fn account_columns(account: &Account) -> (Decimal, Decimal, Decimal) {
    match account.kind {
        AccountKind::Debit { balance } => (balance.amount(), Decimal::ZERO, Decimal::ZERO),
        AccountKind::Credit { credit_limit, debt } => (Decimal::ZERO, credit_limit.amount(), debt.amount()),
    }
}

fn money(value: Decimal, column: &str) -> Result<Money, StoreError> {
    Money::new(value).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<Account, StoreError> {
    let get_err = |e| map_sqlx_error("decode_account", e);
    let kind: String = row.try_get("kind").map_err(get_err)?;
    let kind = match kind.as_str() {
        "debit" => AccountKind::Debit {
            balance: money(row.try_get("balance").map_err(get_err)?, "balance")?,
        },
        "credit" => AccountKind::Credit {
            credit_limit: money(row.try_get("credit_limit").map_err(get_err)?, "credit_limit")?,
            debt: money(row.try_get("debt").map_err(get_err)?, "debt")?,
        },
        other => return Err(StoreError::Corrupt(format!("unknown account kind '{other}'"))),
    };
    let status: String = row.try_get("status").map_err(get_err)?;

    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id").map_err(get_err)?),
        owner_id: OwnerId::from_uuid(row.try_get("owner_id").map_err(get_err)?),
        name: row.try_get("name").map_err(get_err)?,
        status: AccountStatus::from_str(&status).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        kind,
    })
}

fn account_set(owner_id: OwnerId, rows: &[sqlx::postgres::PgRow]) -> Result<AccountSet, StoreError> {
    let accounts = rows.iter().map(account_from_row).collect::<Result<Vec<_>, _>>()?;
    AccountSet::new(owner_id, accounts).map_err(|e| StoreError::OwnerIsolation(e.to_string()))
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, StoreError> {
    let get_err = |e| map_sqlx_error("decode_entry", e);
    let kind: String = row.try_get("kind").map_err(get_err)?;
    let status: String = row.try_get("status").map_err(get_err)?;
    let source: Option<Uuid> = row.try_get("source_account_id").map_err(get_err)?;
    let destination: Option<Uuid> = row.try_get("destination_account_id").map_err(get_err)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(get_err)?;

    Ok(LedgerEntry {
        id: EntryId::from_uuid(row.try_get("id").map_err(get_err)?),
        owner_id: OwnerId::from_uuid(row.try_get("owner_id").map_err(get_err)?),
        kind: EntryKind::from_str(&kind).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        amount: money(row.try_get("amount").map_err(get_err)?, "amount")?,
        source_account_id: source.map(AccountId::from_uuid),
        destination_account_id: destination.map(AccountId::from_uuid),
        status: EntryStatus::from_str(&status).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        occurred_at,
        category: row.try_get("category").map_err(get_err)?,
        description: row.try_get("description").map_err(get_err)?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                // Foreign key / check constraint: the row itself is unacceptable.
                Some("23503") | Some("23514") => {
                    StoreError::InvalidAccount(format!("constraint violated in {operation}: {message}"))
                }
                _ => StoreError::Database {
                    operation: operation.to_string(),
                    message,
                },
            }
        }
        sqlx::Error::PoolClosed => StoreError::Database {
            operation: operation.to_string(),
            message: "connection pool closed".to_string(),
        },
        other => StoreError::Database {
            operation: operation.to_string(),
            message: other.to_string(),
        },
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn runtime_handle() -> Result<Handle, StoreError> {
    Handle::try_current().map_err(|_| {
        StoreError::Runtime(
            "PostgresLedgerStore requires a tokio runtime; call it from a blocking context inside one".to_string(),
        )
    })
}

/// Sync adapter over an open [`PgLedgerTx`].
struct BlockingTx<'h> {
    inner: PgLedgerTx,
    handle: &'h Handle,
}

impl LedgerTx for BlockingTx<'_> {
    fn lock_accounts(&mut self, referenced: &[AccountId]) -> Result<AccountSet, StoreError> {
        self.handle.block_on(self.inner.lock_accounts(referenced))
    }

    fn save_accounts(&mut self, accounts: &[Account]) -> Result<(), StoreError> {
        self.handle.block_on(self.inner.save_accounts(accounts))
    }

    fn insert_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        self.handle.block_on(self.inner.insert_entries(entries))
    }

    fn find_entry(&mut self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        self.handle.block_on(self.inner.find_entry(id))
    }

    fn remove_entry(&mut self, id: EntryId) -> Result<(), StoreError> {
        self.handle.block_on(self.inner.remove_entry(id))
    }

    fn update_entry_metadata(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.handle.block_on(self.inner.update_entry_metadata(entry))
    }

    fn entries_referencing(&mut self, account_ids: &[AccountId]) -> Result<Vec<LedgerEntry>, StoreError> {
        self.handle.block_on(self.inner.entries_referencing(account_ids))
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn transact<T, E, F>(&self, owner_id: OwnerId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let handle = runtime_handle()?;
        let inner = handle.block_on(self.begin(owner_id))?;
        let mut tx = BlockingTx { inner, handle: &handle };

        match work(&mut tx) {
            Ok(out) => {
                handle.block_on(tx.inner.commit())?;
                Ok(out)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.block_on(tx.inner.rollback()) {
                    warn!(owner_id = %owner_id, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn open_account(&self, account: Account) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.open_account(account))
    }

    fn accounts(&self, owner_id: OwnerId) -> Result<AccountSet, StoreError> {
        runtime_handle()?.block_on(self.accounts(owner_id))
    }

    fn list_entries(&self, owner_id: OwnerId, filter: &EntryFilter) -> Result<Page<LedgerEntry>, StoreError> {
        runtime_handle()?.block_on(self.list_entries(owner_id, filter))
    }
}
