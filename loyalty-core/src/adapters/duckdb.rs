//! DuckDB ledger store implementation

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{Credential, Order, OrderStatus, Withdrawal};
use crate::ports::{InsertOutcome, LedgerStore};
use crate::services::{MigrationResult, MigrationService};

/// Path value that selects an in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const ORDER_COLUMNS: &str =
    "order_id, owner, status, accrual::VARCHAR, created_at::VARCHAR";

const WITHDRAWAL_COLUMNS: &str =
    "owner, order_id, amount::VARCHAR, processed_at::VARCHAR";

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| Error::store("database connection lock poisoned"))
}

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// DuckDB ledger store
///
/// All statements go through one connection behind a mutex, so a read and
/// the write that depends on it can share one critical section. The async
/// `LedgerStore` methods run that section on tokio's blocking pool.
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Open (or create) a database file.
    ///
    /// Retries with exponential backoff while another process holds the file
    /// lock. Blocks the calling thread, so async callers go through
    /// `spawn_blocking`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if db_path.as_os_str() == IN_MEMORY {
            return Self::open_in_memory();
        }

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => return Ok(Self::from_connection(conn)),
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            "Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::store(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off: the schema needs nothing beyond core DuckDB
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    /// Run `f` with the connection locked, on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::store(format!("database task failed: {e}")))?
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        let migration_service = MigrationService::new(&conn);
        migration_service.run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            debug!("Applied migrations: {:?}", result.applied);
        }
        Ok(())
    }

    /// Number of stored orders
    pub fn order_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        Ok(count)
    }

    fn select_order(conn: &Connection, order_id: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_id = ?", ORDER_COLUMNS);
        let mut orders = query_orders(conn, &sql, [order_id])?;
        Ok(orders.pop())
    }

    fn select_withdrawal(
        conn: &Connection,
        owner: &str,
        order_id: &str,
    ) -> Result<Option<Withdrawal>> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE owner = ? AND order_id = ?",
            WITHDRAWAL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([owner, order_id], WithdrawalRow::from_row)?;
        let mut found = None;
        for row in rows {
            found = Some(row?.into_withdrawal()?);
        }
        Ok(found)
    }
}

#[async_trait]
impl LedgerStore for DuckDbStore {
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let order_id = order_id.to_string();
        self.blocking(move |conn| Self::select_order(conn, &order_id)).await
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome<Order>> {
        let order = order.clone();
        self.blocking(move |conn| {
            let rows_changed = conn.execute(
                "INSERT INTO orders (order_id, owner, status, accrual, created_at)
                 VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 2)), CAST(? AS TIMESTAMP))
                 ON CONFLICT (order_id) DO NOTHING",
                params![
                    order.order_id,
                    order.owner,
                    order.status.as_str(),
                    order.accrual.to_string(),
                    format_timestamp(&order.created_at),
                ],
            )?;

            if rows_changed > 0 {
                return Ok(InsertOutcome::Inserted);
            }

            // Same critical section as the insert: the winner cannot change underneath us
            let existing = Self::select_order(conn, &order.order_id)?.ok_or_else(|| {
                Error::store(format!("order {} conflicted but is missing", order.order_id))
            })?;
            Ok(InsertOutcome::Existing(existing))
        })
        .await
    }

    async fn update_order(
        &self,
        order_id: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        let order_id = order_id.to_string();
        self.blocking(move |conn| {
            let rows_changed = conn.execute(
                "UPDATE orders SET status = ?, accrual = CAST(? AS DECIMAL(18, 2)) WHERE order_id = ?",
                params![status.as_str(), accrual.to_string(), order_id],
            )?;
            Ok(rows_changed > 0)
        })
        .await
    }

    async fn list_order_ids(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            query_ids(conn, "SELECT order_id FROM orders ORDER BY created_at, order_id")
        })
        .await
    }

    async fn list_open_order_ids(&self) -> Result<Vec<String>> {
        self.blocking(|conn| {
            query_ids(
                conn,
                "SELECT order_id FROM orders WHERE status IN ('NEW', 'PROCESSING') ORDER BY created_at, order_id",
            )
        })
        .await
    }

    async fn list_orders(&self, owner: &str) -> Result<Vec<Order>> {
        let owner = owner.to_string();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM orders WHERE owner = ? ORDER BY created_at, order_id",
                ORDER_COLUMNS
            );
            query_orders(conn, &sql, [owner])
        })
        .await
    }

    async fn list_withdrawals(&self, owner: &str) -> Result<Vec<Withdrawal>> {
        let owner = owner.to_string();
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM withdrawals WHERE owner = ? ORDER BY processed_at, order_id",
                WITHDRAWAL_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([owner], WithdrawalRow::from_row)?;

            let mut withdrawals = Vec::new();
            for row in rows {
                withdrawals.push(row?.into_withdrawal()?);
            }
            Ok(withdrawals)
        })
        .await
    }

    async fn insert_withdrawal(
        &self,
        withdrawal: &Withdrawal,
    ) -> Result<InsertOutcome<Withdrawal>> {
        let withdrawal = withdrawal.clone();
        self.blocking(move |conn| {
            let rows_changed = conn.execute(
                "INSERT INTO withdrawals (owner, order_id, amount, processed_at)
                 VALUES (?, ?, CAST(? AS DECIMAL(18, 2)), CAST(? AS TIMESTAMP))
                 ON CONFLICT (owner, order_id) DO NOTHING",
                params![
                    withdrawal.owner,
                    withdrawal.order_id,
                    withdrawal.amount.to_string(),
                    format_timestamp(&withdrawal.processed_at),
                ],
            )?;

            if rows_changed > 0 {
                return Ok(InsertOutcome::Inserted);
            }

            let existing =
                Self::select_withdrawal(conn, &withdrawal.owner, &withdrawal.order_id)?
                    .ok_or_else(|| {
                        Error::store(format!(
                            "withdrawal {} conflicted but is missing",
                            withdrawal.order_id
                        ))
                    })?;
            Ok(InsertOutcome::Existing(existing))
        })
        .await
    }

    async fn insert_credential(&self, credential: &Credential) -> Result<bool> {
        let credential = credential.clone();
        self.blocking(move |conn| {
            let rows_changed = conn.execute(
                "INSERT INTO credentials (login, password_hash, created_at)
                 VALUES (?, ?, CAST(? AS TIMESTAMP))
                 ON CONFLICT (login) DO NOTHING",
                params![
                    credential.login,
                    credential.password_hash,
                    format_timestamp(&credential.created_at),
                ],
            )?;
            Ok(rows_changed > 0)
        })
        .await
    }

    async fn get_credential(&self, login: &str) -> Result<Option<Credential>> {
        let login = login.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT login, password_hash, created_at::VARCHAR FROM credentials WHERE login = ?",
            )?;
            let rows = stmt.query_map([login], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut found = None;
            for row in rows {
                let (login, password_hash, created_at) = row?;
                found = Some(Credential {
                    login,
                    password_hash,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(found)
        })
        .await
    }
}

/// Raw order columns, converted outside the row callback so parse
/// failures surface as store errors instead of being swallowed
struct OrderRow {
    order_id: String,
    owner: String,
    status: String,
    accrual: String,
    created_at: String,
}

impl OrderRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            order_id: row.get(0)?,
            owner: row.get(1)?,
            status: row.get(2)?,
            accrual: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_order(self) -> Result<Order> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| Error::store(format!("order {}: {}", self.order_id, e)))?;
        Ok(Order {
            accrual: parse_decimal(&self.accrual)?,
            created_at: parse_timestamp(&self.created_at)?,
            order_id: self.order_id,
            owner: self.owner,
            status,
        })
    }
}

struct WithdrawalRow {
    owner: String,
    order_id: String,
    amount: String,
    processed_at: String,
}

impl WithdrawalRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            owner: row.get(0)?,
            order_id: row.get(1)?,
            amount: row.get(2)?,
            processed_at: row.get(3)?,
        })
    }

    fn into_withdrawal(self) -> Result<Withdrawal> {
        Ok(Withdrawal {
            amount: parse_decimal(&self.amount)?,
            processed_at: parse_timestamp(&self.processed_at)?,
            owner: self.owner,
            order_id: self.order_id,
        })
    }
}

fn query_orders<P: duckdb::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Order>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, OrderRow::from_row)?;

    let mut orders = Vec::new();
    for row in rows {
        orders.push(row?.into_order()?);
    }
    Ok(orders)
}

fn query_ids(conn: &Connection, sql: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut result = Vec::new();
    for id in ids {
        result.push(id?);
    }
    Ok(result)
}

/// TIMESTAMP columns hold naive UTC with microsecond precision
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::store(format!("bad timestamp {:?}: {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .map_err(|e| Error::store(format!("bad decimal {:?}: {}", s, e)))
}
