//! Migration service - manages the ledger schema
//!
//! Migrations are SQL files embedded at compile time. Applied migrations are
//! recorded in `sys_migrations`, so running them again is a no-op.

use std::collections::HashSet;

use duckdb::Connection;
use tracing::info;

use crate::domain::result::Result;
use crate::migrations::MIGRATIONS;

/// The bookkeeping migration that creates `sys_migrations` itself
const BOOTSTRAP: &str = "000_migrations.sql";

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Applies embedded migrations to one connection
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply every migration not yet recorded, in name order.
    ///
    /// Each migration and its bookkeeping row commit together.
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let bootstrapped = self.bootstrap()?;
        let applied: HashSet<String> = self.get_applied()?.into_iter().collect();

        let mut newly_applied = Vec::new();
        if bootstrapped {
            newly_applied.push(BOOTSTRAP.to_string());
        }
        let already_applied = applied.len() - newly_applied.len();

        for (name, sql) in MIGRATIONS.iter().filter(|(n, _)| *n != BOOTSTRAP) {
            if applied.contains(*name) {
                continue;
            }
            self.apply(name, sql)?;
            info!("Applied migration {}", name);
            newly_applied.push(name.to_string());
        }

        Ok(MigrationResult {
            applied: newly_applied,
            already_applied,
        })
    }

    /// Names of migrations still waiting to run
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied: HashSet<String> = if self.migrations_table_exists()? {
            self.get_applied()?.into_iter().collect()
        } else {
            HashSet::new()
        };
        Ok(MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.contains(*name))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    /// Names of applied migrations, sorted
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    /// Create the bookkeeping table if needed. Returns true if it was created.
    fn bootstrap(&self) -> Result<bool> {
        if self.migrations_table_exists()? {
            return Ok(false);
        }
        let sql = MIGRATIONS
            .iter()
            .find(|(name, _)| *name == BOOTSTRAP)
            .map(|(_, sql)| *sql)
            .unwrap_or_default();
        self.apply(BOOTSTRAP, sql)?;
        Ok(true)
    }

    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let outcome = self.conn.execute_batch(sql).and_then(|_| {
            self.conn
                .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])
        });
        match outcome {
            Ok(_) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e.into())
            }
        }
    }

    fn migrations_table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);

        let first = service.run_pending().unwrap();
        assert_eq!(first.applied.len(), MIGRATIONS.len());
        assert_eq!(first.already_applied, 0);

        let second = service.run_pending().unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.already_applied, MIGRATIONS.len());
        assert!(service.get_pending().unwrap().is_empty());
    }

    #[test]
    fn test_everything_pending_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);
        assert_eq!(service.get_pending().unwrap().len(), MIGRATIONS.len());
    }

    #[test]
    fn test_schema_tables_exist_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationService::new(&conn).run_pending().unwrap();

        for table in ["orders", "withdrawals", "credentials"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_check_migration_keeps_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        for (name, sql) in MIGRATIONS.iter().take(3) {
            conn.execute_batch(sql).unwrap();
            conn.execute(
                "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                [*name],
            )
            .unwrap();
        }
        conn.execute_batch(
            "INSERT INTO orders VALUES ('18', 'alice', 'PROCESSED', 500, '2024-03-01 12:00:00');
             INSERT INTO withdrawals VALUES ('alice', '26', 20, '2024-03-02 12:00:00');",
        )
        .unwrap();

        let result = MigrationService::new(&conn).run_pending().unwrap();
        assert_eq!(result.applied, vec!["003_ledger_checks.sql"]);

        let accrual: String = conn
            .query_row(
                "SELECT accrual::VARCHAR FROM orders WHERE order_id = '18'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(accrual, "500.00");
        let withdrawals: i64 = conn
            .query_row("SELECT COUNT(*) FROM withdrawals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(withdrawals, 1);

        assert!(conn
            .execute("UPDATE orders SET accrual = -1 WHERE order_id = '18'", [])
            .is_err());
        assert!(conn
            .execute(
                "INSERT INTO withdrawals VALUES ('alice', '34', 0, '2024-03-03 12:00:00')",
                [],
            )
            .is_err());
    }
}
