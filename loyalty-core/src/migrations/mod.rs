//! Ledger schema, shipped inside the binary.
//!
//! `MigrationService` applies these in order and records each name in
//! `sys_migrations`. New files get the next free number and are appended.

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
    ("002_order_status_index.sql", include_str!("002_order_status_index.sql")),
    ("003_ledger_checks.sql", include_str!("003_ledger_checks.sql")),
];
