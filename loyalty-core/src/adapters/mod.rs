//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB and process memory for the LedgerStore port
//! - reqwest HTTP client for the AccrualAuthority port
//! - A scriptable mock HTTP server standing in for the accrual authority

pub mod accrual_http;
pub mod accrual_mock;
pub mod duckdb;
pub mod memory;
