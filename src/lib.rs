// ABOUTME: Library root for mysql-table-replicator
// ABOUTME: Exposes the sync core, the MySQL backend, configuration and utilities

pub mod config;
pub mod mysql;
pub mod sync;
pub mod utils;
