// ABOUTME: SQL text for the MySQL backend - introspection, control table, fetch and upsert
// ABOUTME: Identifiers come from validated descriptors and are always backtick-quoted

use crate::sync::schema::TableDescriptor;
use crate::sync::state::CONTROL_TABLE;
use crate::sync::writer::UpsertPlan;
use crate::utils::quote_mysql_ident;

/// MySQL allows at most 65,535 placeholders in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Run on every new connection. Both sides use UTC so a `TIMESTAMP` watermark
/// read on the source means the same instant when stored on the destination.
pub const SESSION_SETUP: &[&str] = &["SET NAMES utf8mb4", "SET time_zone = '+00:00'"];

/// Base tables only; views cannot be recreated from `SHOW CREATE TABLE`.
pub const LIST_TABLES: &str = "SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'";

pub const DESCRIBE_COLUMNS: &str = "SELECT COLUMN_NAME FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

pub const TABLE_EXISTS: &str = "SELECT COUNT(*) FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";

pub fn show_create_table(table: &str) -> String {
    format!("SHOW CREATE TABLE {}", quote_mysql_ident(table))
}

/// Microsecond precision so fractional source timestamps are not rounded up
/// past rows that were never transferred.
pub fn create_control_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         table_name VARCHAR(255) PRIMARY KEY, \
         last_sync TIMESTAMP(6) NULL\
         )",
        quote_mysql_ident(CONTROL_TABLE)
    )
}

/// Fractional-second digits of `sync_status.last_sync` (NULL for non-temporal columns).
pub const WATERMARK_PRECISION: &str = "SELECT DATETIME_PRECISION FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = 'last_sync'";

pub fn read_watermark() -> String {
    format!(
        "SELECT last_sync FROM {} WHERE table_name = ?",
        quote_mysql_ident(CONTROL_TABLE)
    )
}

/// Upsert that never moves an existing watermark backwards.
pub fn write_watermark() -> String {
    format!(
        "INSERT INTO {} (table_name, last_sync) VALUES (?, ?) \
         ON DUPLICATE KEY UPDATE last_sync = \
         IF(last_sync IS NULL OR VALUES(last_sync) > last_sync, VALUES(last_sync), last_sync)",
        quote_mysql_ident(CONTROL_TABLE)
    )
}

pub fn list_sync_status() -> String {
    format!(
        "SELECT table_name, CAST(last_sync AS CHAR) FROM {} ORDER BY table_name",
        quote_mysql_ident(CONTROL_TABLE)
    )
}

/// Select every column of the table, optionally filtered on the change-timestamp.
///
/// ```sql
/// SELECT `id`, `total`, `time_stamp` FROM `orders` WHERE `time_stamp` > ?
/// ```
///
/// Returns `None` when `incremental` is requested for a table without a
/// change-timestamp column.
pub fn select_rows(descriptor: &TableDescriptor, incremental: bool) -> Option<String> {
    let columns = quoted_list(&descriptor.columns);
    let mut query = format!(
        "SELECT {} FROM {}",
        columns,
        quote_mysql_ident(&descriptor.name)
    );

    if incremental {
        let change_column = descriptor.change_column.as_deref()?;
        query.push_str(&format!(" WHERE {} > ?", quote_mysql_ident(change_column)));
    }

    Some(query)
}

/// Build a multi-row upsert for `num_rows` rows.
///
/// ```sql
/// INSERT INTO `orders` (`id`, `total`, `time_stamp`)
/// VALUES (?, ?, ?), (?, ?, ?)
/// ON DUPLICATE KEY UPDATE `id` = VALUES(`id`), `total` = VALUES(`total`)
/// ```
///
/// When the plan has no update columns the conflict branch re-assigns the first
/// column to itself, keeping the existing row untouched.
pub fn upsert_rows(plan: &UpsertPlan, num_rows: usize) -> String {
    let row_placeholders = format!("({})", vec!["?"; plan.columns.len()].join(", "));
    let values = vec![row_placeholders.as_str(); num_rows].join(", ");

    let updates = if plan.update_columns.is_empty() {
        let first = plan
            .columns
            .first()
            .map(|c| quote_mysql_ident(c))
            .unwrap_or_default();
        format!("{} = {}", first, first)
    } else {
        plan.update_columns
            .iter()
            .map(|c| {
                let quoted = quote_mysql_ident(c);
                format!("{} = VALUES({})", quoted, quoted)
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
        quote_mysql_ident(&plan.table),
        quoted_list(&plan.columns),
        values,
        updates
    )
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_mysql_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}
