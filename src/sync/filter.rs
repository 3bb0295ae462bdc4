// ABOUTME: Table include/exclude filtering for selective sync
// ABOUTME: Applied to the source table listing before provisioning

use anyhow::{bail, Result};

use crate::utils::validate_mysql_identifier;

/// Which source tables take part in a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    include_tables: Option<Vec<String>>,
    exclude_tables: Option<Vec<String>>,
}

impl TableFilter {
    pub fn new(
        include_tables: Option<Vec<String>>,
        exclude_tables: Option<Vec<String>>,
    ) -> Result<Self> {
        if include_tables.is_some() && exclude_tables.is_some() {
            bail!("Cannot use both --include-tables and --exclude-tables");
        }

        for table in include_tables
            .iter()
            .chain(exclude_tables.iter())
            .flatten()
        {
            validate_mysql_identifier(table)?;
        }

        Ok(Self {
            include_tables,
            exclude_tables,
        })
    }

    /// Creates an empty filter (sync everything)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.include_tables.is_none() && self.exclude_tables.is_none()
    }

    pub fn should_sync_table(&self, table: &str) -> bool {
        if let Some(ref include) = self.include_tables {
            if !include.iter().any(|t| t == table) {
                return false;
            }
        }

        if let Some(ref exclude) = self.exclude_tables {
            if exclude.iter().any(|t| t == table) {
                return false;
            }
        }

        true
    }

    /// Keep the tables this filter selects, preserving order.
    pub fn apply(&self, tables: Vec<String>) -> Vec<String> {
        tables
            .into_iter()
            .filter(|t| self.should_sync_table(t))
            .collect()
    }
}
