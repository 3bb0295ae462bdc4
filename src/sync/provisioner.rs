// ABOUTME: Destination provisioning - creates mirrored tables from captured source DDL
// ABOUTME: Idempotent: tables that already exist on the destination are left alone

use super::connection::DestinationConnection;
use super::error::SyncError;
use super::schema::TableDefinition;

/// What provisioning did for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyExists,
    Created,
}

/// Ensure `definition`'s table exists on the destination, executing its DDL if absent.
pub async fn provision_table<D>(
    destination: &mut D,
    definition: &TableDefinition,
) -> Result<ProvisionOutcome, SyncError>
where
    D: DestinationConnection + ?Sized,
{
    let table = &definition.descriptor.name;
    let provision_error = |err: anyhow::Error| SyncError::Provision {
        table: table.clone(),
        source: err,
    };

    if destination
        .table_exists(table)
        .await
        .map_err(provision_error)?
    {
        tracing::debug!("Table {} already exists on destination", table);
        return Ok(ProvisionOutcome::AlreadyExists);
    }

    tracing::info!("Table {} does not exist on destination. Creating table.", table);
    destination
        .execute_ddl(&definition.ddl)
        .await
        .map_err(provision_error)?;

    Ok(ProvisionOutcome::Created)
}
