//! Preconditions a table must meet before it can be compacted

use crate::catalog::{TableMetadata, TableReference};
use crate::{Error, Result};

/// Check that a table has partition keys and a storage location.
///
/// Partitions are checked first, so a table lacking both reports
/// `NoPartitions`.
pub fn validate(table: &TableReference, metadata: &TableMetadata) -> Result<()> {
    if metadata.partition_keys.is_empty() {
        return Err(Error::NoPartitions {
            database: table.database().to_string(),
            table: table.table().to_string(),
        });
    }

    if metadata.location.is_none() {
        return Err(Error::MissingLocation {
            database: table.database().to_string(),
            table: table.table().to_string(),
        });
    }

    Ok(())
}
