//! Execution engine: loading table records and materializing compacted output
//!
//! The compactor drives the engine through a narrow contract
//! ([`ExecutionEngine`]): load the (optionally filtered) records of a table and
//! write a partition-grouped record set back to storage in overwrite mode.

mod parquet_table;
mod parquet_writer;

pub use parquet_table::HiveParquetEngine;
pub use parquet_writer::ParquetWriter;

use crate::catalog::{TableMetadata, TableReference};
use crate::compactor::{CompactionPlan, PartitionedRecordSet, PushDownPredicate};
use crate::storage::StorageLocation;
use crate::Result;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;

/// Records of one table loaded for a single compaction run
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    batches: Vec<RecordBatch>,
    source_files: usize,
}

impl RecordSet {
    pub fn new(batches: Vec<RecordBatch>, source_files: usize) -> Self {
        Self {
            batches,
            source_files,
        }
    }

    /// True when no rows were loaded, whatever the number of files
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Number of data files the records were read from
    pub fn source_files(&self) -> usize {
        self.source_files
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Schemas of the loaded batches; may differ between files
    pub fn schemas(&self) -> Vec<SchemaRef> {
        self.batches.iter().map(|b| b.schema()).collect()
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }
}

/// Outcome of a write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub partitions_written: usize,
    pub files_written: usize,
    pub records_written: usize,
    pub stale_files_removed: usize,
}

/// Engine contract used by the compactor
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Load the records of a table, restricted to the partitions matching
    /// `predicate` when one is given. Failures are `Error::Load`.
    async fn load(
        &self,
        table: &TableReference,
        metadata: &TableMetadata,
        predicate: Option<&PushDownPredicate>,
    ) -> Result<RecordSet>;

    /// Write grouped records under `destination`, one directory level per
    /// partition key, replacing whatever the touched partitions held before.
    /// Failures are `Error::Write`.
    async fn write(
        &self,
        records: PartitionedRecordSet,
        plan: &CompactionPlan,
        destination: &StorageLocation,
    ) -> Result<WriteSummary>;
}
