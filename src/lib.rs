//! # Partcompact
//!
//! Partition-aware small-file compaction for Hive-style partitioned Parquet
//! tables on object storage.
//!
//! A compaction run replaces the many small files of each partition with as
//! few files as the per-file record bound allows, keeping the partition
//! layout and merging schemas that drifted over time.
//!
//! ## Architecture
//!
//! - **Catalog**: resolves a table's storage location and partition keys
//! - **Compactor**: validates preconditions, decides on a push-down
//!   predicate, groups records by partition
//! - **Engine**: loads Parquet files from object storage and writes the
//!   compacted partitions back in overwrite mode
//!
//! ```text
//! resolve -> validate -> predicate decision -> load -> group -> write
//! ```

pub mod catalog;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod storage;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Common imports for driving a compaction
pub mod prelude {
    pub use crate::catalog::{
        CatalogClient, CatalogTable, LocalCatalogClient, MetadataResolver, TableMetadata,
        TableReference,
    };
    pub use crate::compactor::{CompactionRequest, CompactionSummary, Compactor};
    pub use crate::engine::{ExecutionEngine, HiveParquetEngine};
    pub use crate::storage::{StorageLocation, StoreRegistry};
    pub use crate::{Error, Result};
}
