//! Compaction orchestration
//!
//! A run resolves table metadata, checks preconditions, decides whether to
//! push a predicate down, loads the records, regroups them by partition and
//! hands the result to the engine for an overwrite write:
//!
//! ```text
//! resolve -> validate -> predicate decision -> load -> group -> write
//! ```
//!
//! Every stage fails fast. Nothing is retried in-process; a failed run is
//! re-run from scratch.

mod partition;
mod plan;
mod predicate;
mod schema;
mod validate;

pub use partition::{PartitionGroup, PartitionValues, PartitionedRecordSet};
pub use plan::CompactionPlan;
pub use predicate::{should_filter, PushDownPredicate};
pub use schema::{align_batch, merge_schemas};
pub use validate::validate;

use crate::catalog::{MetadataResolver, TableReference};
use crate::engine::ExecutionEngine;
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use metrics::counter;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Caller input for one compaction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionRequest {
    job_name: String,
    table: TableReference,
    predicate: Option<String>,
    max_records_per_file: NonZeroUsize,
}

impl CompactionRequest {
    pub fn new(
        job_name: impl Into<String>,
        table: TableReference,
        max_records_per_file: NonZeroUsize,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            table,
            predicate: None,
            max_records_per_file,
        }
    }

    /// Raw push-down predicate; blank input is kept and treated as absent
    pub fn with_predicate(mut self, predicate: Option<String>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn table(&self) -> &TableReference {
        &self.table
    }

    pub fn predicate(&self) -> Option<&str> {
        self.predicate.as_deref()
    }

    pub fn max_records_per_file(&self) -> NonZeroUsize {
        self.max_records_per_file
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct CompactionSummary {
    pub job_name: String,
    pub table: TableReference,
    pub partitions_written: usize,
    pub files_written: usize,
    pub records_written: usize,
    pub stale_files_removed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives a single table through a compaction run
pub struct Compactor {
    resolver: MetadataResolver,
    engine: Arc<dyn ExecutionEngine>,
}

impl Compactor {
    pub fn new(resolver: MetadataResolver, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { resolver, engine }
    }

    /// Run one compaction.
    ///
    /// All logging of the run happens inside a span carrying the job and
    /// table, so every stage's events are attributable to it.
    pub async fn run(&self, request: &CompactionRequest) -> Result<CompactionSummary> {
        let span = info_span!(
            "compaction",
            job = %request.job_name(),
            database = %request.table().database(),
            table = %request.table().table(),
            run_id = %Uuid::new_v4(),
        );

        async {
            info!(
                max_records_per_file = request.max_records_per_file().get(),
                "Starting compaction"
            );

            let result = self.run_stages(request).await;
            match &result {
                Ok(summary) => {
                    counter!("partcompact_runs_total", "result" => "success").increment(1);
                    info!(
                        partitions = summary.partitions_written,
                        files = summary.files_written,
                        records = summary.records_written,
                        stale_files_removed = summary.stale_files_removed,
                        elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
                        "Compaction completed successfully"
                    );
                }
                Err(e) => {
                    counter!("partcompact_runs_total", "result" => "failure").increment(1);
                    error!(error = %e, exit_code = e.exit_code(), "Compaction failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, request: &CompactionRequest) -> Result<CompactionSummary> {
        let started_at = Utc::now();
        let table = request.table();

        let metadata = self.resolver.resolve(table).await?;
        validate(table, &metadata)?;
        let Some(location) = metadata.location.clone() else {
            return Err(Error::MissingLocation {
                database: table.database().to_string(),
                table: table.table().to_string(),
            });
        };
        info!(
            location = %location,
            partition_keys = ?metadata.partition_keys,
            "Table metadata resolved"
        );

        let predicate = PushDownPredicate::parse(request.predicate());
        match &predicate {
            Some(predicate) => info!(predicate = %predicate, "Applying push-down predicate"),
            None => info!("No push-down predicate, loading full table"),
        }

        let records = self
            .engine
            .load(table, &metadata, predicate.as_ref())
            .await?;
        if records.is_empty() {
            return Err(Error::EmptyDataset {
                database: table.database().to_string(),
                table: table.table().to_string(),
            });
        }
        info!(
            records = records.num_rows(),
            source_files = records.source_files(),
            "Records loaded"
        );

        let plan = CompactionPlan::new(
            metadata.partition_keys.clone(),
            request.max_records_per_file(),
        );
        let grouped = PartitionedRecordSet::from_records(records, plan.partition_keys())?;
        info!(
            partitions = grouped.num_partitions(),
            planned_files = grouped
                .groups()
                .map(|g| plan.files_for(g.num_rows()))
                .sum::<usize>(),
            "Records grouped by partition"
        );

        let written = self.engine.write(grouped, &plan, &location).await?;

        Ok(CompactionSummary {
            job_name: request.job_name().to_string(),
            table: table.clone(),
            partitions_written: written.partitions_written,
            files_written: written.files_written,
            records_written: written.records_written,
            stale_files_removed: written.stale_files_removed,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogTable, LocalCatalogClient, TableMetadata};
    use crate::engine::{RecordSet, WriteSummary};
    use crate::storage::StorageLocation;
    use arrow_array::{Int64Array, RecordBatch, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Engine double recording the calls it receives
    struct RecordingEngine {
        records: RecordSet,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingEngine {
        fn new(records: RecordSet) -> Arc<Self> {
            Arc::new(Self {
                records,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionEngine for RecordingEngine {
        async fn load(
            &self,
            _table: &TableReference,
            _metadata: &TableMetadata,
            predicate: Option<&PushDownPredicate>,
        ) -> Result<RecordSet> {
            let call = match predicate {
                Some(p) => format!("load[{}]", p),
                None => "load".to_string(),
            };
            self.calls.lock().unwrap().push(call);
            Ok(self.records.clone())
        }

        async fn write(
            &self,
            records: PartitionedRecordSet,
            plan: &CompactionPlan,
            destination: &StorageLocation,
        ) -> Result<WriteSummary> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("write[{}]", destination));
            Ok(WriteSummary {
                partitions_written: records.num_partitions(),
                files_written: records.groups().map(|g| plan.files_for(g.num_rows())).sum(),
                records_written: records.num_rows(),
                stale_files_removed: 0,
            })
        }
    }

    fn orders() -> TableReference {
        TableReference::new("sales", "orders").unwrap()
    }

    fn batch(rows: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("order_id", DataType::Int64, false),
            Field::new("region", DataType::Utf8, true),
            Field::new("year", DataType::Utf8, true),
        ]));
        let regions: Vec<&str> = (0..rows).map(|i| if i % 2 == 0 { "eu" } else { "us" }).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from_iter_values(0..rows as i64)),
                Arc::new(StringArray::from(regions)),
                Arc::new(StringArray::from(vec!["2024"; rows])),
            ],
        )
        .unwrap()
    }

    fn compactor(document: CatalogTable, engine: Arc<RecordingEngine>) -> Compactor {
        let catalog = Arc::new(LocalCatalogClient::new());
        catalog.register_table(orders(), document);
        Compactor::new(MetadataResolver::new(catalog), engine)
    }

    fn request(max: usize) -> CompactionRequest {
        CompactionRequest::new("nightly", orders(), NonZeroUsize::new(max).unwrap())
    }

    #[tokio::test]
    async fn runs_stages_in_order() {
        let engine = RecordingEngine::new(RecordSet::new(vec![batch(5)], 2));
        let compactor = compactor(
            CatalogTable::new("orders", "s3://bucket/orders/", &["region", "year"]),
            engine.clone(),
        );

        let summary = compactor.run(&request(2)).await.unwrap();
        assert_eq!(summary.job_name, "nightly");
        assert_eq!(summary.partitions_written, 2);
        assert_eq!(summary.records_written, 5);
        // eu has 3 rows, us has 2
        assert_eq!(summary.files_written, 3);
        assert!(summary.finished_at >= summary.started_at);
        assert_eq!(engine.calls(), vec!["load", "write[s3://bucket/orders/]"]);
    }

    #[tokio::test]
    async fn blank_predicate_loads_full_table() {
        let engine = RecordingEngine::new(RecordSet::new(vec![batch(1)], 1));
        let compactor = compactor(
            CatalogTable::new("orders", "s3://bucket/orders", &["region"]),
            engine.clone(),
        );

        let request = request(10).with_predicate(Some("   ".to_string()));
        compactor.run(&request).await.unwrap();
        assert_eq!(engine.calls()[0], "load");
    }

    #[tokio::test]
    async fn predicate_is_trimmed_and_passed_down() {
        let engine = RecordingEngine::new(RecordSet::new(vec![batch(1)], 1));
        let compactor = compactor(
            CatalogTable::new("orders", "s3://bucket/orders", &["region"]),
            engine.clone(),
        );

        let request = request(10).with_predicate(Some("  region = 'eu' ".to_string()));
        compactor.run(&request).await.unwrap();
        assert_eq!(engine.calls()[0], "load[region = 'eu']");
    }

    #[tokio::test]
    async fn unpartitioned_table_never_loads() {
        let engine = RecordingEngine::new(RecordSet::new(vec![batch(1)], 1));
        let compactor = compactor(
            CatalogTable::new("orders", "s3://bucket/orders", &[]),
            engine.clone(),
        );

        let err = compactor.run(&request(10)).await.unwrap_err();
        assert!(matches!(err, Error::NoPartitions { .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_location_never_loads() {
        let engine = RecordingEngine::new(RecordSet::new(vec![batch(1)], 1));
        let compactor = compactor(CatalogTable::new("orders", "", &["region"]), engine.clone());

        let err = compactor.run(&request(10)).await.unwrap_err();
        assert!(matches!(err, Error::MissingLocation { .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_dataset_is_an_error_and_skips_write() {
        let engine = RecordingEngine::new(RecordSet::new(vec![batch(0)], 1));
        let compactor = compactor(
            CatalogTable::new("orders", "s3://bucket/orders", &["region"]),
            engine.clone(),
        );

        let err = compactor.run(&request(10)).await.unwrap_err();
        assert!(matches!(err, Error::EmptyDataset { .. }));
        assert_eq!(err.exit_code(), 5);
        assert_eq!(engine.calls(), vec!["load"]);
    }

    #[tokio::test]
    async fn unknown_table_is_lookup_error() {
        let engine = RecordingEngine::new(RecordSet::default());
        let catalog = Arc::new(LocalCatalogClient::new());
        let compactor = Compactor::new(MetadataResolver::new(catalog), engine.clone());

        let err = compactor.run(&request(10)).await.unwrap_err();
        assert!(matches!(err, Error::CatalogLookup { .. }));
        assert!(engine.calls().is_empty());
    }
}
