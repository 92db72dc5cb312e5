//! Hive-partitioned Parquet tables on object storage
//!
//! Loads every data file below a table location (or only the partitions a
//! push-down predicate selects) and writes compacted partitions back in
//! overwrite mode.
//!
//! A partition is replaced in three steps: new files go to `_staging/`, a
//! `_compaction_pending.json` marker records what the commit supersedes, then
//! the marker is applied. Applying a marker is idempotent, so a commit cut
//! short by a crash is rolled forward the next time the table is loaded or
//! the partition is written.

use super::{ExecutionEngine, ParquetWriter, RecordSet, WriteSummary};
use crate::catalog::{TableMetadata, TableReference};
use crate::compactor::{CompactionPlan, PartitionedRecordSet, PushDownPredicate};
use crate::storage::{hive, StorageLocation, StoreRegistry};
use crate::{Error, Result};

use arrow::compute::cast;
use arrow_array::cast::AsArray;
use arrow_array::types::UInt64Type;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, FieldRef, Schema};
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::{SessionConfig, SessionContext};
use futures::TryStreamExt;
use metrics::counter;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Table name the partition listing is registered under for predicate evaluation
const PARTITIONS_TABLE: &str = "partitions";

/// Row ordinal column added to the partition listing
const ORDINAL_COLUMN: &str = "__partition_ordinal";

/// Directory inside a partition that holds output files before commit
const STAGING_DIR: &str = "_staging";

/// Marker of a partition commit that has not finished yet
const PENDING_MARKER: &str = "_compaction_pending.json";

/// A data file and the partition values encoded in its path
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartitionFile {
    path: Path,
    values: Vec<Option<String>>,
}

/// Data files under a table location and any unfinished commits found there
#[derive(Debug, Default)]
struct TableListing {
    files: Vec<PartitionFile>,
    pending: Vec<Path>,
}

/// Contents of a pending marker
#[derive(Debug, Serialize, Deserialize)]
struct PendingCommit {
    /// Full paths of objects the commit removes
    superseded: Vec<String>,
    /// Output file names, staged under `_staging/` until moved into place
    staged: Vec<String>,
}

/// Bookkeeping segments (`_staging`, `_SUCCESS`, `.tmp`) that are not data.
/// Partition segments always contain `=`.
fn is_hidden(part: &str) -> bool {
    (part.starts_with('_') || part.starts_with('.')) && !part.contains('=')
}

/// Execution engine for Hive-style partitioned Parquet tables
pub struct HiveParquetEngine {
    stores: Arc<StoreRegistry>,
    writer: ParquetWriter,
}

impl HiveParquetEngine {
    pub fn new(stores: Arc<StoreRegistry>) -> Self {
        Self {
            stores,
            writer: ParquetWriter::new(),
        }
    }

    /// Use a custom Parquet writer for output files
    pub fn with_writer(mut self, writer: ParquetWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Output file name for the `index`-th file of a partition.
    ///
    /// Names are deterministic so a re-run replaces rather than accumulates.
    pub fn output_file_name(index: usize) -> String {
        format!("part-{:05}.snappy.parquet", index)
    }

    async fn list_partition_files(
        store: &dyn ObjectStore,
        prefix: &Path,
        keys: &[String],
    ) -> Result<TableListing> {
        let objects: Vec<ObjectMeta> = store.list(Some(prefix)).try_collect().await?;
        let depth = prefix.parts().count();

        let mut listing = TableListing::default();
        for meta in objects {
            let parts: Vec<_> = meta.location.parts().skip(depth).collect();
            let relative: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
            let Some(file_name) = relative.last() else {
                continue;
            };

            if *file_name == PENDING_MARKER {
                listing.pending.push(meta.location.clone());
                continue;
            }
            if relative.iter().any(|part| is_hidden(part)) || !file_name.ends_with(".parquet") {
                debug!(path = %meta.location, "Skipping non-data file");
                continue;
            }

            match hive::values_for_file(keys, &relative) {
                Some(values) => listing.files.push(PartitionFile {
                    path: meta.location.clone(),
                    values,
                }),
                None => warn!(
                    path = %meta.location,
                    "Skipping file outside the partition layout"
                ),
            }
        }

        listing.files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listing)
    }

    async fn delete_if_exists(store: &dyn ObjectStore, path: &Path) -> Result<()> {
        match store.delete(path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Finish the commit recorded in `dir`'s pending marker, if there is one.
    ///
    /// Returns the number of superseded objects the marker named.
    async fn roll_forward(store: &dyn ObjectStore, dir: &Path) -> Result<Option<usize>> {
        let marker = dir.child(PENDING_MARKER);
        let data = match store.get(&marker).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let commit: PendingCommit = serde_json::from_slice(&data)?;
        Self::apply_commit(store, dir, &commit).await?;
        Ok(Some(commit.superseded.len()))
    }

    async fn apply_commit(
        store: &dyn ObjectStore,
        dir: &Path,
        commit: &PendingCommit,
    ) -> Result<()> {
        for raw in &commit.superseded {
            Self::delete_if_exists(store, &Path::parse(raw)?).await?;
        }

        let staging = dir.child(STAGING_DIR);
        for name in &commit.staged {
            let from = staging.child(name.as_str());
            match store.copy(&from, &dir.child(name.as_str())).await {
                Ok(()) => Self::delete_if_exists(store, &from).await?,
                // Moved by an earlier attempt
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Self::delete_if_exists(store, &dir.child(PENDING_MARKER)).await
    }

    /// Roll forward every unfinished commit under the table location
    async fn recover_pending(store: &dyn ObjectStore, markers: &[Path]) -> Result<()> {
        for marker in markers {
            let depth = marker.parts().count().saturating_sub(1);
            let dir: Path = marker.parts().take(depth).collect();
            if let Some(superseded) = Self::roll_forward(store, &dir).await? {
                warn!(
                    partition = %dir,
                    superseded,
                    "Completed interrupted partition commit"
                );
            }
        }
        Ok(())
    }

    /// Replace the contents of `dir` with `outputs` (file name, bytes).
    ///
    /// Returns the number of superseded objects removed.
    async fn commit_partition(
        store: &dyn ObjectStore,
        dir: &Path,
        outputs: Vec<(String, bytes::Bytes)>,
    ) -> Result<usize> {
        Self::roll_forward(store, dir).await?;

        let staging = dir.child(STAGING_DIR);
        let leftovers: Vec<ObjectMeta> = store.list(Some(&staging)).try_collect().await?;
        for meta in leftovers {
            Self::delete_if_exists(store, &meta.location).await?;
        }

        let mut staged = Vec::with_capacity(outputs.len());
        for (name, bytes) in outputs {
            store
                .put(&staging.child(name.as_str()), PutPayload::from(bytes))
                .await?;
            staged.push(name);
        }

        let finals: HashSet<Path> = staged.iter().map(|n| dir.child(n.as_str())).collect();
        let marker = dir.child(PENDING_MARKER);
        let existing: Vec<ObjectMeta> = store.list(Some(dir)).try_collect().await?;
        let superseded: Vec<String> = existing
            .into_iter()
            .map(|meta| meta.location)
            .filter(|path| {
                !finals.contains(path) && *path != marker && !path.prefix_matches(&staging)
            })
            .map(|path| path.as_ref().to_string())
            .collect();

        let commit = PendingCommit { superseded, staged };
        store
            .put(&marker, PutPayload::from(serde_json::to_vec(&commit)?))
            .await?;
        Self::apply_commit(store, dir, &commit).await?;
        Ok(commit.superseded.len())
    }

    /// Keep only files whose partition satisfies `predicate`
    async fn prune_partitions(
        keys: &[String],
        types: &[DataType],
        files: Vec<PartitionFile>,
        predicate: &PushDownPredicate,
    ) -> Result<Vec<PartitionFile>> {
        let mut ordinals: HashMap<Vec<Option<String>>, u64> = HashMap::new();
        let mut partitions: Vec<Vec<Option<String>>> = Vec::new();
        for file in &files {
            if !ordinals.contains_key(&file.values) {
                ordinals.insert(file.values.clone(), partitions.len() as u64);
                partitions.push(file.values.clone());
            }
        }

        let matching = Self::matching_partitions(keys, types, &partitions, predicate).await?;
        debug!(
            partitions = partitions.len(),
            matching = matching.len(),
            "Evaluated push-down predicate"
        );

        Ok(files
            .into_iter()
            .filter(|f| {
                ordinals
                    .get(&f.values)
                    .is_some_and(|ordinal| matching.contains(ordinal))
            })
            .collect())
    }

    /// Ordinals of the partitions for which `predicate` holds.
    ///
    /// Key columns carry their declared types; values that do not parse as
    /// that type are null.
    async fn matching_partitions(
        keys: &[String],
        types: &[DataType],
        partitions: &[Vec<Option<String>>],
        predicate: &PushDownPredicate,
    ) -> Result<HashSet<u64>> {
        let mut fields = Vec::with_capacity(keys.len() + 1);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(keys.len() + 1);
        for (i, key) in keys.iter().enumerate() {
            let data_type = types.get(i).cloned().unwrap_or(DataType::Utf8);
            let raw: ArrayRef = Arc::new(
                partitions
                    .iter()
                    .map(|p| p[i].as_deref())
                    .collect::<StringArray>(),
            );
            columns.push(cast(&raw, &data_type)?);
            fields.push(Field::new(key, data_type, true));
        }
        fields.push(Field::new(ORDINAL_COLUMN, DataType::UInt64, false));
        let schema = Arc::new(Schema::new(fields));

        columns.push(Arc::new(UInt64Array::from_iter_values(
            0..partitions.len() as u64,
        )));
        let listing = RecordBatch::try_new(Arc::clone(&schema), columns)?;

        // Partition keys keep their declared case
        let config =
            SessionConfig::new().set_bool("datafusion.sql_parser.enable_ident_normalization", false);
        let ctx = SessionContext::new_with_config(config);
        ctx.register_table(
            PARTITIONS_TABLE,
            Arc::new(MemTable::try_new(schema, vec![vec![listing]])?),
        )?;

        let sql = format!(
            "SELECT {} FROM {} WHERE ({})",
            ORDINAL_COLUMN,
            PARTITIONS_TABLE,
            predicate.as_str()
        );
        let batches = ctx.sql(&sql).await?.collect().await?;

        let mut matching = HashSet::new();
        for batch in batches {
            let ordinals = batch.column(0).as_primitive::<UInt64Type>();
            matching.extend(ordinals.values().iter().copied());
        }
        Ok(matching)
    }

    async fn read_file(
        store: &dyn ObjectStore,
        file: &PartitionFile,
        keys: &[String],
    ) -> Result<Vec<RecordBatch>> {
        let data = store.get(&file.path).await?.bytes().await?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(data)?.build()?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(Self::with_partition_columns(batch?, keys, &file.values)?);
        }
        Ok(batches)
    }

    /// Append partition values from the path as `Utf8` columns, replacing any
    /// same-named column stored in the file.
    fn with_partition_columns(
        batch: RecordBatch,
        keys: &[String],
        values: &[Option<String>],
    ) -> Result<RecordBatch> {
        let schema = batch.schema();
        let rows = batch.num_rows();

        let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len() + keys.len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            if keys.iter().any(|k| k == field.name()) {
                continue;
            }
            fields.push(Arc::clone(field));
            columns.push(Arc::clone(column));
        }
        for (key, value) in keys.iter().zip(values) {
            fields.push(Arc::new(Field::new(key, DataType::Utf8, true)));
            columns.push(Arc::new(StringArray::from(vec![value.as_deref(); rows])));
        }

        let schema = Schema::new_with_metadata(fields, schema.metadata().clone());
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(schema),
            columns,
            &options,
        )?)
    }

    async fn load_files(
        &self,
        table: &TableReference,
        metadata: &TableMetadata,
        predicate: Option<&PushDownPredicate>,
    ) -> Result<RecordSet> {
        let location = metadata.location.as_ref().ok_or_else(|| Error::MissingLocation {
            database: table.database().to_string(),
            table: table.table().to_string(),
        })?;
        let keys = &metadata.partition_keys;
        let store = self.stores.resolve(location)?;

        let mut listing =
            Self::list_partition_files(store.as_ref(), location.prefix(), keys).await?;
        if !listing.pending.is_empty() {
            Self::recover_pending(store.as_ref(), &listing.pending).await?;
            listing = Self::list_partition_files(store.as_ref(), location.prefix(), keys).await?;
        }

        let mut files = listing.files;
        let listed = files.len();
        if let Some(predicate) = predicate {
            files =
                Self::prune_partitions(keys, &metadata.partition_types, files, predicate).await?;
        }

        info!(
            location = %location,
            listed_files = listed,
            selected_files = files.len(),
            "Reading source files"
        );

        let mut batches = Vec::new();
        for file in &files {
            batches.extend(Self::read_file(store.as_ref(), file, keys).await?);
        }

        Ok(RecordSet::new(batches, files.len()))
    }

    async fn write_partitions(
        &self,
        records: PartitionedRecordSet,
        plan: &CompactionPlan,
        destination: &StorageLocation,
    ) -> Result<WriteSummary> {
        let store = self.stores.resolve(destination)?;
        let keys = plan.partition_keys();
        let schema = Arc::clone(records.schema());
        let mut summary = WriteSummary::default();

        for group in records.into_groups() {
            let dir = hive::partition_dir(destination.prefix(), keys, group.values())?;
            let data = group.data_batch(&schema, keys)?;

            let mut outputs = Vec::new();
            for (index, (offset, len)) in plan.chunk_ranges(data.num_rows()).enumerate() {
                let bytes = self.writer.write_batch(&data.slice(offset, len))?;
                outputs.push((Self::output_file_name(index), bytes));
            }
            let files = outputs.len();
            let removed = Self::commit_partition(store.as_ref(), &dir, outputs).await?;

            info!(
                partition = %dir,
                records = data.num_rows(),
                files,
                stale_files_removed = removed,
                "Partition compacted"
            );

            summary.partitions_written += 1;
            summary.files_written += files;
            summary.records_written += data.num_rows();
            summary.stale_files_removed += removed;
        }

        counter!("partcompact_records_written_total").increment(summary.records_written as u64);
        counter!("partcompact_files_written_total").increment(summary.files_written as u64);
        counter!("partcompact_stale_files_removed_total")
            .increment(summary.stale_files_removed as u64);

        Ok(summary)
    }
}

#[async_trait]
impl ExecutionEngine for HiveParquetEngine {
    async fn load(
        &self,
        table: &TableReference,
        metadata: &TableMetadata,
        predicate: Option<&PushDownPredicate>,
    ) -> Result<RecordSet> {
        self.load_files(table, metadata, predicate)
            .await
            .map_err(Error::into_load)
    }

    async fn write(
        &self,
        records: PartitionedRecordSet,
        plan: &CompactionPlan,
        destination: &StorageLocation,
    ) -> Result<WriteSummary> {
        self.write_partitions(records, plan, destination)
            .await
            .map_err(Error::into_write)
    }
}
