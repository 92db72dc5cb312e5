//! Partition-aware regrouping of loaded records
//!
//! Loaded batches follow the source file layout, so one partition's rows are
//! spread over many small batches. Regrouping co-locates every row sharing a
//! partition-key tuple so the writer can emit the fewest files per partition.

use super::schema::{align_batch, merge_schemas};
use crate::engine::RecordSet;
use crate::{Error, Result};

use arrow::compute::{cast, concat_batches, take};
use arrow_array::cast::AsArray;
use arrow_array::{Array, ArrayRef, RecordBatch, UInt32Array};
use arrow_schema::{DataType, SchemaRef};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Partition-key values of one group, in key order. `None` is a null value.
pub type PartitionValues = Vec<Option<String>>;

/// All rows of a single partition
#[derive(Debug, Clone)]
pub struct PartitionGroup {
    values: PartitionValues,
    batches: Vec<RecordBatch>,
    num_rows: usize,
}

impl PartitionGroup {
    fn new(values: PartitionValues) -> Self {
        Self {
            values,
            batches: Vec::new(),
            num_rows: 0,
        }
    }

    fn push(&mut self, batch: RecordBatch) {
        self.num_rows += batch.num_rows();
        self.batches.push(batch);
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// The group's rows as one batch, without the partition columns
    /// (those live in the directory names).
    pub fn data_batch(&self, schema: &SchemaRef, partition_keys: &[String]) -> Result<RecordBatch> {
        let indices: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !partition_keys.iter().any(|k| k == f.name()))
            .map(|(i, _)| i)
            .collect();

        let projected_schema = Arc::new(schema.project(&indices)?);
        let projected = self
            .batches
            .iter()
            .map(|b| b.project(&indices))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(concat_batches(&projected_schema, &projected)?)
    }
}

/// Records regrouped by partition, sharing one merged schema
#[derive(Debug, Clone)]
pub struct PartitionedRecordSet {
    schema: SchemaRef,
    partition_keys: Vec<String>,
    groups: BTreeMap<PartitionValues, PartitionGroup>,
}

impl PartitionedRecordSet {
    /// Merge schemas across the loaded batches and group rows by partition.
    ///
    /// Row order inside a partition follows load order; partitions are
    /// ordered by their key tuple.
    pub fn from_records(records: RecordSet, partition_keys: &[String]) -> Result<Self> {
        let schema = merge_schemas(&records.schemas())?;

        for key in partition_keys {
            if schema.field_with_name(key).is_err() {
                return Err(Error::InvalidSchema(format!(
                    "partition column '{}' missing from loaded records",
                    key
                )));
            }
        }

        let mut grouped = Self {
            schema,
            partition_keys: partition_keys.to_vec(),
            groups: BTreeMap::new(),
        };

        for batch in records.into_batches() {
            if batch.num_rows() == 0 {
                continue;
            }
            let aligned = align_batch(&batch, &grouped.schema)?;
            grouped.add_batch(&aligned)?;
        }

        Ok(grouped)
    }

    fn add_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let key_columns: Vec<ArrayRef> = self
            .partition_keys
            .iter()
            .map(|key| {
                let column = batch.column_by_name(key).ok_or_else(|| {
                    Error::InvalidSchema(format!("partition column '{}' missing", key))
                })?;
                Ok(cast(column.as_ref(), &DataType::Utf8)?)
            })
            .collect::<Result<_>>()?;
        let key_strings: Vec<_> = key_columns.iter().map(|c| c.as_string::<i32>()).collect();

        let mut rows_by_partition: BTreeMap<PartitionValues, Vec<u32>> = BTreeMap::new();
        for row in 0..batch.num_rows() {
            let values: PartitionValues = key_strings
                .iter()
                .map(|column| {
                    if column.is_null(row) || column.value(row).is_empty() {
                        None
                    } else {
                        Some(column.value(row).to_string())
                    }
                })
                .collect();
            rows_by_partition.entry(values).or_default().push(row as u32);
        }

        for (values, rows) in rows_by_partition {
            let indices = UInt32Array::from(rows);
            let columns = batch
                .columns()
                .iter()
                .map(|column| take(column.as_ref(), &indices, None))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let taken = RecordBatch::try_new(batch.schema(), columns)?;

            self.groups
                .entry(values.clone())
                .or_insert_with(|| PartitionGroup::new(values))
                .push(taken);
        }

        Ok(())
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn partition_keys(&self) -> &[String] {
        &self.partition_keys
    }

    pub fn num_partitions(&self) -> usize {
        self.groups.len()
    }

    pub fn num_rows(&self) -> usize {
        self.groups.values().map(|g| g.num_rows()).sum()
    }

    /// Look a partition up by its key values
    pub fn group(&self, values: &[Option<String>]) -> Option<&PartitionGroup> {
        self.groups.get(values)
    }

    pub fn groups(&self) -> impl Iterator<Item = &PartitionGroup> {
        self.groups.values()
    }

    pub fn into_groups(self) -> impl Iterator<Item = PartitionGroup> {
        self.groups.into_values()
    }
}
