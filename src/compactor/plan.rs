//! Compaction plan: grouping key and output file bound

use std::num::NonZeroUsize;

/// How records are regrouped and split into output files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPlan {
    partition_keys: Vec<String>,
    max_records_per_file: NonZeroUsize,
}

impl CompactionPlan {
    pub fn new(partition_keys: Vec<String>, max_records_per_file: NonZeroUsize) -> Self {
        Self {
            partition_keys,
            max_records_per_file,
        }
    }

    /// Partition key columns in declared order
    pub fn partition_keys(&self) -> &[String] {
        &self.partition_keys
    }

    pub fn max_records_per_file(&self) -> usize {
        self.max_records_per_file.get()
    }

    /// Number of files needed for a partition of `rows` records
    pub fn files_for(&self, rows: usize) -> usize {
        rows.div_ceil(self.max_records_per_file())
    }

    /// `(offset, len)` of each output file for a partition of `rows` records
    pub fn chunk_ranges(&self, rows: usize) -> impl Iterator<Item = (usize, usize)> {
        let max = self.max_records_per_file();
        (0..rows)
            .step_by(max)
            .map(move |offset| (offset, max.min(rows - offset)))
    }
}
