//! Parquet writer for compacted output files

use crate::Result;
use arrow_array::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};

/// Default rows per row group
const DEFAULT_ROW_GROUP_SIZE: usize = 500_000;

/// Parquet writer producing Snappy-compressed files
#[derive(Debug, Clone)]
pub struct ParquetWriter {
    /// Writer properties
    props: WriterProperties,
}

impl ParquetWriter {
    /// Create a new Parquet writer with default settings
    pub fn new() -> Self {
        Self::with_row_group_size(DEFAULT_ROW_GROUP_SIZE)
    }

    /// Create a writer with a custom row group size
    pub fn with_row_group_size(max_row_group_size: usize) -> Self {
        Self {
            props: Self::build_writer_properties(max_row_group_size.max(1)),
        }
    }

    fn build_writer_properties(max_row_group_size: usize) -> WriterProperties {
        WriterProperties::builder()
            // Readers of compacted tables include older engines
            .set_writer_version(WriterVersion::PARQUET_1_0)
            .set_compression(Compression::SNAPPY)
            // High-cardinality columns fall back to plain encoding
            .set_dictionary_enabled(true)
            .set_max_row_group_size(max_row_group_size)
            // Statistics let downstream readers prune row groups
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_data_page_size_limit(1024 * 1024)
            .build()
    }

    /// Write a record batch to Parquet bytes
    pub fn write_batch(&self, batch: &RecordBatch) -> Result<Bytes> {
        let mut buffer = Vec::new();

        {
            let mut writer =
                ArrowWriter::try_new(&mut buffer, batch.schema(), Some(self.props.clone()))?;

            writer.write(batch)?;
            writer.close()?;
        }

        Ok(Bytes::from(buffer))
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;

    fn create_test_batch(rows: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("order_id", DataType::Int64, false),
            Field::new("customer", DataType::Utf8, false),
            Field::new("amount", DataType::Float64, true),
        ]));

        let ids: Vec<i64> = (0..rows as i64).collect();
        let customers: Vec<&str> = (0..rows).map(|_| "acme").collect();
        let amounts: Vec<f64> = (0..rows).map(|i| i as f64 * 2.5).collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(customers)),
                Arc::new(Float64Array::from(amounts)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_write_batch() {
        let writer = ParquetWriter::new();
        let bytes = writer.write_batch(&create_test_batch(1000)).unwrap();
        assert!(!bytes.is_empty());

        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();
        let column = builder.metadata().row_group(0).column(0);
        assert_eq!(column.compression(), Compression::SNAPPY);

        let mut reader = builder.build().unwrap();
        let read_batch = reader.next().unwrap().unwrap();
        assert_eq!(read_batch.num_rows(), 1000);
    }

    #[test]
    fn test_row_group_size() {
        let writer = ParquetWriter::with_row_group_size(100);
        let bytes = writer.write_batch(&create_test_batch(250)).unwrap();

        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 3);
    }
}
