//! Schema merging across files written at different times

use crate::{Error, Result};

use arrow::array::new_null_array;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_schema::{Field, Schema, SchemaRef};
use std::sync::Arc;

/// Union of all columns; a column missing from any input becomes nullable.
///
/// Conflicting types for the same column cannot be reconciled.
pub fn merge_schemas(schemas: &[SchemaRef]) -> Result<SchemaRef> {
    let merged = Schema::try_merge(schemas.iter().map(|s| s.as_ref().clone()))
        .map_err(|e| Error::Write(format!("irreconcilable schema merge conflict: {}", e)))?;

    let fields: Vec<Field> = merged
        .fields()
        .iter()
        .map(|field| {
            let everywhere = schemas
                .iter()
                .all(|s| s.field_with_name(field.name()).is_ok());
            field
                .as_ref()
                .clone()
                .with_nullable(field.is_nullable() || !everywhere)
        })
        .collect();

    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        merged.metadata().clone(),
    )))
}

/// Reshape a batch to `schema`, filling absent columns with nulls
pub fn align_batch(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    if batch.schema().as_ref() == schema.as_ref() {
        return Ok(batch.clone());
    }

    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) => Arc::clone(column),
            None => new_null_array(field.data_type(), batch.num_rows()),
        })
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &options,
    )?)
}
