//! Object-store-backed catalog client
//!
//! Each table is one JSON document at `<prefix>/<database>/<table>.json`, in
//! the same layout the Glue `GetTable` call returns.

use super::{CatalogClient, CatalogTable, TableReference};
use crate::Result;

use async_trait::async_trait;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::debug;

/// Catalog client reading table documents from object storage
pub struct ObjectStoreCatalogClient {
    object_store: Arc<dyn ObjectStore>,
    prefix: Path,
}

impl ObjectStoreCatalogClient {
    pub fn new(object_store: Arc<dyn ObjectStore>, prefix: Path) -> Self {
        Self {
            object_store,
            prefix,
        }
    }

    fn document_path(&self, table: &TableReference) -> Path {
        self.prefix
            .child(table.database())
            .child(format!("{}.json", table.table()))
    }

    /// Store a table document (used by tooling and tests to seed the catalog)
    pub async fn put_table(&self, table: &TableReference, document: &CatalogTable) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        self.object_store
            .put(&self.document_path(table), PutPayload::from(bytes))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for ObjectStoreCatalogClient {
    async fn get_table(&self, table: &TableReference) -> Result<CatalogTable> {
        let path = self.document_path(table);
        debug!(path = %path, "Fetching catalog document");

        let bytes = match self.object_store.get(&path).await {
            Ok(result) => result
                .bytes()
                .await
                .map_err(|e| table.lookup_error(e.to_string()))?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(table.lookup_error("table not found"));
            }
            Err(e) => return Err(table.lookup_error(e.to_string())),
        };

        CatalogTable::from_json(table, &bytes)
    }
}
