//! Local in-memory catalog client for development and testing

use super::{CatalogClient, CatalogTable, TableReference};
use crate::Result;

use async_trait::async_trait;
use dashmap::DashMap;

/// Local in-memory catalog client
///
/// Tables are registered programmatically; suitable for development, tests,
/// and single-node runs.
#[derive(Debug, Default)]
pub struct LocalCatalogClient {
    tables: DashMap<TableReference, CatalogTable>,
}

impl LocalCatalogClient {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a table document
    pub fn register_table(&self, table: TableReference, document: CatalogTable) {
        self.tables.insert(table, document);
    }

    /// Remove a table
    pub fn drop_table(&self, table: &TableReference) -> bool {
        self.tables.remove(table).is_some()
    }
}

#[async_trait]
impl CatalogClient for LocalCatalogClient {
    async fn get_table(&self, table: &TableReference) -> Result<CatalogTable> {
        self.tables
            .get(table)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| table.lookup_error("table not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn returns_registered_table() {
        let client = LocalCatalogClient::new();
        let orders = TableReference::new("sales", "orders").unwrap();
        let doc = CatalogTable::new("orders", "memory://b/orders", &["region"]);
        client.register_table(orders.clone(), doc.clone());

        assert_eq!(client.get_table(&orders).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn missing_table_is_lookup_error() {
        let client = LocalCatalogClient::new();
        let orders = TableReference::new("sales", "orders").unwrap();
        client.register_table(
            orders.clone(),
            CatalogTable::new("orders", "memory://b/orders", &["region"]),
        );
        assert!(client.drop_table(&orders));

        let err = client.get_table(&orders).await.unwrap_err();
        assert!(matches!(err, Error::CatalogLookup { .. }));
    }
}
