//! Table catalog access
//!
//! The catalog answers "where does this table live and how is it partitioned".
//! Clients return the catalog's own document shape ([`CatalogTable`], the Glue
//! `GetTable` layout); [`MetadataResolver`] turns that into a typed
//! [`TableMetadata`], rejecting documents that cannot describe a table.

mod local;
mod store;

pub use local::LocalCatalogClient;
pub use store::ObjectStoreCatalogClient;

use crate::storage::StorageLocation;
use crate::{Error, Result};

use arrow_schema::DataType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Database + table identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    database: String,
    table: String,
}

impl TableReference {
    /// Both names must be non-blank
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let database = database.into().trim().to_string();
        let table = table.into().trim().to_string();
        if database.is_empty() {
            return Err(Error::Config("database name cannot be empty".to_string()));
        }
        if table.is_empty() {
            return Err(Error::Config("table name cannot be empty".to_string()));
        }
        Ok(Self { database, table })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn lookup_error(&self, reason: impl Into<String>) -> Error {
        Error::CatalogLookup {
            database: self.database.clone(),
            table: self.table.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedCatalog {
            database: self.database.clone(),
            table: self.table.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Resolved table metadata.
///
/// Either part may be empty; the precondition validator decides whether the
/// table can be compacted. `partition_types[i]` is the declared type of
/// `partition_keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub location: Option<StorageLocation>,
    pub partition_keys: Vec<String>,
    pub partition_types: Vec<DataType>,
}

impl TableMetadata {
    /// Metadata whose partition keys are all strings
    pub fn new(location: Option<StorageLocation>, partition_keys: Vec<String>) -> Self {
        let partition_types = vec![DataType::Utf8; partition_keys.len()];
        Self {
            location,
            partition_keys,
            partition_types,
        }
    }

    /// Declared type of the `index`-th partition key, `Utf8` when unknown
    pub fn partition_type(&self, index: usize) -> DataType {
        self.partition_types
            .get(index)
            .cloned()
            .unwrap_or(DataType::Utf8)
    }
}

/// Arrow type for a Hive/Glue column type name.
///
/// Types without a lossless string cast (structs, maps, timestamps with
/// zones, unknown names) stay `Utf8`.
pub fn partition_key_type(type_name: Option<&str>) -> DataType {
    let Some(raw) = type_name else {
        return DataType::Utf8;
    };
    let name = raw.trim().to_ascii_lowercase();
    match name.as_str() {
        "tinyint" => DataType::Int8,
        "smallint" => DataType::Int16,
        "int" | "integer" => DataType::Int32,
        "bigint" | "long" => DataType::Int64,
        "float" => DataType::Float32,
        "double" => DataType::Float64,
        "boolean" => DataType::Boolean,
        "date" => DataType::Date32,
        "decimal" => DataType::Decimal128(10, 0),
        _ => match name
            .strip_prefix("decimal(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|args| args.split_once(','))
        {
            Some((precision, scale)) => {
                match (precision.trim().parse::<u8>(), scale.trim().parse::<i8>()) {
                    (Ok(p), Ok(s)) if (1..=38).contains(&p) && s >= 0 && s as u8 <= p => {
                        DataType::Decimal128(p, s)
                    }
                    _ => DataType::Utf8,
                }
            }
            None => DataType::Utf8,
        },
    }
}

/// Catalog document for one table (Glue `GetTable` response layout)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogTable {
    pub table: CatalogTableEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogTableEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_descriptor: Option<StorageDescriptor>,
    #[serde(default)]
    pub partition_keys: Vec<CatalogColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorageDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogColumn {
    pub name: String,
    #[serde(default, rename = "Type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl CatalogTable {
    /// Build a document for a table with the given location and partition keys
    pub fn new(name: &str, location: &str, partition_keys: &[&str]) -> Self {
        Self {
            table: CatalogTableEntry {
                name: Some(name.to_string()),
                database_name: None,
                storage_descriptor: Some(StorageDescriptor {
                    location: Some(location.to_string()),
                }),
                partition_keys: partition_keys
                    .iter()
                    .map(|k| CatalogColumn {
                        name: k.to_string(),
                        data_type: Some("string".to_string()),
                    })
                    .collect(),
            },
        }
    }

    /// Declare the type of a partition key (Glue type name, e.g. `int`)
    pub fn with_partition_type(mut self, key: &str, data_type: &str) -> Self {
        for column in self.table.partition_keys.iter_mut() {
            if column.name == key {
                column.data_type = Some(data_type.to_string());
            }
        }
        self
    }

    /// Parse a raw catalog document
    pub fn from_json(table: &TableReference, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| table.malformed(e.to_string()))
    }
}

/// Catalog client interface
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch the catalog document for a table.
    ///
    /// A missing table or unreachable catalog is `Error::CatalogLookup`.
    async fn get_table(&self, table: &TableReference) -> Result<CatalogTable>;
}

/// Looks tables up in the catalog and converts the answer to [`TableMetadata`]
#[derive(Clone)]
pub struct MetadataResolver {
    catalog: Arc<dyn CatalogClient>,
}

impl MetadataResolver {
    pub fn new(catalog: Arc<dyn CatalogClient>) -> Self {
        Self { catalog }
    }

    /// Resolve a table's location and partition keys
    pub async fn resolve(&self, table: &TableReference) -> Result<TableMetadata> {
        let document = self.catalog.get_table(table).await?;
        let metadata = Self::parse(table, document)?;
        debug!(
            table = %table,
            location = %metadata.location.as_ref().map(|l| l.as_str()).unwrap_or(""),
            partition_keys = ?metadata.partition_keys,
            "Resolved table metadata"
        );
        Ok(metadata)
    }

    fn parse(table: &TableReference, document: CatalogTable) -> Result<TableMetadata> {
        let entry = document.table;

        if let Some(name) = entry.name.as_deref() {
            if name != table.table() {
                return Err(table.malformed(format!(
                    "catalog returned table '{}' for a lookup of '{}'",
                    name,
                    table.table()
                )));
            }
        }

        let location = match entry
            .storage_descriptor
            .and_then(|sd| sd.location)
            .filter(|l| !l.trim().is_empty())
        {
            Some(raw) => Some(
                StorageLocation::parse(&raw)
                    .map_err(|e| table.malformed(format!("invalid location: {}", e)))?,
            ),
            None => None,
        };

        let mut seen = HashSet::new();
        let mut partition_keys = Vec::with_capacity(entry.partition_keys.len());
        let mut partition_types = Vec::with_capacity(entry.partition_keys.len());
        for column in entry.partition_keys {
            let name = column.name.trim().to_string();
            if name.is_empty() {
                return Err(table.malformed("partition key with empty name"));
            }
            if !seen.insert(name.clone()) {
                return Err(table.malformed(format!("duplicate partition key '{}'", name)));
            }
            partition_types.push(partition_key_type(column.data_type.as_deref()));
            partition_keys.push(name);
        }

        Ok(TableMetadata {
            location,
            partition_keys,
            partition_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableReference {
        TableReference::new("sales", "orders").unwrap()
    }

    #[test]
    fn table_reference_rejects_blank_names() {
        assert!(TableReference::new("", "orders").is_err());
        assert!(TableReference::new("sales", "  ").is_err());
        assert_eq!(orders().to_string(), "sales.orders");
    }

    #[test]
    fn parses_glue_document() {
        let raw = br#"{
            "Table": {
                "Name": "orders",
                "DatabaseName": "sales",
                "StorageDescriptor": {"Location": "s3://bucket/orders/", "Compressed": false},
                "PartitionKeys": [{"Name": "region", "Type": "string"}, {"Name": "year", "Type": "int"}],
                "TableType": "EXTERNAL_TABLE"
            }
        }"#;
        let doc = CatalogTable::from_json(&orders(), raw).unwrap();
        let meta = MetadataResolver::parse(&orders(), doc).unwrap();
        assert_eq!(meta.partition_keys, vec!["region", "year"]);
        assert_eq!(meta.partition_types, vec![DataType::Utf8, DataType::Int32]);
        assert_eq!(meta.location.unwrap().as_str(), "s3://bucket/orders/");
    }

    #[test]
    fn maps_glue_type_names() {
        assert_eq!(partition_key_type(None), DataType::Utf8);
        assert_eq!(partition_key_type(Some("string")), DataType::Utf8);
        assert_eq!(partition_key_type(Some("varchar(32)")), DataType::Utf8);
        assert_eq!(partition_key_type(Some("INT")), DataType::Int32);
        assert_eq!(partition_key_type(Some("bigint")), DataType::Int64);
        assert_eq!(partition_key_type(Some("date")), DataType::Date32);
        assert_eq!(partition_key_type(Some("boolean")), DataType::Boolean);
        assert_eq!(
            partition_key_type(Some("decimal(12, 2)")),
            DataType::Decimal128(12, 2)
        );
        assert_eq!(partition_key_type(Some("decimal(2,5)")), DataType::Utf8);
        assert_eq!(partition_key_type(Some("map<string,int>")), DataType::Utf8);
    }

    #[test]
    fn typed_keys_survive_resolution() {
        let doc = CatalogTable::new("orders", "s3://b/orders", &["region", "day"])
            .with_partition_type("day", "date");
        let meta = MetadataResolver::parse(&orders(), doc).unwrap();
        assert_eq!(meta.partition_type(0), DataType::Utf8);
        assert_eq!(meta.partition_type(1), DataType::Date32);
        assert_eq!(meta.partition_type(7), DataType::Utf8);
    }

    #[test]
    fn missing_location_and_keys_are_not_errors_here() {
        let raw = br#"{"Table": {"Name": "orders", "StorageDescriptor": {"Location": "  "}}}"#;
        let doc = CatalogTable::from_json(&orders(), raw).unwrap();
        let meta = MetadataResolver::parse(&orders(), doc).unwrap();
        assert!(meta.location.is_none());
        assert!(meta.partition_keys.is_empty());
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = CatalogTable::from_json(&orders(), br#"{"Tables": []}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalog { .. }));

        let err =
            CatalogTable::from_json(&orders(), br#"{"Table": {"PartitionKeys": "region"}}"#)
                .unwrap_err();
        assert!(matches!(err, Error::MalformedCatalog { .. }));
    }

    #[test]
    fn rejects_duplicate_and_blank_keys() {
        let mut doc = CatalogTable::new("orders", "s3://b/orders", &["region", "region"]);
        let err = MetadataResolver::parse(&orders(), doc.clone()).unwrap_err();
        assert!(err.to_string().contains("duplicate partition key"));

        doc.table.partition_keys[1].name = " ".to_string();
        let err = MetadataResolver::parse(&orders(), doc).unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn rejects_wrong_table_and_bad_location() {
        let doc = CatalogTable::new("customers", "s3://b/customers", &["region"]);
        assert!(MetadataResolver::parse(&orders(), doc).is_err());

        let doc = CatalogTable::new("orders", "ftp://b/orders", &["region"]);
        let err = MetadataResolver::parse(&orders(), doc).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalog { .. }));
    }
}
