//! Component factory for environment-based configuration
//!
//! This module provides factory methods to create object stores and catalog
//! clients based on environment variables, enabling easy switching between
//! development and production configurations.

use crate::catalog::{CatalogClient, LocalCatalogClient, ObjectStoreCatalogClient};
use crate::storage::{StorageLocation, StoreRegistry};
use crate::{Error, Result};

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::info;

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create the object store serving a storage location
    ///
    /// Environment variables (s3 only):
    /// - S3_REGION: S3 region (default: us-east-1)
    /// - S3_ENDPOINT: Custom S3 endpoint (optional, for MinIO)
    /// - AWS_ACCESS_KEY_ID: AWS credentials (optional, uses IAM role if not set)
    /// - AWS_SECRET_ACCESS_KEY: AWS credentials (optional)
    pub fn create_object_store(location: &StorageLocation) -> Result<Arc<dyn ObjectStore>> {
        match location.scheme() {
            "memory" => {
                info!(bucket = location.bucket(), "Using in-memory object store (development mode)");
                Ok(Arc::new(InMemory::new()))
            }
            "file" => {
                info!("Using local filesystem object store");
                Ok(Arc::new(LocalFileSystem::new()))
            }
            "s3" => {
                let bucket = location.bucket();
                let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());

                info!(bucket = bucket, region = %region, "Using S3 object store");

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(&region);

                // Support custom endpoints (MinIO, LocalStack)
                if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
                    info!(endpoint = %endpoint, "Using custom S3 endpoint");
                    builder = builder.with_endpoint(&endpoint).with_allow_http(true);
                }

                // Use explicit credentials if provided, otherwise use IAM role
                if let Ok(key) = std::env::var("AWS_ACCESS_KEY_ID") {
                    builder = builder.with_access_key_id(&key);
                }
                if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                    builder = builder.with_secret_access_key(&secret);
                }

                Ok(Arc::new(builder.build()?))
            }
            other => Err(Error::Config(format!(
                "Unknown storage scheme: {}. Use 'memory', 'file' or 's3'",
                other
            ))),
        }
    }

    /// Create catalog client from environment
    ///
    /// Environment variables:
    /// - CATALOG_BACKEND: "object_store" (default) or "memory"
    /// - CATALOG_URI: location of the table documents (required for object_store),
    ///   e.g. `s3://bucket/catalog/`
    pub fn create_catalog_client(registry: &StoreRegistry) -> Result<Arc<dyn CatalogClient>> {
        Self::catalog_client_for(
            registry,
            std::env::var("CATALOG_BACKEND").ok().as_deref(),
            std::env::var("CATALOG_URI").ok().as_deref(),
        )
    }

    /// Build the catalog client for an explicit backend and URI
    pub fn catalog_client_for(
        registry: &StoreRegistry,
        backend: Option<&str>,
        uri: Option<&str>,
    ) -> Result<Arc<dyn CatalogClient>> {
        let backend = backend
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or("object_store");

        match backend {
            "memory" => {
                info!("Using LocalCatalogClient (development mode, starts empty)");
                Ok(Arc::new(LocalCatalogClient::new()))
            }
            "object_store" => {
                let uri = uri.map(str::trim).filter(|u| !u.is_empty()).ok_or_else(|| {
                    Error::Config(
                        "CATALOG_URI required when CATALOG_BACKEND=object_store (the default)"
                            .to_string(),
                    )
                })?;
                let location = StorageLocation::parse(uri)?;
                let store = registry.resolve(&location)?;

                info!(catalog_uri = %location, "Using ObjectStoreCatalogClient");

                Ok(Arc::new(ObjectStoreCatalogClient::new(
                    store,
                    location.prefix().clone(),
                )))
            }
            other => Err(Error::Config(format!(
                "Unknown CATALOG_BACKEND: {}. Use 'object_store' or 'memory'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_local_store_for_file_scheme() {
        let loc = StorageLocation::parse("file:///tmp/partcompact").unwrap();
        assert!(ComponentFactory::create_object_store(&loc).is_ok());
    }

    #[test]
    fn creates_memory_store() {
        let loc = StorageLocation::parse("memory://dev/orders").unwrap();
        assert!(ComponentFactory::create_object_store(&loc).is_ok());
    }

    #[test]
    fn catalog_defaults_to_object_store_and_needs_uri() {
        let registry = StoreRegistry::new();
        let err = ComponentFactory::catalog_client_for(&registry, None, None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("CATALOG_URI")));
        assert_eq!(err.exit_code(), 2);

        let err = ComponentFactory::catalog_client_for(&registry, Some(" "), Some("  "))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn object_store_catalog_reads_from_catalog_uri() {
        let registry = StoreRegistry::new();
        let store = Arc::new(InMemory::new());
        registry.register_url("memory://meta", store.clone()).unwrap();

        let table = crate::catalog::TableReference::new("sales", "orders").unwrap();
        ObjectStoreCatalogClient::new(store, object_store::path::Path::from("catalog"))
            .put_table(
                &table,
                &crate::catalog::CatalogTable::new("orders", "memory://lake/orders", &["region"]),
            )
            .await
            .unwrap();

        let client =
            ComponentFactory::catalog_client_for(&registry, None, Some("memory://meta/catalog"))
                .unwrap();
        let document = client.get_table(&table).await.unwrap();
        assert_eq!(document.table.name.as_deref(), Some("orders"));
    }

    #[test]
    fn memory_catalog_is_opt_in_and_unknown_backends_fail() {
        let registry = StoreRegistry::new();
        assert!(ComponentFactory::catalog_client_for(&registry, Some("memory"), None).is_ok());
        let err = ComponentFactory::catalog_client_for(&registry, Some("glue"), None)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
