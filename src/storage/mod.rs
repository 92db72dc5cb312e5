//! Storage locations and object store resolution
//!
//! Table locations arrive from the catalog as URIs (`s3://bucket/orders/`,
//! `file:///data/orders`, `memory://bucket/orders`). This module turns them into
//! a typed [`StorageLocation`] and hands out one object store per
//! `scheme://bucket` through the [`StoreRegistry`].

pub mod hive;

use crate::config::ComponentFactory;
use crate::{Error, Result};

use dashmap::DashMap;
use object_store::path::Path;
use object_store::ObjectStore;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// A parsed storage URI: which store, and which prefix inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    uri: String,
    scheme: String,
    bucket: String,
    prefix: Path,
}

impl StorageLocation {
    /// Parse a storage URI
    pub fn parse(uri: &str) -> Result<Self> {
        let trimmed = uri.trim();
        let url = Url::parse(trimmed)
            .map_err(|e| Error::Config(format!("invalid storage location '{}': {}", trimmed, e)))?;

        let scheme = match url.scheme().to_ascii_lowercase().as_str() {
            "s3" | "s3a" => "s3".to_string(),
            "file" => "file".to_string(),
            "memory" => "memory".to_string(),
            other => {
                return Err(Error::Config(format!(
                    "unsupported storage scheme '{}' in '{}'; expected one of s3, file, memory",
                    other, trimmed
                )))
            }
        };

        let bucket = url.host_str().unwrap_or_default().to_string();
        if scheme == "s3" && bucket.is_empty() {
            return Err(Error::Config(format!(
                "storage location '{}' has no bucket",
                trimmed
            )));
        }

        let prefix = Path::from_url_path(url.path())?;

        Ok(Self {
            uri: trimmed.to_string(),
            scheme,
            bucket,
            prefix,
        })
    }

    /// The URI as supplied
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Normalized scheme (`s3`, `file`, `memory`)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Bucket (URI host); empty for `file://`
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Path of the location inside its store
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Key identifying the object store that serves this location
    pub fn store_key(&self) -> String {
        format!("{}://{}", self.scheme, self.bucket)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// One object store per `scheme://bucket`.
///
/// Stores registered up front win; anything else is built on first use by
/// [`ComponentFactory::create_object_store`] and cached.
#[derive(Default)]
pub struct StoreRegistry {
    stores: DashMap<String, Arc<dyn ObjectStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store for every location sharing `location`'s scheme and bucket
    pub fn register(&self, location: &StorageLocation, store: Arc<dyn ObjectStore>) {
        self.stores.insert(location.store_key(), store);
    }

    /// Register a store by URI, e.g. `memory://bucket`
    pub fn register_url(&self, url: &str, store: Arc<dyn ObjectStore>) -> Result<()> {
        let location = StorageLocation::parse(url)?;
        self.register(&location, store);
        Ok(())
    }

    /// Get (or build) the store serving `location`
    pub fn resolve(&self, location: &StorageLocation) -> Result<Arc<dyn ObjectStore>> {
        let key = location.store_key();
        if let Some(store) = self.stores.get(&key) {
            return Ok(Arc::clone(store.value()));
        }

        let store = ComponentFactory::create_object_store(location)?;
        let entry = self.stores.entry(key).or_insert(store);
        Ok(Arc::clone(entry.value()))
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("StoreRegistry").field("stores", &keys).finish()
    }
}
