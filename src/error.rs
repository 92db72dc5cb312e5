//! Error types for partcompact

use std::fmt;

/// Result type alias for partcompact operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for partcompact
#[derive(Debug)]
pub enum Error {
    /// Arrow-related errors
    Arrow(arrow::error::ArrowError),
    /// Parquet-related errors
    Parquet(parquet::errors::ParquetError),
    /// Object store errors
    ObjectStore(object_store::Error),
    /// DataFusion errors
    DataFusion(datafusion::error::DataFusionError),
    /// IO errors
    Io(std::io::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Invalid schema
    InvalidSchema(String),
    /// Catalog unreachable or table missing
    CatalogLookup { database: String, table: String, reason: String },
    /// Catalog answered with something that cannot be turned into table metadata
    MalformedCatalog { database: String, table: String, reason: String },
    /// Table has no partition keys
    NoPartitions { database: String, table: String },
    /// Table has no storage location
    MissingLocation { database: String, table: String },
    /// Nothing left to compact after loading
    EmptyDataset { database: String, table: String },
    /// Engine failure while loading records
    Load(String),
    /// Failure while materializing compacted output
    Write(String),
}

impl Error {
    /// Process exit code for this error kind. Always non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 2,
            Error::CatalogLookup { .. } | Error::MalformedCatalog { .. } => 3,
            Error::NoPartitions { .. } | Error::MissingLocation { .. } => 4,
            Error::EmptyDataset { .. } => 5,
            Error::Load(_) => 6,
            Error::Write(_) => 7,
            _ => 1,
        }
    }

    /// Reclassify an error raised while loading as a load failure.
    pub(crate) fn into_load(self) -> Self {
        match self {
            e @ Error::Load(_) => e,
            other => Error::Load(other.to_string()),
        }
    }

    /// Reclassify an error raised while writing as a write failure.
    pub(crate) fn into_write(self) -> Self {
        match self {
            e @ Error::Write(_) => e,
            other => Error::Write(other.to_string()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Arrow(e) => Some(e),
            Error::Parquet(e) => Some(e),
            Error::ObjectStore(e) => Some(e),
            Error::DataFusion(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arrow(e) => write!(f, "Arrow error: {}", e),
            Error::Parquet(e) => write!(f, "Parquet error: {}", e),
            Error::ObjectStore(e) => write!(f, "Object store error: {}", e),
            Error::DataFusion(e) => write!(f, "DataFusion error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidSchema(msg) => write!(f, "Invalid schema: {}", msg),
            Error::CatalogLookup {
                database,
                table,
                reason,
            } => write!(f, "Catalog lookup failed for {}.{}: {}", database, table, reason),
            Error::MalformedCatalog {
                database,
                table,
                reason,
            } => write!(
                f,
                "Malformed catalog response for {}.{}: {}",
                database, table, reason
            ),
            Error::NoPartitions { database, table } => {
                write!(f, "Compaction failed as {}.{} has no partitions", database, table)
            }
            Error::MissingLocation { database, table } => {
                write!(f, "External location for {}.{} is empty", database, table)
            }
            Error::EmptyDataset { database, table } => {
                write!(f, "Empty dataset for {}.{} cannot be compacted", database, table)
            }
            Error::Load(msg) => write!(f, "Load error: {}", msg),
            Error::Write(msg) => write!(f, "Write error: {}", msg),
        }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(e: arrow::error::ArrowError) -> Self {
        Error::Arrow(e)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Error::Parquet(e)
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        Error::ObjectStore(e)
    }
}

impl From<object_store::path::Error> for Error {
    fn from(e: object_store::path::Error) -> Self {
        Error::ObjectStore(e.into())
    }
}

impl From<datafusion::error::DataFusionError> for Error {
    fn from(e: datafusion::error::DataFusionError) -> Self {
        Error::DataFusion(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
