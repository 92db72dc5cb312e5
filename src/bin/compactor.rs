//! Partcompact Compactor Binary
//!
//! Compacts the small files of one partitioned table and exits. The exit
//! status reports which stage failed.

use partcompact::catalog::{MetadataResolver, TableReference};
use partcompact::compactor::{CompactionRequest, Compactor};
use partcompact::config::ComponentFactory;
use partcompact::engine::HiveParquetEngine;
use partcompact::storage::StoreRegistry;
use partcompact::telemetry::Telemetry;
use partcompact::Result;

use clap::Parser;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Partition-aware small-file compaction
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Job identity, attached to every log line of the run
    #[arg(long, env = "JOB_NAME")]
    job_name: String,

    /// Source database name
    #[arg(long, env = "SOURCE_DB_NAME")]
    source_db_name: String,

    /// Source table name
    #[arg(long, env = "SOURCE_TABLE_NAME")]
    source_table_name: String,

    /// Maximum records per output file
    #[arg(long, env = "MAX_RECORDS_PER_FILE")]
    max_records_per_file: NonZeroUsize,

    /// Push-down predicate over partition columns; blank means the full table
    #[arg(long, env = "PUSH_DOWN_PREDICATE")]
    push_down_predicate: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _telemetry = match Telemetry::init_for_component("partcompact-compactor", &args.log_level)
    {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("partcompact-compactor: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "Exiting after failed compaction");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let table = TableReference::new(args.source_db_name, args.source_table_name)?;
    let request = CompactionRequest::new(args.job_name, table, args.max_records_per_file)
        .with_predicate(args.push_down_predicate);

    let stores = Arc::new(StoreRegistry::new());
    let catalog = ComponentFactory::create_catalog_client(&stores)?;
    let engine = Arc::new(HiveParquetEngine::new(Arc::clone(&stores)));
    let compactor = Compactor::new(MetadataResolver::new(catalog), engine);

    let summary = compactor.run(&request).await?;
    info!(
        job = %summary.job_name,
        table = %summary.table,
        partitions = summary.partitions_written,
        files = summary.files_written,
        records = summary.records_written,
        "Compaction job finished"
    );
    Ok(())
}
