use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{bail, Context};
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mcd_core::{
    models::{EventLog, HeaderSyncLog, StorageDiff},
    storage::CheckedHeadersGateway,
};
use mcd_indexer::{
    cli::{Cli, Command},
    config::ContractsConfig,
    transformer::{registry::TransformerRegistry, ExtractionError},
};
use mcd_storage::postgres::builder::GatewayBuilder;

/// Reads newline delimited JSON records, blank lines are ignored.
fn read_records<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(
            serde_json::from_str(&line)
                .with_context(|| format!("{}:{} is not a valid record", path.display(), n + 1))?,
        );
    }
    Ok(records)
}

async fn ingest_diffs(registry: &TransformerRegistry, path: &Path) -> anyhow::Result<()> {
    let diffs: Vec<StorageDiff> = read_records(path)?;
    let (mut inserted, mut skipped) = (0, 0);
    for diff in diffs.iter() {
        match registry.execute_diff(diff).await {
            Ok(Some(n)) => inserted += n,
            Ok(None) => skipped += 1,
            Err(ExtractionError::Decode(err)) => {
                warn!(block = diff.block_height, %err, "DiffSkipped");
                skipped += 1;
            }
            Err(err) => return Err(err).context(format!("Diff at block {}", diff.block_height)),
        }
    }
    info!(n_diffs = diffs.len(), inserted, skipped, "DiffsIngested");
    Ok(())
}

async fn ingest_logs(registry: &TransformerRegistry, path: &Path) -> anyhow::Result<()> {
    let records: Vec<HeaderSyncLog> = read_records(path)?;
    let mut by_header: BTreeMap<i64, Vec<EventLog>> = BTreeMap::new();
    for record in records {
        by_header
            .entry(record.header_id)
            .or_default()
            .push(record.log);
    }
    info!(labels = ?registry.labels(), n_headers = by_header.len(), "TransformingLogs");
    let mut failed = Vec::new();
    for (header_id, logs) in by_header.iter() {
        match registry.execute_logs(*header_id, logs).await {
            Ok(n) => info!(header_id, n_facts = n, "HeaderTransformed"),
            Err(err) => {
                warn!(header_id, %err, "HeaderNotChecked");
                failed.push(*header_id);
            }
        }
    }
    if !failed.is_empty() {
        bail!("{} of {} headers failed: {:?}", failed.len(), by_header.len(), failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    let args = cli.args();

    info!("Starting mcd-indexer");

    let gateway = GatewayBuilder::new(&args.database_url)
        .set_recheck_cap(args.recheck_cap)
        .build()
        .await?;

    match cli.command() {
        Command::IngestDiffs(ingest) => {
            let config = ContractsConfig::load(&args.contracts_config)?;
            let registry = TransformerRegistry::build(&config, gateway)?;
            ingest_diffs(&registry, &ingest.file).await?;
        }
        Command::IngestLogs(ingest) => {
            let config = ContractsConfig::load(&args.contracts_config)?;
            let registry = TransformerRegistry::build(&config, gateway)?;
            ingest_logs(&registry, &ingest.file).await?;
        }
        Command::MissingHeaders(range) => {
            let headers = gateway
                .missing_headers(&range.label, range.from, range.to)
                .await?;
            println!("{}", serde_json::to_string_pretty(&headers)?);
        }
        Command::RecheckHeaders(range) => {
            let headers = gateway
                .recheck_headers(&range.label, range.from, range.to)
                .await?;
            println!("{}", serde_json::to_string_pretty(&headers)?);
        }
    }
    Ok(())
}
