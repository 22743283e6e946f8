//! datalog-convert - forwards datalog DAT archives to a process historian
//!
//! # Usage
//!
//! ```bash
//! # Convert every archive pair in a directory
//! datalog-convert --path "D:/Datalog/Line 3" --host pi-server --process-name line3
//!
//! # Rename tags on the way (unmapped tags are not forwarded)
//! datalog-convert --path ./archives --tag-map tags.csv --debug
//!
//! # Decode and resolve without touching a historian
//! datalog-convert --path ./archives --dry-run
//! ```

use anyhow::Result;
use clap::Parser;
use datalog_convert::config::{HistorianBackend, Settings};
use datalog_convert::dat::DatDirectory;
use datalog_convert::historian::csv_store::CsvHistorian;
use datalog_convert::historian::memory::MemoryHistorian;
use datalog_convert::historian::{Historian, HistorianConnection};
use datalog_convert::logging::{self, TracingConfig};
use datalog_convert::pipeline::{Pipeline, PipelineOptions, RunSummary};
use datalog_convert::points::PointResolver;
use datalog_convert::tag_map::TagMap;
use datalog_convert::{AppResult, ConvertError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "datalog-convert")]
#[command(about = "Decode datalog DAT archives and forward their values to a historian", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the "(Float)" and "(Tagname)" archives
    #[arg(long)]
    path: Option<PathBuf>,

    /// Historian host
    #[arg(long)]
    host: Option<String>,

    /// Name this writer registers under at the historian
    #[arg(long)]
    process_name: Option<String>,

    /// Two-column CSV mapping logger tag names to historian point names
    #[arg(long)]
    tag_map: Option<PathBuf>,

    /// Log every decoded tag and resolved point
    #[arg(long)]
    debug: bool,

    /// Configuration file (default: config/datalog.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Historian backend
    #[arg(long, value_enum)]
    backend: Option<HistorianBackend>,

    /// Point table for the csv backend
    #[arg(long)]
    points_file: Option<PathBuf>,

    /// Snapshot output directory for the csv backend
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Archive pairs decoded concurrently
    #[arg(long)]
    decode_workers: Option<usize>,

    /// Concurrent historian writes
    #[arg(long)]
    writer_workers: Option<usize>,

    /// Use an in-memory historian that accepts every point
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.path {
            settings.source.path = Some(path.clone());
        }
        if let Some(host) = &self.host {
            settings.historian.host = host.clone();
        }
        if let Some(name) = &self.process_name {
            settings.historian.process_name = name.clone();
        }
        if let Some(tag_map) = &self.tag_map {
            settings.tag_map = Some(tag_map.clone());
        }
        if self.debug {
            settings.application.log_level = "debug".to_string();
        }
        if let Some(backend) = self.backend {
            settings.historian.backend = backend;
        }
        if self.dry_run {
            settings.historian.backend = HistorianBackend::Memory;
        }
        if let Some(points_file) = &self.points_file {
            settings.historian.points_file = points_file.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            settings.historian.output_dir = output_dir.clone();
        }
        if let Some(n) = self.decode_workers {
            settings.pipeline.decode_workers = n;
        }
        if let Some(n) = self.writer_workers {
            settings.pipeline.writer_workers = n;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    cli.apply(&mut settings);
    settings.validate()?;

    let tracing_config = TracingConfig::from_settings(&settings).map_err(anyhow::Error::msg)?;
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    match run(&settings).await {
        Ok(summary) => {
            if summary.failed() > 0 {
                warn!(failed = summary.failed(), "some archive pairs were not fully written");
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "conversion aborted");
            Err(e.into())
        }
    }
}

async fn run(settings: &Settings) -> AppResult<RunSummary> {
    let root = settings
        .source
        .path
        .clone()
        .ok_or_else(|| ConvertError::Setup("no input directory given (use --path)".into()))?;
    let listing = DatDirectory::scan(&root, &settings.source.naming())?;
    info!(root = %listing.root().display(), pairs = listing.pairs().len(), "found archives");

    let tag_map = match &settings.tag_map {
        Some(path) => {
            let map = TagMap::load(path).map_err(|e| {
                ConvertError::Setup(format!("failed to load tag map {}: {e}", path.display()))
            })?;
            if map.is_empty() {
                return Err(ConvertError::Setup(format!(
                    "tag map {} has no entries",
                    path.display()
                )));
            }
            Some(Arc::new(map))
        }
        None => None,
    };

    let historian = &settings.historian;
    let backend: Arc<dyn Historian> = match historian.backend {
        HistorianBackend::Csv => Arc::new(CsvHistorian::new(
            historian.points_file.clone(),
            historian.output_dir.clone(),
        )),
        HistorianBackend::Memory => Arc::new(MemoryHistorian::accepting_all()),
    };
    let connection = HistorianConnection::new(
        backend,
        historian.call_timeout(),
        historian.benign_error_codes.clone(),
    );
    connection
        .connect(&historian.host, &historian.process_name)
        .await
        .map_err(|e| {
            ConvertError::Setup(format!(
                "failed to connect to historian at {}: {e}",
                historian.host
            ))
        })?;
    info!(
        host = %historian.host,
        process = %historian.process_name,
        backend = ?historian.backend,
        "connected to historian"
    );

    let resolver = Arc::new(PointResolver::new(
        connection.clone(),
        historian.max_point_name_len,
    ));
    let pipeline = Pipeline::new(
        connection.clone(),
        resolver,
        tag_map,
        PipelineOptions::from(&settings.pipeline),
    );
    let summary = pipeline.run(listing.into_pairs()).await;
    summary.log();

    if let Err(e) = connection.disconnect().await {
        warn!(error = %e, "historian disconnect failed");
    }
    Ok(summary)
}
