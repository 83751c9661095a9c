mod config;
mod report;

use crate::config::Config;
use crate::report::OutputFormat;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use regscan_core::{ReconcileOperation, StorageBackend};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "regscan")]
#[command(about = "Find container registry blobs that no repository links to")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan registry storage and report which blobs are referenced
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Bucket holding the registry data
    #[arg(long, env = "REGISTRY_BUCKET")]
    bucket: Option<String>,

    /// Storage backend: s3 | filesystem
    #[arg(long)]
    backend: Option<String>,

    #[arg(long)]
    region: Option<String>,

    /// Custom S3 endpoint, e.g. a MinIO server
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    allow_http: bool,

    /// Registry directory for the filesystem backend
    #[arg(long)]
    path: Option<String>,

    /// Registry root inside the bucket
    #[arg(long)]
    root: Option<String>,

    /// Concurrent link body fetches
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    page_size: Option<usize>,

    /// Fail the scan when a listing page takes longer than this
    #[arg(long)]
    list_timeout_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Only print unreferenced blobs
    #[arg(long)]
    orphans_only: bool,
}

impl ScanArgs {
    fn apply_overrides(&self, config: &mut Config) -> regscan_core::Result<()> {
        let storage = &mut config.storage;
        if let Some(backend) = &self.backend {
            storage.backend = StorageBackend::parse(backend)?;
        }
        if let Some(bucket) = &self.bucket {
            storage.bucket = Some(bucket.clone());
        }
        if let Some(region) = &self.region {
            storage.region = region.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            storage.endpoint = Some(endpoint.clone());
        }
        if self.allow_http {
            storage.allow_http = true;
        }
        if let Some(path) = &self.path {
            storage.path = Some(path.clone());
        }
        if let Some(root) = &self.root {
            storage.root = root.clone();
        }

        let scan = &mut config.scan;
        if let Some(concurrency) = self.concurrency {
            scan.link_fetch_concurrency = concurrency;
        }
        if let Some(page_size) = self.page_size {
            scan.page_size = page_size;
        }
        if let Some(secs) = self.list_timeout_secs {
            scan.list_timeout_secs = Some(secs);
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regscan_cli=info,regscan_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => {
            if let Err(error) = run_scan(&args).await {
                tracing::error!("Scan failed: {:#}", error);
                std::process::exit(1);
            }
        }
    }
}

async fn run_scan(args: &ScanArgs) -> anyhow::Result<()> {
    let mut cfg = Config::load(args.config.as_deref()).context("failed to load config")?;
    args.apply_overrides(&mut cfg)?;

    let storage_builder = cfg.storage_builder();
    let bucket = storage_builder.resolve_bucket_name()?;
    let storage = storage_builder
        .build()
        .await
        .context("failed to open registry storage")?;

    tracing::info!(
        "Reading docker repository metadata. backend={} bucket={} root={}",
        cfg.storage.backend.as_str(),
        bucket,
        cfg.storage.root
    );

    let result = ReconcileOperation::new(storage)
        .run(cfg.reconcile_request(bucket.clone()))
        .await
        .with_context(|| format!("error reading registry in bucket {}", bucket))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => report::write_text(&mut out, &result.blobs, args.orphans_only)?,
        OutputFormat::Json => report::write_json(&mut out, &bucket, &result, args.orphans_only)?,
    }

    Ok(())
}
