use anyhow::{Context, Result};
use assetimport::{config::Settings, pipeline, profile::ImportProfile};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Load asset, repair and pegging extracts into the reporting database"
)]
struct Args {
    /// Built-in profile (assets, asset-repair, pegging) or a profile YAML file
    profile: String,
    /// Source file; defaults to the profile's file under the data directory
    path: Option<PathBuf>,
    /// Settings file (defaults to ./assetimport.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Where to write the error artifact
    #[arg(long)]
    error_log: Option<PathBuf>,
}

fn load_profile(arg: &str) -> Result<ImportProfile> {
    let path = Path::new(arg);
    let looks_like_file = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    if looks_like_file || path.is_file() {
        ImportProfile::from_file(path).with_context(|| format!("loading profile {}", arg))
    } else {
        Ok(ImportProfile::builtin(arg)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    dotenvy::dotenv().ok();
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,assetimport=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) resolve profile & settings ───────────────────────────────
    let args = Args::parse();
    let profile = load_profile(&args.profile)?;

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }
    if let Some(n) = args.batch_size {
        anyhow::ensure!(n > 0, "--batch-size must be at least 1");
        settings.batch_size = Some(n);
    }
    if args.error_log.is_some() {
        settings.error_log = args.error_log;
    }
    info!(
        profile = %profile.name,
        table = %profile.table,
        database = %settings.database_url,
        "startup"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let outcome = pipeline::run_import(&profile, &settings, args.path.as_deref()).await?;
    println!(
        "processed: {}  succeeded: {}  failed: {}",
        outcome.summary.total_processed,
        outcome.summary.total_succeeded,
        outcome.summary.total_failed
    );
    Ok(())
}
