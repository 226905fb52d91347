use anyhow::Result;
use clap::Parser;
use parkstats::{config, extract, load, transform};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Quarterly park-crime ETL: spreadsheets in, star schema out.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML config holding the source directory and warehouse path.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured source directory.
    #[arg(long)]
    source_dir: Option<PathBuf>,
}

fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("etl failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = config::load(&args.config)?;
    if let Some(dir) = args.source_dir {
        cfg.source_dir = dir;
    }
    info!(
        "startup: {} -> {}",
        cfg.source_dir.display(),
        cfg.database.display()
    );

    // ─── 2) extract ──────────────────────────────────────────────────
    let crime = extract::extract_all(&cfg.source_dir)?;
    info!("extraction complete: {} row(s)", crime.len());

    // ─── 3) transform ────────────────────────────────────────────────
    let crime = transform::transform(crime)?;
    info!("transformation complete");

    // ─── 4) load; the connection closes on every exit path ───────────
    let warehouse = load::Warehouse::open(&cfg.database)?;
    load::load(&warehouse, &crime)?;

    info!("all done");
    Ok(())
}
