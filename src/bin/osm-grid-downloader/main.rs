mod args;
mod validators;

use anyhow::{Context, Result};
use args::Args;
use osm_grid_downloader::{run, Config, FetchOptions, HttpTransport, Workspace};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let config = Config::load(&args.config_path)
        .with_context(|| format!("failed loading `{}`", args.config_path.display()))?;
    let workspace = Workspace::beside_config(&args.config_path, &config);
    tracing::info!(name = %config.name, output = %workspace.output_dir().display(), "starting run");

    let transport = HttpTransport::new(config.timeout())?;
    let summary = run(&transport, &config, &workspace, &FetchOptions::from(&config))
        .await
        .context("run aborted")?;

    tracing::info!(
        features = summary.features,
        output = %summary.output.display(),
        "run completed"
    );

    Ok(())
}

/// Logs to stderr, filtered by `RUST_LOG` (defaults to `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
