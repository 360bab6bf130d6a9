use std::path::PathBuf;
use tracing::{info, warn};

use crate::aggregate::{AggregateStats, Aggregator};
use crate::config::{Config, Workspace};
use crate::error::Result;
use crate::fetch::{fetch_all, FetchOptions, FetchReport};
use crate::grid_cache::get_or_build_grid;
use crate::request::build_requests;
use crate::transport::Transport;

/// What a complete run produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub cells: usize,
    pub fetch: FetchReport,
    pub aggregate: AggregateStats,
    pub features: usize,
    pub output: PathBuf,
}

/// Runs the whole pipeline for `config`: grid, requests, fetch, aggregate.
pub async fn run<T: Transport>(
    transport: &T,
    config: &Config,
    workspace: &Workspace,
    options: &FetchOptions,
) -> Result<RunSummary> {
    workspace.create()?;

    let grid = get_or_build_grid(&config.grid_params(), &workspace.grid_cache_path())?;
    let requests = build_requests(&config.endpoint, &grid);
    info!(
        rows = grid.rows(),
        cols = grid.cols(),
        "built {} requests, starting download",
        requests.len()
    );

    let fetch = fetch_all(transport, &requests, workspace, options).await?;
    for failure in fetch.failures() {
        warn!("{}", failure);
    }
    info!(
        fetched = fetch.fetched(),
        cached = fetch.cached(),
        failed = fetch.failed(),
        "download completed, aggregating chunks"
    );

    let aggregator = Aggregator::new(workspace);
    let aggregate = if fetch.failed() == 0 {
        aggregator.aggregate(&fetch.paths())?
    } else {
        warn!(
            failed = fetch.failed(),
            "download incomplete, not saving the aggregate until every chunk is available"
        );
        aggregator.aggregate_incomplete(&fetch.paths())?
    };

    let summary = RunSummary {
        cells: grid.len(),
        features: aggregate.dataset.len(),
        aggregate: aggregate.stats,
        output: aggregator.output().to_path_buf(),
        fetch,
    };

    info!(
        "{} of {} chunks available ({}), {} merged, {} skipped, {} features in {}",
        summary.fetch.succeeded(),
        summary.cells,
        pretty_bytes::converter::convert(summary.fetch.bytes() as f64),
        summary.aggregate.merged,
        summary.aggregate.skipped(),
        summary.features,
        summary.output.display(),
    );

    Ok(summary)
}
