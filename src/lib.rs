//! Download OpenStreetMap data over a bounding-box grid and aggregate it into
//! a single GeoJSON dataset.
//!
//! **Use with caution.** The public Overpass instances are shared resources;
//! keep the concurrency low and the grid small.
//!
//! # Usage
//!
//! The CLI reads a YAML configuration (`./config.yaml` unless `--config` is
//! given):
//!
//! ```yaml
//! name: fuji
//! boundaries:
//!   lat_min: 35.0
//!   lat_max: 35.08
//!   long_min: 138.0
//!   long_max: 138.08
//! cell_size: 0.04
//! ```
//!
//! Next to the configuration file it writes the raw chunks
//! `output/fuji/chunk_NNNN.osm`, the grid cache `1_matrix_file` and the
//! aggregate `geodataframe.geojson`. Every step is cached on disk, so
//! re-running only fetches what is missing.
//!
//! # Library Example
//! ```rust,no_run
//! use osm_grid_downloader::{run, Config, FetchOptions, HttpTransport, Workspace};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config_path = Path::new("config.yaml");
//! let config = Config::load(config_path).expect("invalid configuration");
//! let workspace = Workspace::beside_config(config_path, &config);
//! let transport = HttpTransport::new(config.timeout()).unwrap();
//!
//! let summary = run(&transport, &config, &workspace, &FetchOptions::from(&config))
//!     .await
//!     .expect("failed fetching chunks");
//! println!("{} features", summary.features);
//! # }
//! ```

mod aggregate;
mod boundary;
mod chunk;
mod config;
mod dataset;
mod error;
mod fetch;
mod grid;
mod grid_cache;
mod request;
mod run;
mod transport;

pub use aggregate::{Aggregate, AggregateStats, Aggregator};
pub use boundary::Boundary;
pub use chunk::{parse_chunk, ChunkOutcome};
pub use config::{Config, Workspace, DEFAULT_CONCURRENCY};
pub use dataset::Dataset;
pub use error::{Error, NetworkError, Result};
pub use fetch::{fetch_all, FetchOptions, FetchReport, FetchResult, FetchStatus};
pub use grid::{build_grid, Grid, GridParams, MAX_CELLS};
pub use grid_cache::{get_or_build_grid, load_grid, save_grid};
pub use request::{build_request, build_requests, Request, DEFAULT_ENDPOINT};
pub use run::{run, RunSummary};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_to_requests() {
        let grid = build_grid(35.0, 35.08, 138.0, 138.08, 0.04).unwrap();
        let requests = build_requests(DEFAULT_ENDPOINT, &grid);

        assert_eq!(requests.len(), 4);
        assert_eq!(
            requests[3].url(),
            "http://overpass-api.de/api/map?bbox=138.0400,35.0400,138.0800,35.0800"
        );
    }

    #[test]
    #[should_panic]
    fn grid_rejects_zero_cell_size() {
        build_grid(35.0, 35.08, 138.0, 138.08, 0.0).unwrap();
    }
}
