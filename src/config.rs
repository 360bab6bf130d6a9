use serde::Deserialize;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use crate::boundary::Boundary;
use crate::error::{Error, Result};
use crate::grid::GridParams;
use crate::request::DEFAULT_ENDPOINT;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 180;

const GRID_CACHE_FILE: &str = "1_matrix_file";
const AGGREGATE_FILE: &str = "geodataframe.geojson";

/// Run configuration, loaded once from a YAML file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name of the run, used as the output subdirectory.
    pub name: String,

    /// Overall bounding box to download.
    pub boundaries: Boundary,

    /// Size of a single grid cell in degrees.
    pub cell_size: f64,

    /// Bounding-box API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum number of requests in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds. Pass 0 to disable the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether to download chunks again that already exist on disk.
    #[serde(default)]
    pub refetch_existing: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_owned()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    /// Reads and validates the YAML configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed reading `{}`: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(raw).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut components = Path::new(&self.name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if self.name.trim().is_empty() || !single_normal {
            return Err(Error::config(format!(
                "name `{}` must be a plain directory name",
                self.name
            )));
        }

        self.boundaries.validate_geographic()?;

        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(Error::config("cell_size must be a positive number"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::config("endpoint must not be empty"));
        }

        Ok(())
    }

    pub fn grid_params(&self) -> GridParams {
        GridParams {
            boundaries: self.boundaries,
            cell_size: self.cell_size,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where a run keeps its files: `<root>/output/<name>/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    output_dir: PathBuf,
}

impl Workspace {
    /// Lays the workspace out below `root` for the run named in `config`.
    pub fn new(root: &Path, config: &Config) -> Self {
        Self {
            output_dir: root.join("output").join(&config.name),
        }
    }

    /// Uses `output_dir` directly as the run's output directory.
    pub fn at(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Lays the workspace out next to the config file, which is where the
    /// tool has always kept its output.
    pub fn beside_config(config_path: &Path, config: &Config) -> Self {
        let root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::new(root, config)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn chunk_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!("chunk_{:04}.osm", index))
    }

    pub fn grid_cache_path(&self) -> PathBuf {
        self.output_dir.join(GRID_CACHE_FILE)
    }

    pub fn aggregate_path(&self) -> PathBuf {
        self.output_dir.join(AGGREGATE_FILE)
    }

    /// Creates the output directory and its parents.
    pub fn create(&self) -> Result<()> {
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(Error::config(format!(
                "output `{}` must be a directory",
                self.output_dir.display()
            )));
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))
    }
}
