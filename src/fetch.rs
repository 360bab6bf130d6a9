use futures::future;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, sync::Semaphore};
use tracing::{debug, info, warn};

use crate::config::{Config, Workspace, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, NetworkError, Result};
use crate::request::Request;
use crate::transport::Transport;

const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Knobs for [`fetch_all`].
#[derive(Clone, Debug, PartialEq)]
pub struct FetchOptions {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,

    /// Timeout for a single request. Pass the zero duration to disable it.
    pub timeout: Duration,

    /// Whether to download chunks again that already exist on disk.
    pub refetch_existing: bool,

    /// Whether to draw a progress bar on stderr.
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            refetch_existing: false,
            show_progress: false,
        }
    }
}

impl From<&Config> for FetchOptions {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            timeout: config.timeout(),
            refetch_existing: config.refetch_existing,
            show_progress: true,
        }
    }
}

/// What happened to a single fetch task.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchStatus {
    /// Downloaded and written to disk.
    Fetched { bytes: u64 },

    /// The chunk file already existed and no request was made.
    Cached { bytes: u64 },

    /// The request failed; nothing was written.
    Failed(NetworkError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchResult {
    pub index: usize,
    pub path: PathBuf,
    pub status: FetchStatus,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, FetchStatus::Failed(_))
    }
}

/// Per-task outcomes of a batch, in request order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchReport {
    results: Vec<FetchResult>,
}

impl FetchReport {
    pub fn results(&self) -> &[FetchResult] {
        &self.results
    }

    /// Chunk paths of all successful tasks, in request order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn fetched(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, FetchStatus::Fetched { .. }))
            .count()
    }

    pub fn cached(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, FetchStatus::Cached { .. }))
            .count()
    }

    /// The failed tasks as errors, carrying the index to retry.
    pub fn failures(&self) -> Vec<Error> {
        self.results
            .iter()
            .filter_map(|r| match &r.status {
                FetchStatus::Failed(source) => Some(Error::Network {
                    index: r.index,
                    source: source.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Total size of all chunks on disk, downloaded or cached.
    pub fn bytes(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.status {
                FetchStatus::Fetched { bytes } | FetchStatus::Cached { bytes } => bytes,
                FetchStatus::Failed(_) => 0,
            })
            .sum()
    }
}

struct FetchTask<'a> {
    index: usize,
    request: &'a Request,
}

/// Fetches all `requests` and writes each response body to the chunk file
/// named after the request's position.
///
/// All requests are scheduled at once, but at most `options.concurrency` are
/// admitted to the network at any time, in submission order. The report
/// lists one result per request in the original order, regardless of the
/// order in which the requests complete.
///
/// Network failures only fail their own task. A filesystem error aborts the
/// whole batch and drops all outstanding requests.
///
/// # Example
/// ```rust,no_run
/// use osm_grid_downloader::{build_grid, build_requests, fetch_all, FetchOptions, HttpTransport, Workspace};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let grid = build_grid(35.0, 35.08, 138.0, 138.08, 0.04).unwrap();
/// let requests = build_requests("http://overpass-api.de/api/map", &grid);
/// let transport = HttpTransport::new(Duration::from_secs(180)).unwrap();
/// let workspace = Workspace::at("./output/fuji");
/// workspace.create().unwrap();
///
/// let report = fetch_all(&transport, &requests, &workspace, &FetchOptions::default())
///     .await
///     .expect("failed writing chunks");
/// println!("{} of {} chunks available", report.succeeded(), requests.len());
/// # }
/// ```
pub async fn fetch_all<T: Transport>(
    transport: &T,
    requests: &[Request],
    workspace: &Workspace,
    options: &FetchOptions,
) -> Result<FetchReport> {
    if options.concurrency == 0 {
        return Err(Error::config("concurrency must be at least 1"));
    }

    let pb = if options.show_progress {
        let pb = ProgressBar::new(requests.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let gate = Semaphore::new(options.concurrency);
    let tasks = requests.iter().enumerate().map(|(index, request)| {
        fetch_one(
            transport,
            FetchTask { index, request },
            workspace,
            &gate,
            options,
            &pb,
        )
    });

    let results = future::try_join_all(tasks).await;
    pb.finish_and_clear();

    Ok(FetchReport { results: results? })
}

async fn fetch_one<T: Transport>(
    transport: &T,
    task: FetchTask<'_>,
    workspace: &Workspace,
    gate: &Semaphore,
    options: &FetchOptions,
    pb: &ProgressBar,
) -> Result<FetchResult> {
    let path = workspace.chunk_path(task.index);

    // tasks queue on the gate in submission order, so everything before the
    // acquire stays synchronous
    let _permit = match gate.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            pb.inc(1);
            return Ok(FetchResult {
                index: task.index,
                path,
                status: FetchStatus::Failed(NetworkError::Connection(
                    "admission gate closed".to_owned(),
                )),
            });
        }
    };

    if !options.refetch_existing {
        if let Ok(meta) = fs::metadata(&path).await {
            if meta.is_file() {
                info!(index = task.index, path = %path.display(), "chunk already on disk");
                pb.inc(1);
                return Ok(FetchResult {
                    index: task.index,
                    path,
                    status: FetchStatus::Cached { bytes: meta.len() },
                });
            }
        }
    }

    debug!(index = task.index, request = %task.request, "admitted");
    let response = with_timeout(transport.fetch(task.request), options.timeout).await;

    let status = match response {
        Ok(body) => {
            write_chunk(&path, &body).await?;
            info!(index = task.index, bytes = body.len(), "fetched chunk");
            FetchStatus::Fetched {
                bytes: body.len() as u64,
            }
        }
        Err(err) => {
            warn!(index = task.index, url = %task.request.url(), error = %err, "failed fetching chunk");
            FetchStatus::Failed(err)
        }
    };
    pb.inc(1);

    Ok(FetchResult {
        index: task.index,
        path,
        status,
    })
}

async fn with_timeout<F>(fut: F, timeout: Duration) -> Result<Vec<u8>, NetworkError>
where
    F: Future<Output = Result<Vec<u8>, NetworkError>>,
{
    if timeout > ZERO_DURATION {
        tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or(Err(NetworkError::Timeout))
    } else {
        fut.await
    }
}

/// Writes `body` next to `path` first and renames it into place, so that a
/// chunk file on disk is always complete.
async fn write_chunk(path: &Path, body: &[u8]) -> Result<()> {
    let partial = path.with_extension("osm.part");
    fs::write(&partial, body)
        .await
        .map_err(|e| Error::io(&partial, e))?;
    fs::rename(&partial, path)
        .await
        .map_err(|e| Error::io(path, e))
}
