use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::chunk::{parse_chunk, ChunkOutcome};
use crate::config::Workspace;
use crate::dataset::Dataset;
use crate::error::{Error, Result};

/// Counters describing how an aggregate came to be.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Chunks handed to the parser.
    pub parsed: usize,

    /// Chunks that contributed to the aggregate.
    pub merged: usize,

    /// Chunks skipped because they held no features.
    pub empty: usize,

    /// Chunks skipped because they couldn't be parsed.
    pub malformed: usize,

    /// Whether the aggregate was loaded from a previous run.
    pub from_cache: bool,
}

impl AggregateStats {
    pub fn skipped(&self) -> usize {
        self.empty + self.malformed
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub dataset: Dataset,
    pub stats: AggregateStats,
}

/// Folds chunk files into a single dataset stored in the workspace.
#[derive(Clone, Debug)]
pub struct Aggregator {
    output: PathBuf,
}

impl Aggregator {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            output: workspace.aggregate_path(),
        }
    }

    /// Path the aggregate is persisted to.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Returns the aggregate of `chunk_paths`.
    ///
    /// If an aggregate file exists it is loaded and no chunk is looked at.
    /// Otherwise every chunk is parsed in order; the first chunk with features
    /// seeds the aggregate and later ones are merged into it. Empty and
    /// malformed chunks are logged and skipped. The result is written to the
    /// aggregate file before it is returned.
    pub fn aggregate(&self, chunk_paths: &[PathBuf]) -> Result<Aggregate> {
        if let Some(cached) = self.load()? {
            return Ok(cached);
        }

        let aggregate = self.build(chunk_paths)?;
        info!(
            path = %self.output.display(),
            features = aggregate.dataset.len(),
            "saving aggregate"
        );
        aggregate.dataset.save(&self.output)?;

        Ok(aggregate)
    }

    /// Like [`aggregate`](Self::aggregate), but never writes the aggregate
    /// file. Used while chunks are still missing, so that the run which
    /// completes the download builds the aggregate from every chunk.
    pub fn aggregate_incomplete(&self, chunk_paths: &[PathBuf]) -> Result<Aggregate> {
        match self.load()? {
            Some(cached) => Ok(cached),
            None => self.build(chunk_paths),
        }
    }

    fn load(&self) -> Result<Option<Aggregate>> {
        if !self.output.exists() {
            return Ok(None);
        }

        info!(path = %self.output.display(), "loading aggregate from file");
        let dataset = Dataset::load(&self.output)?;
        Ok(Some(Aggregate {
            dataset,
            stats: AggregateStats {
                from_cache: true,
                ..AggregateStats::default()
            },
        }))
    }

    fn build(&self, chunk_paths: &[PathBuf]) -> Result<Aggregate> {
        let mut stats = AggregateStats::default();
        let mut aggregate: Option<Dataset> = None;

        for (i, path) in chunk_paths.iter().enumerate() {
            info!(
                "processing chunk file {} of {}: {}",
                i + 1,
                chunk_paths.len(),
                path.display()
            );

            let text = read_chunk(path)?;
            stats.parsed += 1;

            match parse_chunk(&text) {
                ChunkOutcome::Parsed(dataset) => {
                    stats.merged += 1;
                    match aggregate.as_mut() {
                        Some(agg) => {
                            let added = agg.merge(dataset);
                            info!(added, total = agg.len(), "merged chunk");
                        }
                        None => {
                            info!(total = dataset.len(), "seeded aggregate");
                            aggregate = Some(dataset);
                        }
                    }
                }
                ChunkOutcome::Empty => {
                    stats.empty += 1;
                    let err = Error::EmptyChunk { path: path.clone() };
                    warn!("{}, skipping", err);
                }
                ChunkOutcome::ParseFailure(reason) => {
                    stats.malformed += 1;
                    let err = Error::ChunkParse {
                        path: path.clone(),
                        reason,
                    };
                    warn!("{}, skipping", err);
                }
            }
        }

        Ok(Aggregate {
            dataset: aggregate.unwrap_or_default(),
            stats,
        })
    }
}

/// Reads a chunk as text. Invalid UTF-8 is replaced rather than rejected so
/// that the parser gets to classify the chunk.
fn read_chunk(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
