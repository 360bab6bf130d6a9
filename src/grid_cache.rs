use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::grid::{Grid, GridParams};

/// On-disk representation of a cached grid.
#[derive(Serialize, Deserialize)]
struct GridCacheFile {
    params: GridParams,
    grid: Grid,
}

/// Returns the grid stored at `cache_path`, building and storing it first if
/// the file doesn't exist yet.
///
/// An existing cache file is returned as-is, even if it was built from
/// different parameters. A mismatch is only logged; delete the file to
/// rebuild.
pub fn get_or_build_grid(params: &GridParams, cache_path: &Path) -> Result<Grid> {
    if cache_path.exists() {
        let (stored, grid) = load_grid(cache_path)?;
        if stored != *params {
            warn!(
                path = %cache_path.display(),
                "cached grid was built from different boundaries or cell size; delete the file to rebuild",
            );
        }
        info!(rows = grid.rows(), cols = grid.cols(), "loaded grid from cache");
        return Ok(grid);
    }

    let grid = params.build()?;
    save_grid(params, &grid, cache_path)?;
    info!(rows = grid.rows(), cols = grid.cols(), "built grid");

    Ok(grid)
}

/// Serializes `grid` together with the parameters it was built from.
pub fn save_grid(params: &GridParams, grid: &Grid, cache_path: &Path) -> Result<()> {
    let file = fs::File::create(cache_path).map_err(|e| Error::io(cache_path, e))?;
    let cached = GridCacheFile {
        params: *params,
        grid: grid.clone(),
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &cached).map_err(|e| Error::io(cache_path, e.into()))?;
    writer.flush().map_err(|e| Error::io(cache_path, e))?;
    debug!(path = %cache_path.display(), "saved grid cache");

    Ok(())
}

/// Loads a grid cache file, failing with [`Error::CacheCorrupt`] if it can't
/// be decoded.
pub fn load_grid(cache_path: &Path) -> Result<(GridParams, Grid)> {
    let bytes = fs::read(cache_path).map_err(|e| Error::corrupt(cache_path, e))?;
    let cached: GridCacheFile =
        serde_json::from_slice(&bytes).map_err(|e| Error::corrupt(cache_path, e))?;

    if !cached.grid.is_consistent() {
        return Err(Error::corrupt(
            cache_path,
            "grid dimensions don't match its cells",
        ));
    }

    Ok((cached.params, cached.grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::Boundary;

    fn params(lat_max: f64, cell_size: f64) -> GridParams {
        GridParams {
            boundaries: Boundary::new(35.0, lat_max, 138.0, 138.08).unwrap(),
            cell_size,
        }
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_matrix_file");
        let params = params(35.12, 0.04);
        let grid = params.build().unwrap();
        assert!(grid.rows() >= 2 && grid.cols() >= 2);

        save_grid(&params, &grid, &path).unwrap();
        let (stored, loaded) = load_grid(&path).unwrap();

        assert_eq!(stored, params);
        assert_eq!(loaded, grid);
    }

    #[test]
    fn builds_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_matrix_file");

        let first = get_or_build_grid(&params(35.08, 0.04), &path).unwrap();
        assert!(path.exists());

        // a stale cache masks the new parameters
        let second = get_or_build_grid(&params(35.2, 0.01), &path).unwrap();
        assert_eq!(first, second);
        assert_eq!((second.rows(), second.cols()), (2, 2));
    }

    #[test]
    fn corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_matrix_file");
        fs::write(&path, b"\x00\x01 not json").unwrap();

        let err = get_or_build_grid(&params(35.08, 0.04), &path).unwrap_err();
        assert!(matches!(err, Error::CacheCorrupt { .. }));
    }

    #[test]
    fn inconsistent_shape_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_matrix_file");
        let json = r#"{
            "params": {
                "boundaries": {"lat_min": 0.0, "lat_max": 1.0, "long_min": 0.0, "long_max": 1.0},
                "cell_size": 0.5
            },
            "grid": {"rows": 2, "cols": 2, "cells": []}
        }"#;
        fs::write(&path, json).unwrap();

        assert!(matches!(
            load_grid(&path).unwrap_err(),
            Error::CacheCorrupt { .. }
        ));
    }
}
