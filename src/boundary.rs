use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A rectangular region given by its latitude and longitude extents in degrees.
///
/// Both the overall bounding box of a run and every grid cell are boundaries.
/// The invariants `lat_min < lat_max` and `long_min < long_max` hold for every
/// constructed value, including deserialized ones.
///
/// # Example
/// ```rust
/// # use osm_grid_downloader::Boundary;
/// let ozinki = Boundary::new(51.15, 51.23, 49.65, 49.75).unwrap();
/// assert!(ozinki.lat_span() > 0.0);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundary")]
pub struct Boundary {
    lat_min: f64,
    lat_max: f64,
    long_min: f64,
    long_max: f64,
}

#[derive(Deserialize)]
struct RawBoundary {
    lat_min: f64,
    lat_max: f64,
    long_min: f64,
    long_max: f64,
}

impl TryFrom<RawBoundary> for Boundary {
    type Error = Error;

    fn try_from(raw: RawBoundary) -> Result<Self> {
        Self::new(raw.lat_min, raw.lat_max, raw.long_min, raw.long_max)
    }
}

impl Boundary {
    /// Creates a new boundary from coordinates specified in degrees.
    ///
    /// Fails with a configuration error if any value is not finite or if an
    /// extent is empty or inverted.
    pub fn new(lat_min: f64, lat_max: f64, long_min: f64, long_max: f64) -> Result<Self> {
        if ![lat_min, lat_max, long_min, long_max]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(Error::config("boundary coordinates must be finite"));
        }
        if lat_min >= lat_max {
            return Err(Error::config(format!(
                "lat_min ({}) must be less than lat_max ({})",
                lat_min, lat_max
            )));
        }
        if long_min >= long_max {
            return Err(Error::config(format!(
                "long_min ({}) must be less than long_max ({})",
                long_min, long_max
            )));
        }

        Ok(Boundary {
            lat_min,
            lat_max,
            long_min,
            long_max,
        })
    }

    pub fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_max
    }

    pub fn long_min(&self) -> f64 {
        self.long_min
    }

    pub fn long_max(&self) -> f64 {
        self.long_max
    }

    pub fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    pub fn long_span(&self) -> f64 {
        self.long_max - self.long_min
    }

    /// Checks that the boundary lies within valid geographic ranges
    /// (latitude in [-90, 90], longitude in [-180, 180]).
    pub fn validate_geographic(&self) -> Result<()> {
        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);
        let long_ok = |v: f64| (-180.0..=180.0).contains(&v);

        if !lat_ok(self.lat_min) || !lat_ok(self.lat_max) {
            return Err(Error::config("latitudes must be within [-90°, 90°]"));
        }
        if !long_ok(self.long_min) || !long_ok(self.long_max) {
            return Err(Error::config("longitudes must be within [-180°, 180°]"));
        }

        Ok(())
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}] x [{:.4}, {:.4}]",
            self.lat_min, self.lat_max, self.long_min, self.long_max
        )
    }
}
