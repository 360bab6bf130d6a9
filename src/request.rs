use reqwest::Method;
use std::fmt;

use crate::boundary::Boundary;
use crate::grid::Grid;

/// The public Overpass map endpoint, returning raw OSM XML for a bounding box.
pub const DEFAULT_ENDPOINT: &str = "http://overpass-api.de/api/map";

/// A fully formed request for the data inside one grid cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,

    /// Bounding box in `left,bottom,right,top` order, 4 decimal places each.
    pub bbox: String,
}

impl Request {
    pub fn url(&self) -> String {
        format!("{}?bbox={}", self.endpoint, self.bbox)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url())
    }
}

/// Maps a cell to the request fetching its data.
pub fn build_request(endpoint: &str, cell: &Boundary) -> Request {
    Request {
        method: Method::GET,
        endpoint: endpoint.trim_end_matches('?').to_owned(),
        bbox: format!(
            "{:.4},{:.4},{:.4},{:.4}",
            cell.long_min(),
            cell.lat_min(),
            cell.long_max(),
            cell.lat_max(),
        ),
    }
}

/// Builds one request per cell in row-major grid order.
pub fn build_requests(endpoint: &str, grid: &Grid) -> Vec<Request> {
    grid.iter().map(|cell| build_request(endpoint, cell)).collect()
}
