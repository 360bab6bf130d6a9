#![allow(dead_code)]

use osm_grid_downloader::{NetworkError, Request, Transport};
use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tracing::{subscriber::DefaultGuard, Level};
use tracing_subscriber::fmt::MakeWriter;

pub const ENDPOINT: &str = "http://overpass.test/api/map";

/// A well-formed chunk for the cell described by `bbox`: one tagged node
/// unique to the cell, plus a node shared by every cell.
pub fn osm_for_bbox(bbox: &str) -> String {
    let coords: Vec<f64> = bbox.split(',').map(|v| v.parse().unwrap()).collect();
    let (left, bottom) = (coords[0], coords[1]);
    let id = (left * 10_000.0).round() as i64 * 10_000_000 + (bottom * 10_000.0).round() as i64;

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="fake">
  <node id="1" lat="35.04" lon="138.04">
    <tag k="place" v="shared"/>
  </node>
  <node id="{id}" lat="{lat}" lon="{lon}">
    <tag k="amenity" v="bench"/>
  </node>
</osm>
"#,
        id = id,
        lat = bottom + 0.001,
        lon = left + 0.001,
    )
}

pub const EMPTY_OSM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="fake">
  <note>The data included in this document is from www.openstreetmap.org.</note>
</osm>
"#;

/// Answers every request with a valid chunk after `delay`, tracking how many
/// requests are in flight at once.
#[derive(Default)]
pub struct CountingTransport {
    pub delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for CountingTransport {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(osm_for_bbox(&request.bbox).into_bytes())
    }
}

/// Delays each request by a per-URL duration and records completion order.
pub struct ReorderingTransport {
    delays: HashMap<String, Duration>,
    pub completed: Mutex<Vec<String>>,
}

impl ReorderingTransport {
    /// Makes the first request finish last and the last request first.
    pub fn reversed(requests: &[Request], step: Duration) -> Self {
        let n = requests.len() as u32;
        let delays = requests
            .iter()
            .enumerate()
            .map(|(i, r)| (r.url(), step * (n - i as u32)))
            .collect();

        Self {
            delays,
            completed: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for ReorderingTransport {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, NetworkError> {
        let delay = self.delays.get(&request.url()).copied().unwrap_or_default();
        tokio::time::sleep(delay).await;

        self.completed.lock().unwrap().push(request.bbox.clone());
        Ok(request.bbox.clone().into_bytes())
    }
}

/// Fails the requests for the given bboxes, answers all others.
pub struct FailingTransport {
    pub failing: HashSet<String>,
    pub error: NetworkError,
}

impl Transport for FailingTransport {
    async fn fetch(&self, request: &Request) -> Result<Vec<u8>, NetworkError> {
        if self.failing.contains(&request.bbox) {
            return Err(self.error.clone());
        }
        Ok(osm_for_bbox(&request.bbox).into_bytes())
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledTransport;

impl Transport for StalledTransport {
    async fn fetch(&self, _request: &Request) -> Result<Vec<u8>, NetworkError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

pub struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(Arc::clone(&self.0))
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Lines at `level` whose text contains `needle`.
    pub fn matching(&self, level: &str, needle: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.contains(level) && l.contains(needle))
            .collect()
    }
}

/// Routes the current thread's log output into a buffer until the guard is
/// dropped. `tokio::test` runs on the current thread, so this covers async
/// tests as well.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

/// Whether `line` carries the structured field `index=<index>`.
pub fn has_index(line: &str, index: usize) -> bool {
    let field = format!("index={}", index);
    line.split_whitespace().any(|token| token == field)
}
