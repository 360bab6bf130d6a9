use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, Value};
use std::{
    collections::HashSet,
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use crate::error::{Error, Result};

/// An ordered collection of geographic features.
///
/// Features carry an id of the form `<osm_type>/<osm_id>`. Merging two
/// datasets keeps every feature of the left side and appends the features of
/// the right side that aren't present yet, so elements returned by
/// neighbouring cells appear only once.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    features: Vec<Feature>,
    ids: HashSet<String>,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.features == other.features
    }
}

fn feature_key(feature: &Feature) -> Option<String> {
    match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Adds `feature` unless a feature with the same id is already present.
    /// Returns whether the feature was added.
    pub fn insert(&mut self, feature: Feature) -> bool {
        if let Some(key) = feature_key(&feature) {
            if !self.ids.insert(key) {
                return false;
            }
        }
        self.features.push(feature);
        true
    }

    /// Joins `other` into this dataset, returning how many features were new.
    pub fn merge(&mut self, other: Dataset) -> usize {
        other
            .features
            .into_iter()
            .map(|f| self.insert(f))
            .filter(|added| *added)
            .count()
    }

    /// Bounding box over all feature geometries as `[west, south, east, north]`.
    pub fn bbox(&self) -> Option<Vec<f64>> {
        let mut bbox = [
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        ];
        for geometry in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            extend_bbox(geometry, &mut bbox);
        }

        if bbox[0] <= bbox[2] && bbox[1] <= bbox[3] {
            Some(bbox.to_vec())
        } else {
            None
        }
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: self.bbox(),
            features: self.features.clone(),
            foreign_members: None,
        }
    }

    /// Writes the dataset as a GeoJSON feature collection.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &self.to_feature_collection())
            .map_err(|e| Error::io(path, e.into()))?;
        writer.flush().map_err(|e| Error::io(path, e))
    }

    /// Reads a dataset previously written by [`Dataset::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::corrupt(path, e))?;
        match raw.parse::<GeoJson>().map_err(|e| Error::corrupt(path, e))? {
            GeoJson::FeatureCollection(fc) => Ok(fc.features.into_iter().collect()),
            _ => Err(Error::corrupt(path, "expected a feature collection")),
        }
    }
}

impl FromIterator<Feature> for Dataset {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut dataset = Dataset::new();
        for feature in iter {
            dataset.insert(feature);
        }
        dataset
    }
}

fn extend_bbox(geometry: &Geometry, bbox: &mut [f64; 4]) {
    match &geometry.value {
        Value::Point(p) => add_position(bbox, p),
        Value::MultiPoint(ps) | Value::LineString(ps) => {
            ps.iter().for_each(|p| add_position(bbox, p))
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter()
            .flatten()
            .for_each(|p| add_position(bbox, p)),
        Value::MultiPolygon(polys) => polys
            .iter()
            .flatten()
            .flatten()
            .for_each(|p| add_position(bbox, p)),
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                extend_bbox(g, bbox);
            }
        }
    }
}

fn add_position(bbox: &mut [f64; 4], position: &[f64]) {
    if let (Some(&x), Some(&y)) = (position.first(), position.get(1)) {
        bbox[0] = bbox[0].min(x);
        bbox[1] = bbox[1].min(y);
        bbox[2] = bbox[2].max(x);
        bbox[3] = bbox[3].max(y);
    }
}
