use geojson::{feature::Id, Feature, Geometry, JsonObject, JsonValue, Value};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use crate::dataset::Dataset;

/// Tags that turn a closed way into an area rather than a line.
const AREA_KEYS: &[&str] = &["building", "landuse", "natural", "leisure", "amenity"];

/// The result of parsing a single chunk.
#[derive(Debug, PartialEq)]
pub enum ChunkOutcome {
    /// The chunk contained at least one usable feature.
    Parsed(Dataset),

    /// Well-formed OSM data without any usable feature.
    Empty,

    /// The chunk isn't valid OSM XML.
    ParseFailure(String),
}

#[derive(Default)]
struct Node {
    lat: f64,
    lon: f64,
    tags: Vec<(String, String)>,
}

#[derive(Default)]
struct Way {
    refs: Vec<i64>,
    tags: Vec<(String, String)>,
}

enum Open {
    Node(i64, Node),
    Way(i64, Way),
}

/// Parses an OSM XML document as returned by the map API.
pub fn parse_chunk(text: &str) -> ChunkOutcome {
    match parse_osm(text) {
        Ok(dataset) if dataset.is_empty() => ChunkOutcome::Empty,
        Ok(dataset) => ChunkOutcome::Parsed(dataset),
        Err(reason) => ChunkOutcome::ParseFailure(reason),
    }
}

fn parse_osm(text: &str) -> Result<Dataset, String> {
    let mut reader = Reader::from_str(text);

    let mut seen_root = false;
    let mut unclosed: Vec<String> = Vec::new();
    let mut nodes: Vec<(i64, Node)> = Vec::new();
    let mut ways: Vec<(i64, Way)> = Vec::new();
    let mut open: Option<Open> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) if !seen_root => {
                if e.name().as_ref() != b"osm" {
                    return Err(format!(
                        "expected an <osm> root element, found <{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    ));
                }
                seen_root = true;
                if matches!(event, Event::Start(_)) {
                    unclosed.push("osm".to_owned());
                }
            }
            Event::Start(ref e) => {
                element(e, false, &mut open, &mut nodes, &mut ways)?;
                unclosed.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Empty(ref e) => element(e, true, &mut open, &mut nodes, &mut ways)?,
            Event::End(ref e) => {
                unclosed.pop();
                match (e.name().as_ref(), open.take()) {
                    (b"node", Some(Open::Node(id, node))) => nodes.push((id, node)),
                    (b"way", Some(Open::Way(id, way))) => ways.push((id, way)),
                    (_, other) => open = other,
                }
            }
            Event::Text(ref t) if !seen_root => {
                let t = t.unescape().map_err(|e| e.to_string())?;
                if !t.trim().is_empty() {
                    return Err("unexpected text before the <osm> root element".to_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err("document has no <osm> root element".to_owned());
    }
    // quick-xml reports a cut-off document as a clean end of input
    if let Some(name) = unclosed.last() {
        return Err(format!("document ends inside <{}>", name));
    }

    Ok(into_dataset(nodes, ways))
}

/// Handles an element inside the root. `empty` is set for self-closing
/// elements, which are complete once read.
fn element(
    e: &BytesStart<'_>,
    empty: bool,
    open: &mut Option<Open>,
    nodes: &mut Vec<(i64, Node)>,
    ways: &mut Vec<(i64, Way)>,
) -> Result<(), String> {
    match e.name().as_ref() {
        b"node" => {
            let id = parse_attr(e, b"id")?;
            let node = Node {
                lat: parse_attr(e, b"lat")?,
                lon: parse_attr(e, b"lon")?,
                tags: Vec::new(),
            };
            if empty {
                nodes.push((id, node));
            } else {
                *open = Some(Open::Node(id, node));
            }
        }
        b"way" => {
            let id = parse_attr(e, b"id")?;
            if empty {
                ways.push((id, Way::default()));
            } else {
                *open = Some(Open::Way(id, Way::default()));
            }
        }
        b"tag" => {
            let tag = read_tag(e)?;
            match open.as_mut() {
                Some(Open::Node(_, node)) => node.tags.push(tag),
                Some(Open::Way(_, way)) => way.tags.push(tag),
                None => {}
            }
        }
        b"nd" => {
            if let Some(Open::Way(_, way)) = open.as_mut() {
                way.refs.push(parse_attr(e, b"ref")?);
            }
        }
        _ => {}
    }

    Ok(())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<String, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        if attr.key.as_ref() == key {
            return attr
                .unescape_value()
                .map(|v| v.into_owned())
                .map_err(|err| err.to_string());
        }
    }

    Err(format!(
        "<{}> is missing attribute `{}`",
        String::from_utf8_lossy(e.name().as_ref()),
        String::from_utf8_lossy(key)
    ))
}

fn parse_attr<T: std::str::FromStr>(e: &BytesStart<'_>, key: &[u8]) -> Result<T, String> {
    let raw = attr(e, key)?;
    raw.parse().map_err(|_| {
        format!(
            "invalid value `{}` for attribute `{}`",
            raw,
            String::from_utf8_lossy(key)
        )
    })
}

fn read_tag(e: &BytesStart<'_>) -> Result<(String, String), String> {
    Ok((attr(e, b"k")?, attr(e, b"v")?))
}

fn properties(osm_type: &str, id: i64, tags: Vec<(String, String)>) -> JsonObject {
    let mut props: JsonObject = tags
        .into_iter()
        .map(|(k, v)| (k, JsonValue::from(v)))
        .collect();
    props.insert("osm_type".to_owned(), JsonValue::from(osm_type));
    props.insert("osm_id".to_owned(), JsonValue::from(id));
    props
}

fn feature(osm_type: &str, id: i64, value: Value, tags: Vec<(String, String)>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(Id::String(format!("{}/{}", osm_type, id))),
        properties: Some(properties(osm_type, id, tags)),
        foreign_members: None,
    }
}

fn is_area(tags: &[(String, String)]) -> bool {
    tags.iter()
        .any(|(k, v)| AREA_KEYS.contains(&k.as_str()) || (k == "area" && v == "yes"))
}

fn into_dataset(nodes: Vec<(i64, Node)>, ways: Vec<(i64, Way)>) -> Dataset {
    let coords: HashMap<i64, Vec<f64>> = nodes
        .iter()
        .map(|(id, n)| (*id, vec![n.lon, n.lat]))
        .collect();

    let mut dataset = Dataset::new();

    for (id, node) in nodes {
        if node.tags.is_empty() {
            continue;
        }
        dataset.insert(feature(
            "node",
            id,
            Value::Point(vec![node.lon, node.lat]),
            node.tags,
        ));
    }

    for (id, way) in ways {
        let line: Vec<Vec<f64>> = way
            .refs
            .iter()
            .filter_map(|r| coords.get(r).cloned())
            .collect();
        if line.len() < 2 {
            continue;
        }

        let closed = line.len() >= 4 && line.first() == line.last();
        let value = if closed && is_area(&way.tags) {
            Value::Polygon(vec![line])
        } else {
            Value::LineString(line)
        };
        dataset.insert(feature("way", id, value, way.tags));
    }

    dataset
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <bounds minlat="35.0" minlon="138.0" maxlat="35.04" maxlon="138.04"/>
  <node id="1" lat="35.01" lon="138.01"/>
  <node id="2" lat="35.01" lon="138.02"/>
  <node id="3" lat="35.02" lon="138.02"/>
  <node id="4" lat="35.03" lon="138.03">
    <tag k="amenity" v="cafe"/>
    <tag k="name" v="Caf&#233; Fuji"/>
  </node>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <nd ref="3"/>
    <nd ref="1"/>
    <tag k="building" v="yes"/>
  </way>
  <way id="11">
    <nd ref="1"/>
    <nd ref="3"/>
    <nd ref="999"/>
    <tag k="highway" v="residential"/>
  </way>
  <relation id="100">
    <member type="way" ref="10" role="outer"/>
    <tag k="type" v="multipolygon"/>
  </relation>
</osm>
"#;

    fn parsed(text: &str) -> Dataset {
        match parse_chunk(text) {
            ChunkOutcome::Parsed(ds) => ds,
            other => panic!("expected features, got {:?}", other),
        }
    }

    #[test]
    fn parses_nodes_and_ways() {
        let ds = parsed(SAMPLE);

        assert_eq!(ds.len(), 3);
        assert!(ds.contains("node/4"));
        assert!(ds.contains("way/10"));
        assert!(ds.contains("way/11"));
        assert!(!ds.contains("node/1"));

        let cafe = &ds.features()[0];
        let props = cafe.properties.as_ref().unwrap();
        assert_eq!(props["name"], JsonValue::from("Café Fuji"));
        assert_eq!(props["osm_id"], JsonValue::from(4));
        assert_eq!(
            cafe.geometry.as_ref().unwrap().value,
            Value::Point(vec![138.03, 35.03])
        );
    }

    #[test]
    fn closed_building_is_polygon() {
        let ds = parsed(SAMPLE);
        let building = ds
            .features()
            .iter()
            .find(|f| f.id == Some(Id::String("way/10".into())))
            .unwrap();
        assert!(matches!(
            building.geometry.as_ref().unwrap().value,
            Value::Polygon(_)
        ));
    }

    #[test]
    fn unresolved_refs_are_dropped() {
        let ds = parsed(SAMPLE);
        let road = ds
            .features()
            .iter()
            .find(|f| f.id == Some(Id::String("way/11".into())))
            .unwrap();
        match &road.geometry.as_ref().unwrap().value {
            Value::LineString(line) => assert_eq!(line.len(), 2),
            other => panic!("expected a line, got {:?}", other),
        }
    }

    #[test]
    fn empty_document() {
        let text = r#"<?xml version="1.0"?>
<osm version="0.6"><note>empty</note><bounds minlat="1" minlon="1" maxlat="2" maxlon="2"/></osm>"#;
        assert_eq!(parse_chunk(text), ChunkOutcome::Empty);
        assert_eq!(parse_chunk("<osm/>"), ChunkOutcome::Empty);
    }

    #[test]
    fn untagged_nodes_only_is_empty() {
        let text = r#"<osm><node id="1" lat="1.0" lon="2.0"/></osm>"#;
        assert_eq!(parse_chunk(text), ChunkOutcome::Empty);
    }

    #[test]
    fn truncated_document_names_open_element() {
        let text = r#"<osm version="0.6"><way id="7"><nd ref="1"/>"#;
        assert_eq!(
            parse_chunk(text),
            ChunkOutcome::ParseFailure("document ends inside <way>".to_owned())
        );
    }

    #[test]
    fn tags_cannot_override_osm_identity() {
        let text = r#"<osm><node id="4" lat="1.0" lon="2.0"><tag k="osm_id" v="99"/><tag k="osm_type" v="relation"/></node></osm>"#;
        let ds = parsed(text);
        let props = ds.features()[0].properties.as_ref().unwrap();
        assert_eq!(props["osm_id"], JsonValue::from(4));
        assert_eq!(props["osm_type"], JsonValue::from("node"));
    }

    #[test]
    fn malformed_documents() {
        for text in &[
            "",
            "this is not xml {{{",
            "<html><body>rate limited</body></html>",
            r#"<osm><node id="1" lat="1.0" lon="2.0"></way></osm>"#,
            r#"<osm><node id="x" lat="1.0" lon="2.0"/></osm>"#,
            r#"<osm><node id="1" lat="1.0"/></osm>"#,
            r#"<osm version="0.6"><node id="1" lat="1.0" lon="2.0"><tag k="amenity" v="cafe"/></node><node id="2" lat="1.0" lon="2.0">"#,
            r#"<osm version="0.6"><node id="1" lat="1.0" lon="2.0"><tag k="amenity" v="cafe"/></node>"#,
        ] {
            assert!(
                matches!(parse_chunk(text), ChunkOutcome::ParseFailure(_)),
                "{:?}",
                text
            );
        }
    }
}
