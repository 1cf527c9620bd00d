//! GeoJSON-lines feature source.
//!
//! One feature per line. Properties carry the OSM attributes:
//! `osm_id`, `quadtree`, `tile`, `tags`, `min_zoom`, `layer`, `z_order`.
//! Consecutive features with the same `tile` form a batch, split further
//! when a batch grows past the requested size.

use anyhow::{Context, Result, anyhow, bail};
use geo::{Area, Euclidean, Length};
use geojson::{GeoJson, JsonObject, JsonValue};
use geo_types::Geometry;
use std::io::BufRead;

use crate::elements::{
    Batch, ComplicatedPolygonFeature, Feature, FeatureInfo, LinestringFeature, PointFeature,
    PolygonPart, SimplePolygonFeature, Tag,
};

fn int_property(props: &JsonObject, key: &str, default: i64) -> Result<i64> {
    match props.get(key) {
        None | Some(JsonValue::Null) => Ok(default),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| anyhow!("property '{key}' is not an integer: {value}")),
    }
}

fn tags_property(props: &JsonObject) -> Result<Vec<Tag>> {
    let Some(value) = props.get("tags") else {
        return Ok(Vec::new());
    };
    let JsonValue::Object(map) = value else {
        bail!("property 'tags' must be an object");
    };
    Ok(map
        .iter()
        .map(|(k, v)| match v {
            JsonValue::String(s) => Tag::new(k.as_str(), s.as_str()),
            other => Tag::new(k.as_str(), other.to_string()),
        })
        .collect())
}

/// Parses one line into a feature and the tile it belongs to.
pub fn parse_feature(line: &str) -> Result<(i64, Feature)> {
    let geojson: GeoJson = line.parse().context("invalid GeoJSON")?;
    let GeoJson::Feature(feature) = geojson else {
        bail!("expected a GeoJSON Feature");
    };

    let empty = JsonObject::new();
    let props = feature.properties.as_ref().unwrap_or(&empty);
    let id = match props.get("osm_id") {
        Some(value) => value
            .as_i64()
            .ok_or_else(|| anyhow!("property 'osm_id' is not an integer"))?,
        None => bail!("missing property 'osm_id'"),
    };

    let mut info = FeatureInfo::new(id, int_property(props, "quadtree", 0)?, tags_property(props)?);
    info.min_zoom = int_property(props, "min_zoom", -1)?;
    info.layer = int_property(props, "layer", 0)?;
    info.z_order = int_property(props, "z_order", 0)?;
    let tile = int_property(props, "tile", 0)?;

    let geometry = feature
        .geometry
        .ok_or_else(|| anyhow!("feature {id} has no geometry"))?;
    let geometry = Geometry::<f64>::try_from(geometry)
        .with_context(|| format!("feature {id} has unsupported geometry"))?;

    let feature = match geometry {
        Geometry::Point(point) => Feature::Point(PointFeature { info, point }),
        Geometry::LineString(line) => {
            let length = Euclidean.length(&line);
            Feature::Linestring(LinestringFeature { info, line, length })
        }
        Geometry::Polygon(polygon) => {
            let area = polygon.unsigned_area();
            Feature::SimplePolygon(SimplePolygonFeature {
                info,
                polygon,
                area,
            })
        }
        Geometry::MultiPolygon(multi) => {
            let parts: Vec<PolygonPart> = multi
                .0
                .into_iter()
                .map(|polygon| PolygonPart {
                    area: polygon.unsigned_area(),
                    polygon,
                })
                .collect();
            let area = parts.iter().map(|p| p.area).sum();
            Feature::ComplicatedPolygon(ComplicatedPolygonFeature { info, parts, area })
        }
        other => bail!("feature {id}: geometry type {other:?} is not loadable"),
    };
    Ok((tile, feature))
}

/// Iterator of batches over a GeoJSON-lines reader.
pub struct GeoJsonlBatches<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    batch_size: usize,
    pending: Option<(i64, Feature)>,
    done: bool,
}

impl<R: BufRead> GeoJsonlBatches<R> {
    pub fn new(reader: R, batch_size: usize) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            batch_size: batch_size.max(1),
            pending: None,
            done: false,
        }
    }

    fn next_feature(&mut self) -> Option<Result<(i64, Feature)>> {
        if let Some(pending) = self.pending.take() {
            return Some(Ok(pending));
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e).context("Input: read failed")),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line_no;
            return Some(parse_feature(&line).with_context(|| format!("Input: line {line_no}")));
        }
    }
}

impl<R: BufRead> Iterator for GeoJsonlBatches<R> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch: Option<Batch> = None;
        while let Some(item) = self.next_feature() {
            let (tile, feature) = match item {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if let Some(b) = batch.as_mut() {
                if b.quadtree == tile && b.len() < self.batch_size {
                    b.features.push(feature);
                    continue;
                }
                self.pending = Some((tile, feature));
                break;
            }
            batch = Some(Batch::new(tile, vec![feature]));
        }
        if batch.is_none() {
            self.done = true;
        }
        batch.map(Ok)
    }
}
