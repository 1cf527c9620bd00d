//! Geometry collaborator: turns features into (E)WKB bytes.
//!
//! The encoder never inspects coordinates itself; it asks a
//! [`GeometryProvider`] for raw or validated bytes and caches the result
//! per feature.

use geo::InteriorPoint;
use geo::orient::{Direction, Orient};
use geo_types::{Coord, Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use geozero::{CoordDimensions, ToWkb};

use crate::elements::{Feature, PolygonPart};
use crate::error::{LoadError, Result};

pub const DEFAULT_SRID: i32 = 3857;

/// Output of validation: the repaired geometry plus derived shapes.
#[derive(Clone, Debug, Default)]
pub struct ValidatedGeometry {
    pub wkb: Vec<u8>,
    /// `None` for empty geometries.
    pub point_wkb: Option<Vec<u8>>,
    /// Ring boundaries, polygons only.
    pub boundary_wkb: Option<Vec<u8>>,
}

pub trait GeometryProvider: Send + Sync {
    /// Raw bytes, no validation.
    fn to_wkb(&self, feature: &Feature) -> Result<Vec<u8>>;

    fn validate_and_normalize(&self, feature: &Feature) -> Result<ValidatedGeometry>;

    /// Same as [`validate_and_normalize`](Self::validate_and_normalize) for a
    /// single part of a multi-part polygon.
    fn validate_and_normalize_part(&self, feature: &Feature, part: usize)
    -> Result<ValidatedGeometry>;
}

/// Default provider built on `geo` and `geozero`, emitting EWKB tagged
/// with a fixed SRID.
#[derive(Clone, Debug)]
pub struct GeoNormalizer {
    srid: i32,
}

impl Default for GeoNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_SRID)
    }
}

impl GeoNormalizer {
    pub fn new(srid: i32) -> Self {
        Self { srid }
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }

    fn ewkb(&self, geometry: &Geometry<f64>) -> Result<Vec<u8>> {
        geometry
            .to_ewkb(CoordDimensions::xy(), Some(self.srid))
            .map_err(|e| LoadError::Geometry(format!("WKB encoding failed: {e}")))
    }

    fn finish(
        &self,
        geometry: Geometry<f64>,
        boundary: Option<MultiLineString<f64>>,
    ) -> Result<ValidatedGeometry> {
        let point_wkb = match representative_point(&geometry) {
            Some(point) => Some(self.ewkb(&Geometry::Point(point))?),
            None => None,
        };
        let boundary_wkb = match boundary {
            Some(lines) => Some(self.ewkb(&Geometry::MultiLineString(lines))?),
            None => None,
        };
        Ok(ValidatedGeometry {
            wkb: self.ewkb(&geometry)?,
            point_wkb,
            boundary_wkb,
        })
    }
}

impl GeometryProvider for GeoNormalizer {
    fn to_wkb(&self, feature: &Feature) -> Result<Vec<u8>> {
        self.ewkb(&raw_geometry(feature))
    }

    fn validate_and_normalize(&self, feature: &Feature) -> Result<ValidatedGeometry> {
        match feature {
            Feature::Point(f) => self.finish(Geometry::Point(f.point), None),
            Feature::Linestring(f) => {
                // collapsed lines load unchanged
                let line = dedup_line(&f.line);
                let line = if line.0.len() < 2 { f.line.clone() } else { line };
                self.finish(Geometry::LineString(line), None)
            }
            Feature::SimplePolygon(f) => {
                let polygon = normalize_polygon(&f.polygon);
                let boundary = polygon_boundary(std::slice::from_ref(&polygon));
                self.finish(Geometry::Polygon(polygon), Some(boundary))
            }
            Feature::ComplicatedPolygon(f) => {
                let polygons: Vec<Polygon<f64>> =
                    f.parts.iter().map(|p| normalize_polygon(&p.polygon)).collect();
                let boundary = polygon_boundary(&polygons);
                let geometry = match <[Polygon<f64>; 1]>::try_from(polygons) {
                    Ok([single]) => Geometry::Polygon(single),
                    Err(polygons) => Geometry::MultiPolygon(MultiPolygon(polygons)),
                };
                self.finish(geometry, Some(boundary))
            }
        }
    }

    fn validate_and_normalize_part(
        &self,
        feature: &Feature,
        part: usize,
    ) -> Result<ValidatedGeometry> {
        let part = polygon_part(feature, part)?;
        let polygon = normalize_polygon(&part.polygon);
        let boundary = polygon_boundary(std::slice::from_ref(&polygon));
        self.finish(Geometry::Polygon(polygon), Some(boundary))
    }
}

/// Looks up one part of a multi-part polygon.
pub fn polygon_part(feature: &Feature, part: usize) -> Result<&PolygonPart> {
    match feature {
        Feature::ComplicatedPolygon(f) => f.parts.get(part).ok_or_else(|| {
            LoadError::encode(format!(
                "part {} out of range for polygon {} ({} parts)",
                part,
                f.info.id,
                f.parts.len()
            ))
        }),
        other => Err(LoadError::encode(format!(
            "feature {} is a {:?}, not a multi-part polygon",
            other.id(),
            other.kind()
        ))),
    }
}

fn raw_geometry(feature: &Feature) -> Geometry<f64> {
    match feature {
        Feature::Point(f) => Geometry::Point(f.point),
        Feature::Linestring(f) => Geometry::LineString(f.line.clone()),
        Feature::SimplePolygon(f) => Geometry::Polygon(f.polygon.clone()),
        Feature::ComplicatedPolygon(f) => match f.parts.as_slice() {
            [single] => Geometry::Polygon(single.polygon.clone()),
            parts => Geometry::MultiPolygon(MultiPolygon(
                parts.iter().map(|p| p.polygon.clone()).collect(),
            )),
        },
    }
}

fn dedup_line(line: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = line.0.clone();
    coords.dedup();
    LineString(coords)
}

// Closed rings need four coordinates; anything shorter is dropped.
fn normalize_polygon(polygon: &Polygon<f64>) -> Polygon<f64> {
    let exterior = dedup_line(polygon.exterior());
    let interiors = polygon
        .interiors()
        .iter()
        .map(dedup_line)
        .filter(|ring| ring.0.len() >= 4)
        .collect();
    Polygon::new(exterior, interiors).orient(Direction::Default)
}

fn polygon_boundary(polygons: &[Polygon<f64>]) -> MultiLineString<f64> {
    let mut lines = Vec::new();
    for polygon in polygons {
        lines.push(polygon.exterior().clone());
        lines.extend(polygon.interiors().iter().cloned());
    }
    MultiLineString(lines)
}

fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(p) => Some(*p),
        other => other.interior_point(),
    }
}
