//! Map-feature objects handed over by the upstream tile reader.
//!
//! Features are read-only once a [`Batch`] is built; the encoder only
//! borrows them.

use geo_types::{LineString, Point, Polygon};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub val: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
        }
    }
}

/// Attributes shared by every geometry kind.
#[derive(Clone, Debug)]
pub struct FeatureInfo {
    pub id: i64,
    pub quadtree: i64,
    pub tags: Vec<Tag>,
    /// `-1` when no minimum zoom was assigned.
    pub min_zoom: i64,
    pub layer: i64,
    pub z_order: i64,
}

impl FeatureInfo {
    pub fn new(id: i64, quadtree: i64, tags: Vec<Tag>) -> Self {
        Self {
            id,
            quadtree,
            tags,
            min_zoom: -1,
            layer: 0,
            z_order: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PointFeature {
    pub info: FeatureInfo,
    pub point: Point<f64>,
}

#[derive(Clone, Debug)]
pub struct LinestringFeature {
    pub info: FeatureInfo,
    pub line: LineString<f64>,
    pub length: f64,
}

#[derive(Clone, Debug)]
pub struct SimplePolygonFeature {
    pub info: FeatureInfo,
    pub polygon: Polygon<f64>,
    pub area: f64,
}

/// One disjoint ring set of a multi-part polygon.
#[derive(Clone, Debug)]
pub struct PolygonPart {
    pub polygon: Polygon<f64>,
    pub area: f64,
}

#[derive(Clone, Debug)]
pub struct ComplicatedPolygonFeature {
    pub info: FeatureInfo,
    pub parts: Vec<PolygonPart>,
    pub area: f64,
}

#[derive(Clone, Debug)]
pub enum Feature {
    Point(PointFeature),
    Linestring(LinestringFeature),
    SimplePolygon(SimplePolygonFeature),
    ComplicatedPolygon(ComplicatedPolygonFeature),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Point,
    Linestring,
    SimplePolygon,
    ComplicatedPolygon,
}

impl Feature {
    pub fn info(&self) -> &FeatureInfo {
        match self {
            Feature::Point(f) => &f.info,
            Feature::Linestring(f) => &f.info,
            Feature::SimplePolygon(f) => &f.info,
            Feature::ComplicatedPolygon(f) => &f.info,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Feature::Point(_) => FeatureKind::Point,
            Feature::Linestring(_) => FeatureKind::Linestring,
            Feature::SimplePolygon(_) => FeatureKind::SimplePolygon,
            Feature::ComplicatedPolygon(_) => FeatureKind::ComplicatedPolygon,
        }
    }

    pub fn id(&self) -> i64 {
        self.info().id
    }

    pub fn tags(&self) -> &[Tag] {
        &self.info().tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags()
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.val.as_str())
    }
}

/// One tile worth of features plus the tile's own quadtree key.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    pub quadtree: i64,
    pub features: Vec<Feature>,
}

impl Batch {
    pub fn new(quadtree: i64, features: Vec<Feature>) -> Self {
        Self { quadtree, features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
