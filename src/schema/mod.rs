//! Declarative table schemas: which value goes into which column.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{LoadError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    #[serde(alias = "bigint")]
    BigInteger,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "float")]
    Double,
    Hstore,
    Json,
    TextArray,
    Geometry,
    PointGeometry,
    LineGeometry,
    PolygonGeometry,
}

impl ColumnType {
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            ColumnType::Geometry
                | ColumnType::PointGeometry
                | ColumnType::LineGeometry
                | ColumnType::PolygonGeometry
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::BigInteger | ColumnType::Integer)
    }

    /// PostGIS type name used in `CREATE TABLE`.
    pub fn sql_type(self, srid: i32) -> String {
        match self {
            ColumnType::Text => "text".to_string(),
            ColumnType::BigInteger => "bigint".to_string(),
            ColumnType::Integer => "integer".to_string(),
            ColumnType::Double => "float".to_string(),
            ColumnType::Hstore => "hstore".to_string(),
            ColumnType::Json => "json".to_string(),
            ColumnType::TextArray => "text[]".to_string(),
            ColumnType::Geometry => format!("geometry(Geometry, {srid})"),
            ColumnType::PointGeometry => format!("geometry(Point, {srid})"),
            ColumnType::LineGeometry => format!("geometry(LineString, {srid})"),
            ColumnType::PolygonGeometry => format!("geometry(Polygon, {srid})"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    OsmId,
    Part,
    ObjectQuadtree,
    BlockQuadtree,
    Tag,
    OtherTags,
    Layer,
    ZOrder,
    MinZoom,
    Length,
    Area,
    Geometry,
    RepresentativePointGeometry,
    BoundaryLineGeometry,
}

impl ColumnSource {
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            ColumnSource::Geometry
                | ColumnSource::RepresentativePointGeometry
                | ColumnSource::BoundaryLineGeometry
        )
    }

    /// Whether a column of type `ty` can hold values from this source.
    pub fn accepts(self, ty: ColumnType) -> bool {
        match self {
            ColumnSource::OsmId
            | ColumnSource::Part
            | ColumnSource::ObjectQuadtree
            | ColumnSource::BlockQuadtree
            | ColumnSource::Layer
            | ColumnSource::ZOrder
            | ColumnSource::MinZoom => ty.is_integer(),
            ColumnSource::Tag => ty == ColumnType::Text,
            ColumnSource::OtherTags => matches!(ty, ColumnType::Hstore | ColumnType::Json),
            ColumnSource::Length | ColumnSource::Area => ty == ColumnType::Double,
            ColumnSource::Geometry
            | ColumnSource::RepresentativePointGeometry
            | ColumnSource::BoundaryLineGeometry => ty.is_geometry(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
    pub source: ColumnSource,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, col_type: ColumnType, source: ColumnSource) -> Self {
        Self {
            name: name.into(),
            col_type,
            source,
        }
    }
}

/// One destination table. Column order is the wire order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableSpec {
    #[serde(alias = "name")]
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(LoadError::config("table name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(LoadError::config(format!(
                "table '{}' has no columns",
                self.table_name
            )));
        }
        if self.columns.len() > i16::MAX as usize {
            return Err(LoadError::config(format!(
                "table '{}' has {} columns, more than a binary row can carry",
                self.table_name,
                self.columns.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut other_tags = 0;
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(LoadError::config(format!(
                    "table '{}' repeats column '{}'",
                    self.table_name, col.name
                )));
            }
            if !col.source.accepts(col.col_type) {
                return Err(LoadError::config(format!(
                    "table '{}' column '{}': type {:?} cannot hold source {:?}",
                    self.table_name, col.name, col.col_type, col.source
                )));
            }
            if col.source == ColumnSource::OtherTags {
                other_tags += 1;
            }
        }
        if other_tags > 1 {
            return Err(LoadError::config(format!(
                "table '{}' has more than one other_tags column",
                self.table_name
            )));
        }
        Ok(())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

pub fn create_table_sql(prefix: &str, spec: &TableSpec, srid: i32) -> String {
    let cols: Vec<String> = spec
        .columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, c.col_type.sql_type(srid)))
        .collect();
    format!(
        "CREATE TABLE {}{} ({})",
        prefix,
        spec.table_name,
        cols.join(", ")
    )
}

/// Knobs for [`default_table_specs`].
#[derive(Clone, Debug, Default)]
pub struct DefaultTableOptions {
    pub with_quadtree: bool,
    pub with_minzoom: bool,
    pub with_other_tags: bool,
    pub extended: bool,
}

fn id_columns(opts: &DefaultTableOptions, with_part: bool) -> Vec<ColumnSpec> {
    let mut cols = vec![ColumnSpec::new(
        "osm_id",
        ColumnType::BigInteger,
        ColumnSource::OsmId,
    )];
    if with_part {
        cols.push(ColumnSpec::new(
            "part",
            ColumnType::Integer,
            ColumnSource::Part,
        ));
    }
    if opts.with_quadtree {
        cols.push(ColumnSpec::new(
            "quadtree",
            ColumnType::BigInteger,
            ColumnSource::ObjectQuadtree,
        ));
        cols.push(ColumnSpec::new(
            "tile",
            ColumnType::BigInteger,
            ColumnSource::BlockQuadtree,
        ));
    }
    cols
}

fn tag_columns(tags: &[String]) -> impl Iterator<Item = ColumnSpec> + '_ {
    tags.iter()
        .filter(|t| t.as_str() != "layer")
        .map(|t| ColumnSpec::new(t.clone(), ColumnType::Text, ColumnSource::Tag))
}

fn tail_columns(opts: &DefaultTableOptions, cols: &mut Vec<ColumnSpec>) {
    if opts.with_minzoom {
        cols.push(ColumnSpec::new(
            "minzoom",
            ColumnType::BigInteger,
            ColumnSource::MinZoom,
        ));
    }
    if opts.with_other_tags {
        cols.push(ColumnSpec::new(
            "tags",
            ColumnType::Hstore,
            ColumnSource::OtherTags,
        ));
    }
}

/// Builds the standard `point`, `line` and `polygon` tables, plus
/// `highway`, `building` and `boundary` when `extended` is set.
pub fn default_table_specs(tags: &[String], opts: &DefaultTableOptions) -> Vec<TableSpec> {
    let mut sorted: Vec<String> = tags.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut point = id_columns(opts, false);
    point.extend(tag_columns(&sorted));
    tail_columns(opts, &mut point);
    point.push(ColumnSpec::new(
        "way",
        ColumnType::PointGeometry,
        ColumnSource::Geometry,
    ));

    let mut line = id_columns(opts, false);
    line.extend(tag_columns(&sorted));
    line.push(ColumnSpec::new(
        "layer",
        ColumnType::BigInteger,
        ColumnSource::Layer,
    ));
    line.push(ColumnSpec::new(
        "z_order",
        ColumnType::BigInteger,
        ColumnSource::ZOrder,
    ));
    tail_columns(opts, &mut line);
    line.push(ColumnSpec::new(
        "length",
        ColumnType::Double,
        ColumnSource::Length,
    ));
    line.push(ColumnSpec::new(
        "way",
        ColumnType::LineGeometry,
        ColumnSource::Geometry,
    ));

    let mut polygon = id_columns(opts, true);
    polygon.extend(tag_columns(&sorted));
    polygon.push(ColumnSpec::new(
        "layer",
        ColumnType::BigInteger,
        ColumnSource::Layer,
    ));
    polygon.push(ColumnSpec::new(
        "z_order",
        ColumnType::BigInteger,
        ColumnSource::ZOrder,
    ));
    tail_columns(opts, &mut polygon);
    polygon.push(ColumnSpec::new(
        "way_area",
        ColumnType::Double,
        ColumnSource::Area,
    ));
    polygon.push(ColumnSpec::new(
        "way",
        ColumnType::Geometry,
        ColumnSource::Geometry,
    ));

    let mut specs = vec![
        TableSpec::new("point", point),
        TableSpec::new("line", line.clone()),
        TableSpec::new("polygon", polygon.clone()),
    ];

    if opts.extended {
        specs.push(TableSpec::new("highway", line));

        let mut building = polygon.clone();
        building.push(ColumnSpec::new(
            "way_point",
            ColumnType::PointGeometry,
            ColumnSource::RepresentativePointGeometry,
        ));
        specs.push(TableSpec::new("building", building));

        let keep = [
            "osm_id", "part", "quadtree", "tile", "boundary", "admin_level", "name", "minzoom",
            "way_area", "way",
        ];
        let mut boundary: Vec<ColumnSpec> = polygon
            .into_iter()
            .filter(|c| keep.contains(&c.name.as_str()))
            .collect();
        boundary.push(ColumnSpec::new(
            "way_exterior",
            ColumnType::Geometry,
            ColumnSource::BoundaryLineGeometry,
        ));
        specs.push(TableSpec::new("boundary", boundary));
    }

    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_specs_are_valid() {
        let opts = DefaultTableOptions {
            with_quadtree: true,
            with_minzoom: true,
            with_other_tags: true,
            extended: true,
        };
        let specs = default_table_specs(&["name".to_string(), "highway".to_string()], &opts);
        let names: Vec<&str> = specs.iter().map(|s| s.table_name.as_str()).collect();
        assert_eq!(
            names,
            ["point", "line", "polygon", "highway", "building", "boundary"]
        );
        for spec in &specs {
            spec.validate().unwrap();
        }
        let boundary = &specs[5];
        assert!(boundary.column_names().any(|c| c == "way_exterior"));
        assert!(!boundary.column_names().any(|c| c == "highway"));
    }

    #[test]
    fn rejects_mismatched_source_and_type() {
        let spec = TableSpec::new(
            "point",
            vec![ColumnSpec::new(
                "osm_id",
                ColumnType::Text,
                ColumnSource::OsmId,
            )],
        );
        assert!(matches!(spec.validate(), Err(LoadError::Config(_))));

        let spec = TableSpec::new(
            "point",
            vec![ColumnSpec::new(
                "names",
                ColumnType::TextArray,
                ColumnSource::Tag,
            )],
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_columns_and_other_tags() {
        let spec = TableSpec::new(
            "point",
            vec![
                ColumnSpec::new("tags", ColumnType::Hstore, ColumnSource::OtherTags),
                ColumnSpec::new("tags2", ColumnType::Json, ColumnSource::OtherTags),
            ],
        );
        assert!(spec.validate().is_err());

        let spec = TableSpec::new(
            "point",
            vec![
                ColumnSpec::new("name", ColumnType::Text, ColumnSource::Tag),
                ColumnSpec::new("name", ColumnType::Text, ColumnSource::Tag),
            ],
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn create_table_uses_prefix_and_srid() {
        let spec = TableSpec::new(
            "point",
            vec![
                ColumnSpec::new("osm_id", ColumnType::BigInteger, ColumnSource::OsmId),
                ColumnSpec::new("way", ColumnType::PointGeometry, ColumnSource::Geometry),
            ],
        );
        assert_eq!(
            create_table_sql("planet_", &spec, 3857),
            "CREATE TABLE planet_point (\"osm_id\" bigint, \"way\" geometry(Point, 3857))"
        );
    }
}
