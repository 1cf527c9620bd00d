//! Column encoder: one table schema applied to one feature.
//!
//! Each column is first resolved to a format-neutral [`Value`] by matching
//! on the feature kind, then rendered either as delimited text or as a
//! binary COPY tuple.

pub mod tags;

use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::elements::{Feature, Tag};
use crate::error::{LoadError, Result};
use crate::geometry::{GeometryProvider, polygon_part};
use crate::schema::{ColumnSource, ColumnSpec, ColumnType, TableSpec};

pub use tags::{pack_hstore_binary, pack_hstore_text, pack_json_text};

/// Field quote byte used by text rows.
pub const QUOTE: u8 = 0x01;
/// Field delimiter byte used by text rows.
pub const DELIMITER: u8 = 0x02;

/// Header of the binary COPY stream: signature, flags, extension length.
pub const PGCOPY_SIGNATURE: &[u8; 19] = b"PGCOPY\n\xff\r\n\0\0\0\0\0\0\0\0\0";
/// End-of-data marker of the binary COPY stream.
pub const PGCOPY_TRAILER: [u8; 2] = [0xff, 0xff];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFormat {
    #[default]
    Text,
    Binary,
}

enum Value<'a> {
    Absent,
    Int(i64),
    Double(f64),
    Text(&'a str),
    Tags(Vec<&'a Tag>),
    Bytes(&'a [u8]),
}

/// Geometry bytes for one feature, computed once and shared by every
/// geometry column of the row.
#[derive(Default)]
struct GeometryValues {
    wkb: Option<Vec<u8>>,
    point: Option<Vec<u8>>,
    boundary: Option<Vec<u8>>,
}

#[derive(Copy, Clone, Default)]
struct GeometryNeeds {
    geometry: bool,
    derived: bool,
}

impl GeometryNeeds {
    fn any(self) -> bool {
        self.geometry || self.derived
    }
}

pub struct ColumnEncoder {
    spec: TableSpec,
    format: RowFormat,
    validate_geometry: bool,
    tag_cols: HashMap<String, usize>,
    other_tags_col: Option<usize>,
    needs: GeometryNeeds,
    geometry: Arc<dyn GeometryProvider>,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn positive(v: i64) -> Value<'static> {
    if v > 0 { Value::Int(v) } else { Value::Absent }
}

impl ColumnEncoder {
    pub fn new(
        spec: TableSpec,
        format: RowFormat,
        validate_geometry: bool,
        geometry: Arc<dyn GeometryProvider>,
    ) -> Result<Self> {
        spec.validate()?;

        let mut tag_cols = HashMap::new();
        let mut other_tags_col = None;
        let mut needs = GeometryNeeds::default();
        for (i, col) in spec.columns.iter().enumerate() {
            match col.source {
                ColumnSource::Tag => {
                    tag_cols.insert(col.name.clone(), i);
                }
                ColumnSource::OtherTags => other_tags_col = Some(i),
                ColumnSource::Geometry => needs.geometry = true,
                ColumnSource::RepresentativePointGeometry | ColumnSource::BoundaryLineGeometry => {
                    needs.derived = true
                }
                _ => {}
            }
        }

        Ok(Self {
            spec,
            format,
            validate_geometry,
            tag_cols,
            other_tags_col,
            needs,
            geometry,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.spec.table_name
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn format(&self) -> RowFormat {
        self.format
    }

    /// Column names joined by the delimiter, newline terminated.
    pub fn header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, name) in self.spec.column_names().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            out.extend_from_slice(name.as_bytes());
        }
        out.push(b'\n');
        out
    }

    pub fn encode(&self, feature: &Feature, block_qt: i64) -> Result<Vec<u8>> {
        self.encode_target(feature, None, block_qt)
    }

    /// Encodes a single part of a multi-part polygon. Area and geometry come
    /// from the part, not the aggregate.
    pub fn encode_part(&self, feature: &Feature, part: usize, block_qt: i64) -> Result<Vec<u8>> {
        polygon_part(feature, part)?;
        self.encode_target(feature, Some(part), block_qt)
    }

    fn encode_target(&self, feature: &Feature, part: Option<usize>, block_qt: i64) -> Result<Vec<u8>> {
        let geometry = self.geometry_values(feature, part)?;

        let mut values: Vec<Value> = self
            .spec
            .columns
            .iter()
            .map(|col| self.resolve(col, feature, part, block_qt, &geometry))
            .collect();

        let mut others = Vec::new();
        for tag in feature.tags() {
            if let Some(&idx) = self.tag_cols.get(&tag.key) {
                values[idx] = Value::Text(&tag.val);
            } else if self.other_tags_col.is_some() {
                others.push(tag);
            }
        }
        if let Some(idx) = self.other_tags_col {
            values[idx] = Value::Tags(others);
        }

        match self.format {
            RowFormat::Text => Ok(self.render_text(values)),
            RowFormat::Binary => self.render_binary(values),
        }
    }

    fn geometry_values(&self, feature: &Feature, part: Option<usize>) -> Result<GeometryValues> {
        if !self.needs.any() {
            return Ok(GeometryValues::default());
        }

        if let Some(part) = part {
            let v = self.geometry.validate_and_normalize_part(feature, part)?;
            return Ok(GeometryValues {
                wkb: Some(v.wkb),
                point: v.point_wkb,
                boundary: v.boundary_wkb,
            });
        }

        if self.validate_geometry || self.needs.derived {
            let v = self.geometry.validate_and_normalize(feature)?;
            let wkb = if self.validate_geometry {
                Some(v.wkb)
            } else if self.needs.geometry {
                Some(self.geometry.to_wkb(feature)?)
            } else {
                None
            };
            return Ok(GeometryValues {
                wkb,
                point: v.point_wkb,
                boundary: v.boundary_wkb,
            });
        }

        Ok(GeometryValues {
            wkb: Some(self.geometry.to_wkb(feature)?),
            ..Default::default()
        })
    }

    fn resolve<'a>(
        &self,
        col: &ColumnSpec,
        feature: &'a Feature,
        part: Option<usize>,
        block_qt: i64,
        geometry: &'a GeometryValues,
    ) -> Value<'a> {
        let info = feature.info();
        match col.source {
            ColumnSource::OsmId => match feature {
                // multi-part polygons share the id space of simple ones
                Feature::ComplicatedPolygon(f) => Value::Int(-f.info.id),
                _ => Value::Int(info.id),
            },
            ColumnSource::Part => match part {
                Some(p) => Value::Int(p as i64),
                None => Value::Absent,
            },
            ColumnSource::ObjectQuadtree => Value::Int(info.quadtree),
            ColumnSource::BlockQuadtree => Value::Int(block_qt),
            ColumnSource::Layer => positive(info.layer),
            ColumnSource::ZOrder => positive(info.z_order),
            ColumnSource::MinZoom => match feature {
                Feature::Point(_) if info.min_zoom > 0 => Value::Int(info.min_zoom),
                Feature::Point(_) => Value::Absent,
                Feature::Linestring(_)
                | Feature::SimplePolygon(_)
                | Feature::ComplicatedPolygon(_) => {
                    if info.min_zoom >= 0 {
                        Value::Int(info.min_zoom)
                    } else {
                        Value::Absent
                    }
                }
            },
            ColumnSource::Length => match feature {
                Feature::Linestring(f) => Value::Double(round1(f.length)),
                Feature::Point(_) | Feature::SimplePolygon(_) | Feature::ComplicatedPolygon(_) => {
                    Value::Absent
                }
            },
            ColumnSource::Area => match feature {
                Feature::SimplePolygon(f) => Value::Double(round1(f.area)),
                Feature::ComplicatedPolygon(f) => {
                    let area = part
                        .and_then(|p| f.parts.get(p))
                        .map_or(f.area, |p| p.area);
                    Value::Double(round1(area))
                }
                Feature::Point(_) | Feature::Linestring(_) => Value::Absent,
            },
            ColumnSource::Tag | ColumnSource::OtherTags => Value::Absent,
            ColumnSource::Geometry => bytes_or_absent(&geometry.wkb),
            ColumnSource::RepresentativePointGeometry => bytes_or_absent(&geometry.point),
            ColumnSource::BoundaryLineGeometry => bytes_or_absent(&geometry.boundary),
        }
    }

    fn render_text(&self, values: Vec<Value>) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, (value, col)) in values.into_iter().zip(&self.spec.columns).enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            match value {
                Value::Absent => {}
                Value::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
                Value::Double(v) => out.extend_from_slice(format!("{v:.1}").as_bytes()),
                Value::Text(s) => quote_text(&mut out, s),
                Value::Tags(tags) if tags.is_empty() => {}
                Value::Tags(tags) => {
                    let packed = match col.col_type {
                        ColumnType::Json => pack_json_text(tags),
                        _ => pack_hstore_text(tags),
                    };
                    // quoted like any text field, the server strips the quotes
                    quote_text(&mut out, &packed);
                }
                Value::Bytes(b) => write_hex(&mut out, b),
            }
        }
        out.push(b'\n');
        out
    }

    fn render_binary(&self, values: Vec<Value>) -> Result<Vec<u8>> {
        let mut fields: Vec<Option<Cow<[u8]>>> = Vec::with_capacity(values.len());
        for (value, col) in values.into_iter().zip(&self.spec.columns) {
            let field: Option<Cow<[u8]>> = match value {
                Value::Absent => None,
                Value::Int(v) => Some(pack_int(col, v)?.into()),
                Value::Double(v) => Some(v.to_be_bytes().to_vec().into()),
                Value::Text(s) => Some(s.as_bytes().into()),
                Value::Tags(tags) => Some(match col.col_type {
                    ColumnType::Json => pack_json_text(tags).into_bytes().into(),
                    _ => pack_hstore_binary(tags).into(),
                }),
                Value::Bytes(b) => Some(b.into()),
            };
            fields.push(field);
        }
        let fields: Vec<Option<&[u8]>> = fields.iter().map(|f| f.as_deref()).collect();
        pack_binary_row(&fields)
    }
}

fn bytes_or_absent(bytes: &Option<Vec<u8>>) -> Value<'_> {
    match bytes {
        Some(b) => Value::Bytes(b),
        None => Value::Absent,
    }
}

fn pack_int(col: &ColumnSpec, v: i64) -> Result<Vec<u8>> {
    match col.col_type {
        ColumnType::BigInteger => Ok(v.to_be_bytes().to_vec()),
        ColumnType::Integer => {
            let v = i32::try_from(v).map_err(|_| {
                LoadError::encode(format!(
                    "value {} does not fit integer column '{}'",
                    v, col.name
                ))
            })?;
            Ok(v.to_be_bytes().to_vec())
        }
        other => Err(LoadError::encode(format!(
            "column '{}' of type {:?} cannot hold an integer",
            col.name, other
        ))),
    }
}

/// Wraps a text field in quote bytes, rewriting newlines to `\n`. Quote
/// bytes inside the value pass through untouched.
pub fn quote_text(out: &mut Vec<u8>, val: &str) {
    out.push(QUOTE);
    for &b in val.as_bytes() {
        if b == b'\n' {
            out.extend_from_slice(b"\\n");
        } else {
            out.push(b);
        }
    }
    out.push(QUOTE);
}

fn write_hex(out: &mut Vec<u8>, bytes: &[u8]) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    out.reserve(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0xf) as usize]);
    }
}

/// Field count, then `-1` or length + bytes for each field.
pub fn pack_binary_row(fields: &[Option<&[u8]>]) -> Result<Vec<u8>> {
    let total = 2 + fields
        .iter()
        .map(|f| 4 + f.map_or(0, <[u8]>::len))
        .sum::<usize>();

    let count = i16::try_from(fields.len())
        .map_err(|_| LoadError::encode(format!("{} fields exceed a tuple", fields.len())))?;

    let mut out = Vec::with_capacity(total);
    out.put_i16(count);
    for field in fields {
        match field {
            None => out.put_i32(-1),
            Some(bytes) => {
                out.put_i32(bytes.len() as i32);
                out.put_slice(bytes);
            }
        }
    }

    if out.len() != total {
        return Err(LoadError::encode(format!(
            "binary row is {} bytes, expected {}",
            out.len(),
            total
        )));
    }
    Ok(out)
}

/// Splits one binary tuple back into its fields (`None` for null).
pub fn split_binary_row(row: &[u8]) -> Result<Vec<Option<&[u8]>>> {
    let short = || LoadError::encode("truncated binary row");
    let count_bytes: [u8; 2] = row.get(0..2).ok_or_else(short)?.try_into().map_err(|_| short())?;
    let count = i16::from_be_bytes(count_bytes);
    let mut pos = 2;
    let mut fields = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let len_bytes: [u8; 4] = row
            .get(pos..pos + 4)
            .ok_or_else(short)?
            .try_into()
            .map_err(|_| short())?;
        pos += 4;
        let len = i32::from_be_bytes(len_bytes);
        if len < 0 {
            fields.push(None);
            continue;
        }
        let end = pos + len as usize;
        fields.push(Some(row.get(pos..end).ok_or_else(short)?));
        pos = end;
    }
    if pos != row.len() {
        return Err(LoadError::encode(format!(
            "{} trailing bytes after binary row",
            row.len() - pos
        )));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{
        ComplicatedPolygonFeature, FeatureInfo, LinestringFeature, PointFeature, PolygonPart,
    };
    use crate::geometry::ValidatedGeometry;
    use geo_types::{LineString, Point, Polygon};

    /// Returns recognizable bytes instead of real WKB.
    struct FakeGeometry;

    impl GeometryProvider for FakeGeometry {
        fn to_wkb(&self, feature: &Feature) -> Result<Vec<u8>> {
            Ok(format!("raw{}", feature.id()).into_bytes())
        }

        fn validate_and_normalize(&self, feature: &Feature) -> Result<ValidatedGeometry> {
            Ok(ValidatedGeometry {
                wkb: format!("valid{}", feature.id()).into_bytes(),
                point_wkb: Some(b"pt".to_vec()),
                boundary_wkb: None,
            })
        }

        fn validate_and_normalize_part(
            &self,
            feature: &Feature,
            part: usize,
        ) -> Result<ValidatedGeometry> {
            Ok(ValidatedGeometry {
                wkb: format!("part{}.{}", feature.id(), part).into_bytes(),
                point_wkb: None,
                boundary_wkb: Some(b"ring".to_vec()),
            })
        }
    }

    fn encoder(columns: Vec<ColumnSpec>, format: RowFormat) -> ColumnEncoder {
        ColumnEncoder::new(
            TableSpec::new("t", columns),
            format,
            false,
            Arc::new(FakeGeometry),
        )
        .unwrap()
    }

    fn point(id: i64, min_zoom: i64, tags: Vec<Tag>) -> Feature {
        let mut info = FeatureInfo::new(id, 100, tags);
        info.min_zoom = min_zoom;
        Feature::Point(PointFeature {
            info,
            point: Point::new(1.0, 2.0),
        })
    }

    fn line(id: i64, min_zoom: i64, z_order: i64) -> Feature {
        let mut info = FeatureInfo::new(id, 7, vec![]);
        info.min_zoom = min_zoom;
        info.z_order = z_order;
        Feature::Linestring(LinestringFeature {
            info,
            line: LineString::from(vec![(0.0, 0.0), (3.0, 4.0)]),
            length: 5.04,
        })
    }

    fn square(size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(0.0, 0.0), (0.0, size), (size, size), (size, 0.0)]),
            vec![],
        )
    }

    fn multipolygon(id: i64) -> Feature {
        Feature::ComplicatedPolygon(ComplicatedPolygonFeature {
            info: FeatureInfo::new(id, 9, vec![Tag::new("landuse", "forest")]),
            parts: vec![
                PolygonPart {
                    polygon: square(1.0),
                    area: 1.04,
                },
                PolygonPart {
                    polygon: square(2.0),
                    area: 4.06,
                },
            ],
            area: 5.1,
        })
    }

    fn col(name: &str, ty: ColumnType, source: ColumnSource) -> ColumnSpec {
        ColumnSpec::new(name, ty, source)
    }

    #[test]
    fn point_end_to_end_binary_row() {
        let enc = encoder(
            vec![
                col("id", ColumnType::BigInteger, ColumnSource::OsmId),
                col("tags", ColumnType::Hstore, ColumnSource::OtherTags),
                col("geom", ColumnType::Geometry, ColumnSource::Geometry),
            ],
            RowFormat::Binary,
        );
        let row = enc
            .encode(&point(5, -1, vec![Tag::new("amenity", "cafe")]), 42)
            .unwrap();
        let fields = split_binary_row(&row).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], Some(&5i64.to_be_bytes()[..]));
        assert_eq!(
            fields[1].map(<[u8]>::to_vec),
            Some(pack_hstore_binary(&[Tag::new("amenity", "cafe")]))
        );
        assert_eq!(fields[2], Some(&b"raw5"[..]));
    }

    #[test]
    fn min_zoom_asymmetry_between_points_and_lines() {
        let enc = encoder(
            vec![col("minzoom", ColumnType::Integer, ColumnSource::MinZoom)],
            RowFormat::Binary,
        );
        let pt = enc.encode(&point(1, 0, vec![]), 0).unwrap();
        assert_eq!(split_binary_row(&pt).unwrap(), vec![None]);

        let ln = enc.encode(&line(2, 0, 0), 0).unwrap();
        assert_eq!(
            split_binary_row(&ln).unwrap(),
            vec![Some(&0i32.to_be_bytes()[..])]
        );

        let unset = enc.encode(&line(3, -1, 0), 0).unwrap();
        assert_eq!(split_binary_row(&unset).unwrap(), vec![None]);
    }

    #[test]
    fn zero_z_order_and_layer_are_absent() {
        let enc = encoder(
            vec![
                col("layer", ColumnType::BigInteger, ColumnSource::Layer),
                col("z_order", ColumnType::BigInteger, ColumnSource::ZOrder),
                col("length", ColumnType::Double, ColumnSource::Length),
            ],
            RowFormat::Text,
        );
        let row = enc.encode(&line(2, 0, 0), 0).unwrap();
        assert_eq!(row, b"\x02\x025.0\n");

        let row = enc.encode(&line(2, 0, 12), 0).unwrap();
        assert_eq!(row, b"\x0212\x025.0\n");
    }

    #[test]
    fn text_row_quotes_tags_and_hexes_geometry() {
        let enc = encoder(
            vec![
                col("osm_id", ColumnType::BigInteger, ColumnSource::OsmId),
                col("tile", ColumnType::BigInteger, ColumnSource::BlockQuadtree),
                col("name", ColumnType::Text, ColumnSource::Tag),
                col("tags", ColumnType::Hstore, ColumnSource::OtherTags),
                col("way", ColumnType::PointGeometry, ColumnSource::Geometry),
            ],
            RowFormat::Text,
        );
        let feature = point(
            5,
            -1,
            vec![Tag::new("name", "Two\nLines"), Tag::new("shop", "bakery")],
        );
        let row = enc.encode(&feature, 42).unwrap();
        let expected = b"5\x0242\x02\x01Two\\nLines\x01\x02\x01\"shop\"=>\"bakery\"\x01\x0272617735\n";
        assert_eq!(row, expected);
    }

    #[test]
    fn quote_byte_in_data_is_not_escaped() {
        let enc = encoder(
            vec![col("name", ColumnType::Text, ColumnSource::Tag)],
            RowFormat::Text,
        );
        let row = enc
            .encode(&point(1, -1, vec![Tag::new("name", "a\x01b")]), 0)
            .unwrap();
        assert_eq!(row, b"\x01a\x01b\x01\n");
    }

    #[test]
    fn other_tags_collects_every_unbound_tag() {
        let enc = encoder(
            vec![
                col("name", ColumnType::Text, ColumnSource::Tag),
                col("tags", ColumnType::Json, ColumnSource::OtherTags),
            ],
            RowFormat::Binary,
        );
        let tags = vec![
            Tag::new("name", "x"),
            Tag::new("a", "1"),
            Tag::new("b", "2"),
            Tag::new("c", "3"),
        ];
        let row = enc.encode(&point(1, -1, tags), 0).unwrap();
        let fields = split_binary_row(&row).unwrap();
        assert_eq!(fields[0], Some(&b"x"[..]));
        let json: serde_json::Value = serde_json::from_slice(fields[1].unwrap()).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn unbound_tags_are_dropped_without_other_tags_column() {
        let enc = encoder(
            vec![col("osm_id", ColumnType::BigInteger, ColumnSource::OsmId)],
            RowFormat::Binary,
        );
        let few = enc.encode(&point(1, -1, vec![]), 0).unwrap();
        let many = enc
            .encode(
                &point(1, -1, (0..50).map(|i| Tag::new(format!("k{i}"), "v")).collect()),
                0,
            )
            .unwrap();
        assert_eq!(few, many);
    }

    #[test]
    fn multipolygon_id_is_negated_and_parts_use_own_area() {
        let enc = encoder(
            vec![
                col("osm_id", ColumnType::BigInteger, ColumnSource::OsmId),
                col("part", ColumnType::Integer, ColumnSource::Part),
                col("way_area", ColumnType::Double, ColumnSource::Area),
                col("way", ColumnType::Geometry, ColumnSource::Geometry),
            ],
            RowFormat::Binary,
        );
        let feature = multipolygon(77);

        let whole = enc.encode(&feature, 0).unwrap();
        let fields = split_binary_row(&whole).unwrap();
        assert_eq!(fields[0], Some(&(-77i64).to_be_bytes()[..]));
        assert_eq!(fields[1], None);
        assert_eq!(fields[2], Some(&5.1f64.to_be_bytes()[..]));

        let part = enc.encode_part(&feature, 1, 0).unwrap();
        let fields = split_binary_row(&part).unwrap();
        assert_eq!(fields[1], Some(&1i32.to_be_bytes()[..]));
        assert_eq!(fields[2], Some(&4.1f64.to_be_bytes()[..]));
        assert_eq!(fields[3], Some(&b"part77.1"[..]));

        assert!(enc.encode_part(&feature, 2, 0).is_err());
        assert!(enc.encode_part(&point(1, -1, vec![]), 0, 0).is_err());
    }

    #[test]
    fn derived_geometry_columns_share_one_validation() {
        let enc = ColumnEncoder::new(
            TableSpec::new(
                "t",
                vec![
                    col("way", ColumnType::Geometry, ColumnSource::Geometry),
                    col(
                        "way_point",
                        ColumnType::PointGeometry,
                        ColumnSource::RepresentativePointGeometry,
                    ),
                    col(
                        "way_exterior",
                        ColumnType::Geometry,
                        ColumnSource::BoundaryLineGeometry,
                    ),
                ],
            ),
            RowFormat::Binary,
            true,
            Arc::new(FakeGeometry),
        )
        .unwrap();
        let row = enc.encode(&point(3, -1, vec![]), 0).unwrap();
        assert_eq!(
            split_binary_row(&row).unwrap(),
            vec![Some(&b"valid3"[..]), Some(&b"pt"[..]), None]
        );
    }

    #[test]
    fn integer_overflow_is_an_encoding_error() {
        let enc = encoder(
            vec![col("osm_id", ColumnType::Integer, ColumnSource::OsmId)],
            RowFormat::Binary,
        );
        let err = enc.encode(&point(i64::MAX, -1, vec![]), 0).unwrap_err();
        assert!(matches!(err, LoadError::Encode(_)));
    }

    #[test]
    fn header_lists_column_names() {
        let enc = encoder(
            vec![
                col("osm_id", ColumnType::BigInteger, ColumnSource::OsmId),
                col("way", ColumnType::Geometry, ColumnSource::Geometry),
            ],
            RowFormat::Text,
        );
        assert_eq!(enc.header(), b"osm_id\x02way\n");
    }
}
