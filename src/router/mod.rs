//! Routes each feature of a batch to its destination tables.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::config::{AllocConfig, AllocRule, LoadConfig};
use crate::elements::{Batch, Feature, FeatureKind};
use crate::encode::{ColumnEncoder, RowFormat};
use crate::error::Result;
use crate::geometry::GeometryProvider;
use crate::rows::CsvBlock;
use crate::schema::TableSpec;
use crate::utils::matches_tag;

/// Picks destination table names for a feature.
pub trait TableAlloc: Send + Sync {
    fn alloc<'a>(&'a self, feature: &Feature) -> Vec<&'a str>;
}

/// One table per geometry kind.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAlloc;

pub fn default_table(kind: FeatureKind) -> &'static str {
    match kind {
        FeatureKind::Point => "point",
        FeatureKind::Linestring => "line",
        FeatureKind::SimplePolygon | FeatureKind::ComplicatedPolygon => "polygon",
    }
}

impl TableAlloc for DefaultAlloc {
    fn alloc<'a>(&'a self, feature: &Feature) -> Vec<&'a str> {
        vec![default_table(feature.kind())]
    }
}

/// Tag and kind driven allocation. Every matching rule contributes its
/// table once, in rule order.
#[derive(Clone, Debug, Default)]
pub struct RuleAlloc {
    rules: Vec<AllocRule>,
    include_default: bool,
}

impl RuleAlloc {
    pub fn new(config: &AllocConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            include_default: config.include_default,
        }
    }

    fn rule_matches(rule: &AllocRule, feature: &Feature) -> bool {
        if !rule.kinds.is_empty() && !rule.kinds.contains(&feature.kind()) {
            return false;
        }
        match &rule.tag {
            Some(key) => matches_tag(key, rule.value.as_deref(), &rule.values, feature.tags()),
            None => true,
        }
    }
}

impl TableAlloc for RuleAlloc {
    fn alloc<'a>(&'a self, feature: &Feature) -> Vec<&'a str> {
        let mut tables: Vec<&'a str> = Vec::new();
        if self.include_default {
            tables.push(default_table(feature.kind()));
        }
        for rule in &self.rules {
            if Self::rule_matches(rule, feature) && !tables.contains(&rule.table.as_str()) {
                tables.push(&rule.table);
            }
        }
        tables
    }
}

/// Rule-based allocation when rules are configured, per-kind otherwise.
pub fn table_alloc(config: &LoadConfig) -> Box<dyn TableAlloc> {
    match &config.allocation {
        Some(alloc) if !alloc.rules.is_empty() => Box::new(RuleAlloc::new(alloc)),
        _ => Box::new(DefaultAlloc),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RouterOptions {
    pub binary: bool,
    pub with_header: bool,
    pub split_multipolygons: bool,
    pub validate_geometry: bool,
}

impl From<&LoadConfig> for RouterOptions {
    fn from(config: &LoadConfig) -> Self {
        Self {
            binary: config.binary,
            with_header: config.header,
            split_multipolygons: config.split_multipolygons,
            validate_geometry: config.validate_geometry,
        }
    }
}

/// Turns batches into per-table row buffers.
pub struct PackCsvBlocks {
    encoders: HashMap<String, ColumnEncoder>,
    alloc: Box<dyn TableAlloc>,
    options: RouterOptions,
    unknown_tables: HashSet<String>,
}

impl PackCsvBlocks {
    pub fn new(
        specs: &[TableSpec],
        options: RouterOptions,
        geometry: Arc<dyn GeometryProvider>,
        alloc: Box<dyn TableAlloc>,
    ) -> Result<Self> {
        let format = if options.binary {
            RowFormat::Binary
        } else {
            RowFormat::Text
        };
        let mut encoders = HashMap::with_capacity(specs.len());
        for spec in specs {
            let encoder = ColumnEncoder::new(
                spec.clone(),
                format,
                options.validate_geometry,
                Arc::clone(&geometry),
            )?;
            encoders.insert(spec.table_name.clone(), encoder);
        }
        Ok(Self {
            encoders,
            alloc,
            options,
            unknown_tables: HashSet::new(),
        })
    }

    /// `None` marks end of stream and yields no block.
    pub fn call(&mut self, batch: Option<&Batch>) -> Result<Option<CsvBlock>> {
        match batch {
            Some(batch) => self.pack(batch).map(Some),
            None => Ok(None),
        }
    }

    pub fn pack(&mut self, batch: &Batch) -> Result<CsvBlock> {
        let mut block = CsvBlock::new(self.options.binary);
        let with_header = self.options.with_header && !self.options.binary;

        for feature in &batch.features {
            for table in self.alloc.alloc(feature) {
                let Some(encoder) = self.encoders.get(table) else {
                    if self.unknown_tables.insert(table.to_string()) {
                        warn!(table, "no schema for destination table, skipping");
                    }
                    continue;
                };

                let encoded = match feature {
                    Feature::ComplicatedPolygon(f) if self.options.split_multipolygons => {
                        let parts = 0..f.parts.len();
                        parts
                            .map(|part| encoder.encode_part(feature, part, batch.quadtree))
                            .collect::<Result<Vec<_>>>()?
                    }
                    _ => vec![encoder.encode(feature, batch.quadtree)?],
                };
                if encoded.is_empty() {
                    continue;
                }

                // header only in front of real data
                let rows = block.get(table);
                if with_header && rows.is_empty() {
                    rows.add(&encoder.header());
                }
                for row in &encoded {
                    rows.add(row);
                }
            }
        }

        block.finish();
        Ok(block)
    }

    pub fn unknown_tables(&self) -> impl Iterator<Item = &str> {
        self.unknown_tables.iter().map(String::as_str)
    }
}
