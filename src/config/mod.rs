use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::elements::FeatureKind;
use crate::error::{LoadError, Result};
use crate::geometry::DEFAULT_SRID;
use crate::schema::{DefaultTableOptions, TableSpec, default_table_specs};

/// Connection string that counts rows instead of loading them.
pub const NULL_CONNECTION: &str = "null";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoadConfig {
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub table_prefix: String,
    #[serde(default)]
    pub binary: bool,
    #[serde(default = "default_true")]
    pub header: bool,
    #[serde(default)]
    pub split_multipolygons: bool,
    #[serde(default)]
    pub validate_geometry: bool,
    #[serde(default = "default_srid")]
    pub srid: i32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub default_tables: Option<DefaultTablesConfig>,
    #[serde(default)]
    pub allocation: Option<AllocConfig>,
}

fn default_true() -> bool {
    true
}

fn default_srid() -> i32 {
    DEFAULT_SRID
}

fn default_workers() -> usize {
    1
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Generates the standard tables instead of listing them by hand.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DefaultTablesConfig {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub quadtree: bool,
    #[serde(default)]
    pub minzoom: bool,
    #[serde(default = "default_true")]
    pub other_tags: bool,
    #[serde(default)]
    pub extended: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AllocConfig {
    #[serde(default)]
    pub rules: Vec<AllocRule>,
    /// Also send every feature to its per-kind default table.
    #[serde(default)]
    pub include_default: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AllocRule {
    pub table: String,
    #[serde(default)]
    pub kinds: Vec<FeatureKind>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LoadConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses without validating, so callers can apply overrides first.
    pub fn read(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()
            .map_err(|e| LoadError::config(format!("{}: {e}", path.display())))?;
        settings
            .try_deserialize()
            .map_err(|e| LoadError::config(format!("{}: {e}", path.display())))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(text, ::config::FileFormat::Yaml))
            .build()
            .map_err(|e| LoadError::config(e.to_string()))?;
        let config: LoadConfig = settings
            .try_deserialize()
            .map_err(|e| LoadError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.trim().is_empty() {
            return Err(LoadError::config("connection must not be empty"));
        }
        if self.workers == 0 {
            return Err(LoadError::config("workers must be at least 1"));
        }

        let specs = self.table_specs();
        if specs.is_empty() {
            return Err(LoadError::config(
                "no tables configured (set tables or default_tables)",
            ));
        }
        let mut names = HashSet::new();
        for spec in &specs {
            spec.validate()?;
            if !names.insert(spec.table_name.as_str()) {
                return Err(LoadError::config(format!(
                    "table '{}' is defined twice",
                    spec.table_name
                )));
            }
        }

        if let Some(alloc) = &self.allocation {
            for rule in &alloc.rules {
                if rule.tag.is_none() && (rule.value.is_some() || !rule.values.is_empty()) {
                    return Err(LoadError::config(format!(
                        "allocation rule for '{}' has a value but no tag",
                        rule.table
                    )));
                }
            }
        }
        Ok(())
    }

    /// Explicit tables first, then generated ones.
    pub fn table_specs(&self) -> Vec<TableSpec> {
        let mut specs = self.tables.clone();
        if let Some(defaults) = &self.default_tables {
            let opts = DefaultTableOptions {
                with_quadtree: defaults.quadtree,
                with_minzoom: defaults.minzoom,
                with_other_tags: defaults.other_tags,
                extended: defaults.extended,
            };
            specs.extend(default_table_specs(&defaults.tags, &opts));
        }
        specs
    }

    pub fn is_null_connection(&self) -> bool {
        self.connection == NULL_CONNECTION
    }
}
