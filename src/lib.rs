//! Column-spec driven row encoding and PostGIS bulk loading for OSM
//! map features.

pub mod app;
pub mod config;
pub mod elements;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod input;
pub mod pipeline;
pub mod router;
pub mod rows;
pub mod schema;
pub mod utils;
pub mod writer;

pub use error::{LoadError, Result};
