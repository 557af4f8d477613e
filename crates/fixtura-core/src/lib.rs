//! Core contracts and helpers for fixtura.
//!
//! This crate defines fixture identifiers, the document value model, the
//! per-collection schema descriptors consumed by the import engine, and
//! validation/report helpers shared by the store adapters and the CLI.

pub mod entity;
pub mod error;
pub mod graph;
pub mod id;
pub mod schema;
pub mod validation;
pub mod value;

pub use entity::Entity;
pub use error::{Error, Result};
pub use graph::{ReferenceGraphReport, ReferenceGraphSummary, build_reference_graph_report};
pub use id::FixtureIdGenerator;
pub use schema::{CollectionSchema, FieldClass, FieldKind, RefTarget, SchemaRegistry};
pub use validation::validate_registry;
pub use value::{
    Attributes, FieldValue, ObjectId, attributes_from_json, attributes_to_json, get_path, remove_path,
    set_path,
};

/// Current contract version for `schema.json` artifacts.
pub const SCHEMA_VERSION: &str = "0.1";
