//! Fixture import engine.
//!
//! An [`ImportSession`] loads fixture definitions by id, runs every
//! attribute through the transform pipeline (files, custom tokens,
//! references), applies per-model post-transforms and persists the result
//! exactly once per id. Cyclic references are broken with placeholder ids
//! that are rewritten as soon as the referenced fixture exists.

pub mod bootstrap;
pub mod errors;
pub mod generated;
pub mod loader;
pub mod meta;
pub mod model;
pub mod pending;
pub mod placeholders;
pub mod resolver;
pub mod session;
pub mod time;
pub mod transforms;

pub use bootstrap::load_fixtures;
pub use errors::{ImportError, ImportResult};
pub use generated::{GeneratedFixtures, GeneratedModule, GeneratorContext};
pub use loader::{FixtureModule, ModuleArgs, ModuleLoader, ModuleSource, RawDefinition};
pub use meta::ResolutionMeta;
pub use model::{ImportOptions, ImportReport, RoleDefinition};
pub use placeholders::PlaceholderRegistry;
pub use resolver::Resolution;
pub use session::{ImportContext, ImportSession, ImportSessionBuilder, Imported};
pub use transforms::custom::{CustomTransform, CustomTransforms, FnTransform, custom_fn};
pub use transforms::model::{FnModelTransform, ModelTransform, ModelTransforms, model_fn};
