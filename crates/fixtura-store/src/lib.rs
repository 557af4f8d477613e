//! Capabilities consumed by the fixture importer.
//!
//! The importer only talks to a document store, a file source and an
//! upload sink through the traits defined here; `MemoryStore`,
//! `LocalFiles` and `StoreUploads` are the reference implementations used
//! by the CLI and the test suites.

pub mod adapter;
pub mod error;
pub mod files;
pub mod memory;
pub mod uploads;

pub use adapter::Store;
pub use error::{StoreError, StoreResult};
pub use files::{FileSource, LocalFiles};
pub use memory::{CreateHook, MemoryStore};
pub use uploads::{StoreUploads, UploadStore};

pub use fixtura_core::{Entity, SchemaRegistry};
