use async_trait::async_trait;

use fixtura_core::{Attributes, Entity, ObjectId, SchemaRegistry};

use crate::error::StoreResult;

/// Trait implemented by document stores fixtures are persisted into.
///
/// `collection` arguments accept any alias the schema registry knows
/// (`users`, `User`, ...).
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the engine identifier (e.g. `memory`).
    fn engine(&self) -> &'static str;

    /// Per-collection schema descriptors.
    fn schema(&self) -> &SchemaRegistry;

    /// Persist a new entity, running any create hooks.
    async fn create(&self, collection: &str, attributes: Attributes) -> StoreResult<Entity>;

    /// First entity whose dotted paths equal every value in `filter`.
    async fn find_one(&self, collection: &str, filter: &Attributes) -> StoreResult<Option<Entity>>;

    /// Write fields directly, bypassing create hooks and validation.
    async fn update_fields(
        &self,
        collection: &str,
        id: &ObjectId,
        fields: Attributes,
    ) -> StoreResult<Entity>;
}
