use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use fixtura_core::value::get_path;
use fixtura_core::{Attributes, CollectionSchema, Entity, ObjectId, SchemaRegistry};

use crate::adapter::Store;
use crate::error::{StoreError, StoreResult};

/// Hook run against the attributes of every `create` in a collection.
pub type CreateHook = Arc<dyn Fn(&mut Attributes) -> Result<(), String> + Send + Sync>;

/// In-memory document store.
///
/// Strict like a typical document schema: undeclared top-level fields are
/// dropped on create. `unique` fields are enforced on create only.
pub struct MemoryStore {
    schema: SchemaRegistry,
    collections: RwLock<BTreeMap<String, Vec<Entity>>>,
    hooks: RwLock<HashMap<String, Vec<CreateHook>>>,
}

impl MemoryStore {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self {
            schema,
            collections: RwLock::new(BTreeMap::new()),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a create hook. Hooks never run for `update_fields`.
    pub fn on_create<F>(&self, collection: &str, hook: F) -> StoreResult<()>
    where
        F: Fn(&mut Attributes) -> Result<(), String> + Send + Sync + 'static,
    {
        let name = self.resolve(collection)?.collection.clone();
        self.hooks
            .write()
            .entry(name)
            .or_default()
            .push(Arc::new(hook));
        Ok(())
    }

    /// All entities of a collection, in creation order.
    pub fn all(&self, collection: &str) -> Vec<Entity> {
        let Some(schema) = self.schema.lookup(collection) else {
            return Vec::new();
        };
        self.collections
            .read()
            .get(&schema.collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.collections.read().values().map(Vec::len).sum()
    }

    /// JSON rendering of every collection, keyed by collection name.
    pub fn dump(&self) -> Value {
        let collections = self.collections.read();
        Value::Object(
            collections
                .iter()
                .map(|(name, entities)| {
                    let rows = entities
                        .iter()
                        .map(|entity| {
                            fixtura_core::value::attributes_to_json(&entity.to_object())
                        })
                        .collect();
                    (name.clone(), Value::Array(rows))
                })
                .collect(),
        )
    }

    fn resolve(&self, collection: &str) -> StoreResult<&Arc<CollectionSchema>> {
        self.schema
            .lookup(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }

    fn check_unique(
        &self,
        schema: &CollectionSchema,
        existing: &[Entity],
        attributes: &Attributes,
    ) -> StoreResult<()> {
        for field in &schema.unique {
            let Some(value) = get_path(attributes, field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if existing
                .iter()
                .any(|entity| entity.get(field) == Some(value))
            {
                return Err(StoreError::Duplicate {
                    collection: schema.collection.clone(),
                    field: field.clone(),
                    value: value.render(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    async fn create(&self, collection: &str, attributes: Attributes) -> StoreResult<Entity> {
        let schema = self.resolve(collection)?;
        let mut attributes: Attributes = attributes
            .into_iter()
            .filter(|(name, _)| schema.has_top_level(name))
            .collect();

        let hooks = self
            .hooks
            .read()
            .get(&schema.collection)
            .cloned()
            .unwrap_or_default();
        for hook in hooks {
            hook(&mut attributes).map_err(|message| StoreError::Hook {
                collection: schema.collection.clone(),
                message,
            })?;
        }

        let mut collections = self.collections.write();
        let entities = collections.entry(schema.collection.clone()).or_default();
        self.check_unique(schema, entities, &attributes)?;

        let entity = Entity::new(ObjectId::new(), schema.collection.clone(), attributes);
        entities.push(entity.clone());
        debug!(collection = %schema.collection, id = %entity.id, "entity created");
        Ok(entity)
    }

    async fn find_one(&self, collection: &str, filter: &Attributes) -> StoreResult<Option<Entity>> {
        let schema = self.resolve(collection)?;
        let collections = self.collections.read();
        let found = collections.get(&schema.collection).and_then(|entities| {
            entities.iter().find(|entity| {
                filter
                    .iter()
                    .all(|(path, expected)| entity.get(path) == Some(expected))
            })
        });
        Ok(found.cloned())
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &ObjectId,
        fields: Attributes,
    ) -> StoreResult<Entity> {
        let schema = self.resolve(collection)?;
        let mut collections = self.collections.write();
        let entity = collections
            .get_mut(&schema.collection)
            .and_then(|entities| entities.iter_mut().find(|entity| entity.id == *id))
            .ok_or_else(|| StoreError::NotFound {
                collection: schema.collection.clone(),
                id: id.to_string(),
            })?;
        for (name, value) in fields {
            fixtura_core::value::set_path(&mut entity.attributes, &name, value);
        }
        Ok(entity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixtura_core::{FieldKind, FieldValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> MemoryStore {
        MemoryStore::new(
            SchemaRegistry::new().with(
                CollectionSchema::new("User")
                    .field("email", FieldKind::String)
                    .field("firstName", FieldKind::String)
                    .unique("email"),
            ),
        )
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), FieldValue::from(*value)))
            .collect()
    }

    #[tokio::test]
    async fn create_drops_undeclared_fields() {
        let store = store();
        let user = store
            .create("User", attrs(&[("email", "a@b.c"), ("nickname", "zed")]))
            .await
            .unwrap();
        assert_eq!(user.collection, "users");
        assert!(user.get("nickname").is_none());
        assert_eq!(store.all("users").len(), 1);
    }

    #[tokio::test]
    async fn create_enforces_unique_fields() {
        let store = store();
        store.create("users", attrs(&[("email", "a@b.c")])).await.unwrap();
        let err = store
            .create("users", attrs(&[("email", "a@b.c")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn update_fields_skips_hooks() {
        let store = store();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        store
            .on_create("users", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let user = store.create("users", attrs(&[("email", "a@b.c")])).await.unwrap();
        let updated = store
            .update_fields("users", &user.id, attrs(&[("firstName", "Ann")]))
            .await
            .unwrap();

        assert_eq!(updated.get_str("firstName"), Some("Ann"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let found = store
            .find_one("users", &attrs(&[("firstName", "Ann")]))
            .await
            .unwrap();
        assert_eq!(found.map(|entity| entity.id), Some(user.id));
    }

    #[tokio::test]
    async fn unknown_collection_is_an_error() {
        let store = store();
        let err = store.create("widgets", Attributes::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(_)));
    }
}
