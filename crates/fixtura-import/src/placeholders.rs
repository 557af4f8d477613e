//! Forward-reference tokens and the deferred rewrite of entities that were
//! persisted while still holding them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::future::try_join_all;
use parking_lot::Mutex;
use tracing::debug;

use fixtura_core::{Attributes, CollectionSchema, Entity, ObjectId, SchemaRegistry};

use crate::errors::ImportResult;
use crate::session::ImportSession;

/// Field-level rewrite of one persisted entity.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub collection: String,
    pub id: ObjectId,
    pub fields: Attributes,
}

#[derive(Debug, Default)]
struct State {
    /// One token per fixture id.
    tokens: HashMap<String, ObjectId>,
    /// Tokens handed out to reference fields, with their fixture id.
    referenced: HashMap<ObjectId, String>,
    /// Token to the real entity id, once created.
    resolved: HashMap<ObjectId, ObjectId>,
    /// Persisted entities still holding tokens, by entity id.
    pending: BTreeMap<ObjectId, Entity>,
    /// Freshest snapshot of entities rewritten after creation.
    latest: HashMap<ObjectId, Entity>,
}

/// Placeholder bookkeeping for one import session.
#[derive(Debug, Default)]
pub struct PlaceholderRegistry {
    state: Mutex<State>,
}

impl PlaceholderRegistry {
    /// Token for `id`, marking it as referenced before it exists.
    pub fn referenced(&self, id: &str) -> ObjectId {
        let mut state = self.state.lock();
        let token = token_for(&mut state, id);
        state.referenced.insert(token, id.to_string());
        token
    }

    /// Binds the token of `id` to the freshly persisted `entity`.
    pub fn set_resolved(&self, id: &str, entity: &Entity) {
        let mut state = self.state.lock();
        let token = token_for(&mut state, id);
        state.resolved.insert(token, entity.id);
    }

    /// Real id of `id` if it has been created.
    pub fn resolved_id(&self, id: &str) -> Option<ObjectId> {
        let state = self.state.lock();
        let token = state.tokens.get(id)?;
        state.resolved.get(token).copied()
    }

    pub fn is_placeholder(&self, value: &ObjectId) -> bool {
        self.state.lock().referenced.contains_key(value)
    }

    /// Tracks `entity` when any reference location holds a token.
    pub fn queue_pending_if_needed(&self, schema: &CollectionSchema, entity: &Entity) -> bool {
        let mut state = self.state.lock();
        let holds_token = schema
            .reference_ids(&entity.attributes)
            .iter()
            .any(|(_, id)| state.referenced.contains_key(id));
        if holds_token {
            debug!(collection = %entity.collection, id = %entity.id, "entity holds placeholders");
            state.pending.insert(entity.id, entity.clone());
        }
        holds_token
    }

    /// Rewrites every resolvable token in pending entities and returns the
    /// changed top-level fields. Entities left without tokens are dropped.
    pub fn take_resolvable(&self, schemas: &SchemaRegistry) -> Vec<PendingUpdate> {
        let mut guard = self.state.lock();
        let State {
            referenced,
            resolved,
            pending,
            latest,
            ..
        } = &mut *guard;

        let mut updates = Vec::new();
        let mut settled = Vec::new();
        for (entity_id, entity) in pending.iter_mut() {
            let Some(schema) = schemas.lookup(&entity.collection) else {
                continue;
            };
            let changed =
                schema.rewrite_references(&mut entity.attributes, |token| resolved.get(token).copied());
            if !changed.is_empty() {
                let fields = changed
                    .iter()
                    .filter_map(|name| {
                        entity
                            .attributes
                            .get(name)
                            .map(|value| (name.clone(), value.clone()))
                    })
                    .collect();
                updates.push(PendingUpdate {
                    collection: entity.collection.clone(),
                    id: *entity_id,
                    fields,
                });
                latest.insert(*entity_id, entity.clone());
            }
            let still_pending = schema
                .reference_ids(&entity.attributes)
                .iter()
                .any(|(_, id)| referenced.contains_key(id));
            if !still_pending {
                settled.push(*entity_id);
            }
        }
        for entity_id in settled {
            pending.remove(&entity_id);
        }
        updates
    }

    /// Stores the snapshot returned by the store after a rewrite.
    pub fn record_latest(&self, entity: Entity) {
        self.state.lock().latest.insert(entity.id, entity);
    }

    /// Most recent snapshot of `entity`.
    pub fn latest(&self, entity: &Entity) -> Entity {
        self.state
            .lock()
            .latest
            .get(&entity.id)
            .cloned()
            .unwrap_or_else(|| entity.clone())
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Fixture ids that were referenced through a token but never created.
    pub fn unresolved(&self) -> BTreeSet<String> {
        let state = self.state.lock();
        state
            .referenced
            .iter()
            .filter(|(token, _)| !state.resolved.contains_key(*token))
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub fn clear(&self) {
        *self.state.lock() = State::default();
    }
}

fn token_for(state: &mut State, id: &str) -> ObjectId {
    *state.tokens.entry(id.to_string()).or_insert_with(ObjectId::new)
}

impl ImportSession {
    /// Writes every now-resolvable placeholder into its pending entity.
    pub(crate) async fn flush_pending(&self) -> ImportResult<()> {
        let updates = self.placeholders.take_resolvable(self.store.schema());
        if updates.is_empty() {
            return Ok(());
        }
        let writes = updates.into_iter().map(|update| async move {
            debug!(
                collection = %update.collection,
                id = %update.id,
                fields = update.fields.len(),
                "rewriting placeholders"
            );
            self.store
                .update_fields(&update.collection, &update.id, update.fields)
                .await
        });
        for entity in try_join_all(writes).await? {
            self.stats.lock().record_placeholder_update();
            self.placeholders.record_latest(entity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fixtura_core::{FieldKind, FieldValue};

    use super::*;

    fn schemas() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(CollectionSchema::new("User").field("manager", FieldKind::reference("User")))
            .with(
                CollectionSchema::new("Shop")
                    .field("owner", FieldKind::reference("User"))
                    .field(
                        "staff",
                        FieldKind::array(FieldKind::nested([("user", FieldKind::reference("User"))])),
                    ),
            )
    }

    fn entity(collection: &str, attributes: Attributes) -> Entity {
        Entity::new(ObjectId::new(), collection, attributes)
    }

    #[test]
    fn one_token_per_id() {
        let registry = PlaceholderRegistry::default();
        let first = registry.referenced("users/a");
        assert_eq!(registry.referenced("users/a"), first);
        assert_ne!(registry.referenced("users/b"), first);
        assert!(registry.is_placeholder(&first));
        assert_eq!(registry.unresolved().len(), 2);
    }

    #[test]
    fn pending_entities_are_rewritten_once_resolved() {
        let schemas = schemas();
        let registry = PlaceholderRegistry::default();
        let token = registry.referenced("users/a");

        let mut member = Attributes::new();
        member.insert("user".to_string(), FieldValue::Ref(token));
        let mut attributes = Attributes::new();
        attributes.insert("owner".to_string(), FieldValue::Ref(token));
        attributes.insert(
            "staff".to_string(),
            FieldValue::Array(vec![FieldValue::Object(member)]),
        );
        let shop = entity("shops", attributes);
        let shop_schema = schemas.require("shops").expect("shops");
        assert!(registry.queue_pending_if_needed(shop_schema, &shop));
        assert!(registry.take_resolvable(&schemas).is_empty());
        assert_eq!(registry.pending_len(), 1);

        let user = entity("users", Attributes::new());
        registry.set_resolved("users/a", &user);
        let updates = registry.take_resolvable(&schemas);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, shop.id);
        assert_eq!(updates[0].fields["owner"], FieldValue::Ref(user.id));
        assert_eq!(
            fixtura_core::get_path(&updates[0].fields, "staff.0.user"),
            Some(&FieldValue::Ref(user.id))
        );
        assert_eq!(registry.pending_len(), 0);
        assert!(registry.unresolved().is_empty());
        assert_eq!(registry.latest(&shop).get("owner"), Some(&FieldValue::Ref(user.id)));
    }

    #[test]
    fn entities_without_tokens_are_not_queued() {
        let schemas = schemas();
        let registry = PlaceholderRegistry::default();
        let mut attributes = Attributes::new();
        attributes.insert("manager".to_string(), FieldValue::Ref(ObjectId::new()));
        let user = entity("users", attributes);
        let user_schema = schemas.require("users").expect("users");
        assert!(!registry.queue_pending_if_needed(user_schema, &user));
        assert_eq!(registry.pending_len(), 0);
    }

    #[test]
    fn resolved_id_follows_set_resolved() {
        let registry = PlaceholderRegistry::default();
        assert!(registry.resolved_id("users/a").is_none());
        let user = entity("users", Attributes::new());
        registry.set_resolved("users/a", &user);
        assert_eq!(registry.resolved_id("users/a"), Some(user.id));
        registry.clear();
        assert!(registry.resolved_id("users/a").is_none());
    }
}
