use std::sync::Arc;

use tracing::{debug, warn};

use fixtura_core::{Entity, ObjectId, id};

use crate::errors::{ImportError, ImportResult};
use crate::meta::ResolutionMeta;
use crate::session::ImportSession;

/// Outcome of a guarded reference resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The referenced entity exists.
    Resolved(Entity),
    /// The entity cannot be awaited from here; the id is a placeholder
    /// token that is rewritten once the entity is created.
    Deferred(ObjectId),
}

impl Resolution {
    /// Id to store in a reference field.
    pub fn id(&self) -> ObjectId {
        match self {
            Resolution::Resolved(entity) => entity.id,
            Resolution::Deferred(token) => *token,
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Resolution::Resolved(entity) => Some(entity),
            Resolution::Deferred(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Resolution::Deferred(_))
    }
}

impl ImportSession {
    /// Imports `id` on behalf of the fixture in `meta`, falling back to a
    /// placeholder when waiting for it could never finish: the id is
    /// already on the chain, belongs to a generated batch that is being
    /// imported, or is in flight behind a wait on this chain.
    pub async fn resolve_reference(
        &self,
        id: &str,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Resolution> {
        if let Some(context) = meta.generated_context() {
            if self.canonical_base(id::base_of(id)) == context {
                if self.logged.first(format!("generated:{id}")) {
                    debug!(id = %id, batch = %context, "reference into generated batch, deferring");
                }
                return Ok(Resolution::Deferred(self.placeholder(id)));
            }
        }
        if meta.contains(id) {
            self.log_circular(&meta.render_chain(Some(id)));
            return Ok(Resolution::Deferred(self.placeholder(id)));
        }

        let wait_key = self.wait_key(id).await?;
        let chain = meta.chain();
        let Some(_wait) = self.waits.enter(&chain, meta.id(), &wait_key) else {
            self.log_circular(&meta.render_chain(Some(id)));
            return Ok(Resolution::Deferred(self.placeholder(id)));
        };

        match self.import_with_meta(id, Some(meta.clone())).await {
            Ok(imported) => imported
                .into_entity()
                .map(Resolution::Resolved)
                .ok_or_else(|| ImportError::NotAnEntity(id.to_string())),
            Err(err) if err.is_recoverable() => {
                let chain = match err.root_cause() {
                    ImportError::CircularReference(chain) => chain.clone(),
                    _ => meta.render_chain(Some(id)),
                };
                self.log_circular(&chain);
                Ok(Resolution::Deferred(self.placeholder(id)))
            }
            Err(err) => Err(err),
        }
    }

    /// Token standing in for `id`, or its real id once it exists.
    pub(crate) fn placeholder(&self, id: &str) -> ObjectId {
        if let Some(entity_id) = self.placeholders.resolved_id(id) {
            return entity_id;
        }
        self.stats.lock().record_placeholder(id);
        self.placeholders.referenced(id)
    }

    /// Node a request for `id` waits on: the whole batch for generated
    /// collections, the fixture itself otherwise.
    async fn wait_key(&self, id: &str) -> ImportResult<String> {
        let base = self.canonical_base(id::base_of(id));
        if self.has_generated_source(&base).await? {
            Ok(base)
        } else {
            Ok(id.to_string())
        }
    }

    /// Collection directory name for any alias of a collection.
    pub(crate) fn canonical_base(&self, base: &str) -> String {
        self.store
            .schema()
            .lookup(base)
            .map(|schema| schema.collection.clone())
            .unwrap_or_else(|| base.to_string())
    }

    fn log_circular(&self, chain: &str) {
        if self.logged.first(format!("circular:{chain}")) {
            warn!(chain = %chain, "circular reference detected, using placeholder");
            self.stats.lock().record_circular(chain);
        }
    }
}

#[cfg(test)]
mod tests {
    use fixtura_core::Attributes;

    use super::*;

    #[test]
    fn resolution_exposes_the_storable_id() {
        let entity = Entity::new(ObjectId::new(), "users", Attributes::new());
        let resolved = Resolution::Resolved(entity.clone());
        assert_eq!(resolved.id(), entity.id);
        assert!(!resolved.is_deferred());

        let token = ObjectId::new();
        let deferred = Resolution::Deferred(token);
        assert_eq!(deferred.id(), token);
        assert!(deferred.entity().is_none());
    }
}
