//! Collections whose fixtures are produced as one batch, either by a
//! registered generator or by a collection-level data file.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use fixtura_core::{CollectionSchema, Entity, FixtureIdGenerator, attributes_from_json, id};

use crate::errors::{ImportError, ImportResult};
use crate::loader::RawDefinition;
use crate::meta::ResolutionMeta;
use crate::session::ImportSession;

/// Produces every fixture of one collection.
#[async_trait]
pub trait GeneratedModule: Send + Sync {
    async fn generate(&self, ctx: &GeneratorContext<'_>) -> ImportResult<GeneratedFixtures>;
}

/// Generator output: named entries, or a sequence named in order by the
/// collection's id generator.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedFixtures {
    Keyed(Vec<(String, Value)>),
    Sequence(Vec<Value>),
}

impl GeneratedFixtures {
    /// Arrays become sequences and objects keyed entries.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(GeneratedFixtures::Sequence(items)),
            Value::Object(map) => Some(GeneratedFixtures::Keyed(map.into_iter().collect())),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GeneratedFixtures::Keyed(entries) => entries.len(),
            GeneratedFixtures::Sequence(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle given to a generator while it runs.
pub struct GeneratorContext<'a> {
    session: &'a ImportSession,
    base: String,
    ids: FixtureIdGenerator,
    chain: Vec<String>,
}

impl GeneratorContext<'_> {
    /// Collection being generated.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Next `<singular>-<n>` name for this collection.
    pub fn generate_fixture_id(&self) -> String {
        self.ids.next_id()
    }

    /// Untransformed definitions of other fixtures: one entry for
    /// `collection/name`, or an object of every entry for `collection`.
    pub async fn load_fixture_modules(&self, fixture_id: &str) -> ImportResult<Value> {
        let (base, name) = id::split(fixture_id);
        let base = self.session.canonical_base(base);
        if self.chain.contains(&base) {
            return Err(ImportError::GeneratedConflict(fixture_id.to_string()));
        }
        let waiting: Vec<String> = self.chain.iter().map(|b| generator_node(b)).collect();
        let _wait = self
            .session
            .waits
            .enter(&waiting, &generator_node(&self.base), &generator_node(&base))
            .ok_or_else(|| ImportError::GeneratedConflict(fixture_id.to_string()))?;

        if let Some(batch) = self.session.loaded_batch(&base, &self.chain).await? {
            if name.is_empty() {
                return Ok(batch.to_json());
            }
            return batch
                .get(name)
                .map(|raw| raw.as_ref().clone())
                .ok_or_else(|| ImportError::MissingGenerated {
                    base: base.clone(),
                    name: name.to_string(),
                });
        }

        if name.is_empty() {
            let mut entries = Map::new();
            for name in self.session.loader.list_directory(&base).await? {
                let raw = self.session.loader.require(&id::join(&base, &name)).await?;
                entries.insert(name, raw.as_ref().clone());
            }
            Ok(Value::Object(entries))
        } else {
            let raw = self.session.loader.require(&id::join(&base, name)).await?;
            Ok(raw.as_ref().clone())
        }
    }
}

fn generator_node(base: &str) -> String {
    format!("generate:{base}")
}

/// Pristine generator output, shared with `load_fixture_modules`.
#[derive(Debug)]
pub struct LoadedBatch {
    entries: Vec<(String, RawDefinition)>,
}

impl LoadedBatch {
    pub fn get(&self, name: &str) -> Option<&RawDefinition> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, raw)| raw)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(name, raw)| (name.clone(), raw.as_ref().clone()))
                .collect(),
        )
    }
}

/// Entities created from a batch, in generation order.
#[derive(Debug)]
pub struct GeneratedSet {
    entries: Vec<(String, Entity)>,
}

impl GeneratedSet {
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, entity)| entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.entries.iter().map(|(name, entity)| (name.as_str(), entity))
    }
}

impl ImportSession {
    /// Whether `base` is imported as a batch.
    pub(crate) async fn has_generated_source(&self, base: &str) -> ImportResult<bool> {
        if self.generators.contains_key(base) {
            return Ok(true);
        }
        Ok(self.loader.load(base).await?.is_some())
    }

    /// Raw batch for `base`, produced at most once per session.
    pub(crate) async fn loaded_batch(
        &self,
        base: &str,
        chain: &[String],
    ) -> ImportResult<Option<Arc<LoadedBatch>>> {
        let schema = self.store.schema().require(base)?.clone();
        self.batches
            .get_or_try_init(schema.collection.clone(), || self.load_batch(schema, chain))
            .await
    }

    async fn load_batch(
        &self,
        schema: Arc<CollectionSchema>,
        chain: &[String],
    ) -> ImportResult<Option<Arc<LoadedBatch>>> {
        let base = schema.collection.as_str();
        let ids = FixtureIdGenerator::new(schema.singular.clone());
        let output = if let Some(generator) = self.generators.get(base) {
            let mut chain = chain.to_vec();
            chain.push(base.to_string());
            let ctx = GeneratorContext {
                session: self,
                base: base.to_string(),
                ids: ids.clone(),
                chain,
            };
            generator.generate(&ctx).await?
        } else {
            let Some(raw) = self.loader.load(base).await? else {
                return Ok(None);
            };
            GeneratedFixtures::from_json(raw.as_ref().clone()).ok_or_else(|| ImportError::Load {
                id: base.to_string(),
                message: "collection data must be an array or an object".to_string(),
            })?
        };

        info!(collection = %base, entries = output.len(), "generated fixtures found");
        self.stats.lock().record_module(base);
        let entries = match output {
            GeneratedFixtures::Keyed(entries) => entries,
            GeneratedFixtures::Sequence(items) => {
                items.into_iter().map(|item| (ids.next_id(), item)).collect()
            }
        };
        Ok(Some(Arc::new(LoadedBatch {
            entries: entries
                .into_iter()
                .map(|(name, value)| (name, Arc::new(value)))
                .collect(),
        })))
    }

    /// Imports a batch entry by entry; memoized per collection.
    pub(crate) async fn generated_fixtures(
        &self,
        base: &str,
    ) -> ImportResult<Option<Arc<GeneratedSet>>> {
        let base = self.canonical_base(base);
        self.generated
            .get_or_try_init(base.clone(), || self.import_generated(&base))
            .await
    }

    async fn import_generated(&self, base: &str) -> ImportResult<Option<Arc<GeneratedSet>>> {
        let Some(batch) = self.loaded_batch(base, &[]).await? else {
            return Ok(None);
        };
        let marker = ResolutionMeta::generated(base);
        let chain = marker.chain();
        let mut entries = Vec::with_capacity(batch.entries.len());
        for (name, raw) in &batch.entries {
            let fixture_id = id::join(base, name);
            let attributes =
                attributes_from_json(raw.as_ref().clone()).ok_or_else(|| ImportError::Load {
                    id: fixture_id.clone(),
                    message: "generated fixture must be an object".to_string(),
                })?;
            let _wait = self.waits.enter(&chain, base, &fixture_id);
            let entity = self
                .run_import(&fixture_id, attributes, Some(marker.clone()))
                .await
                .map_err(|err| self.breadcrumb(&fixture_id, Some(marker.as_ref()), err))?;
            entries.push((name.clone(), entity));
        }
        Ok(Some(Arc::new(GeneratedSet { entries })))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_arrays_and_objects_convert() {
        let sequence = GeneratedFixtures::from_json(json!([{ "a": 1 }, { "a": 2 }])).expect("seq");
        assert!(matches!(&sequence, GeneratedFixtures::Sequence(items) if items.len() == 2));
        let keyed = GeneratedFixtures::from_json(json!({ "first": { "a": 1 } })).expect("keyed");
        assert_eq!(
            keyed,
            GeneratedFixtures::Keyed(vec![("first".to_string(), json!({ "a": 1 }))])
        );
        assert!(GeneratedFixtures::from_json(json!("nope")).is_none());
    }
}
