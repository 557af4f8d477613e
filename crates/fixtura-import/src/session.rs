use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tracing::{debug, error};

use fixtura_core::{Attributes, CollectionSchema, Entity, ObjectId, attributes_from_json, id};
use fixtura_store::{FileSource, LocalFiles, Store, StoreUploads, UploadStore};

use crate::errors::{ImportError, ImportResult};
use crate::generated::{GeneratedModule, GeneratedSet, LoadedBatch};
use crate::loader::{ModuleLoader, ModuleSource};
use crate::meta::ResolutionMeta;
use crate::model::{ImportOptions, ImportReport};
use crate::pending::{LogOnce, PendingOps, WaitGraph};
use crate::placeholders::PlaceholderRegistry;
use crate::resolver::Resolution;
use crate::transforms::Patterns;
use crate::transforms::custom::{CustomTransform, CustomTransforms};
use crate::transforms::model::{ModelTransform, ModelTransforms};

/// Result of `import_fixtures`: one entity, or a named set of results.
#[derive(Debug, Clone)]
pub enum Imported {
    Entity(Entity),
    Set(BTreeMap<String, Imported>),
}

impl Imported {
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Imported::Entity(entity) => Some(entity),
            Imported::Set(_) => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Imported::Entity(entity) => Some(entity),
            Imported::Set(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Imported> {
        match self {
            Imported::Set(entries) => entries.get(key),
            Imported::Entity(_) => None,
        }
    }

    /// Entity stored under `key` of a set.
    pub fn entity(&self, key: &str) -> Option<&Entity> {
        self.get(key).and_then(Imported::as_entity)
    }

    pub fn len(&self) -> usize {
        match self {
            Imported::Entity(_) => 1,
            Imported::Set(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything one import run shares: capabilities, registries and caches.
///
/// Caches live until `reset`; two independent runs should either use two
/// sessions or reset in between.
pub struct ImportSession {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) files: Arc<dyn FileSource>,
    pub(crate) uploads: Arc<dyn UploadStore>,
    pub(crate) options: ImportOptions,
    pub(crate) patterns: Patterns,
    pub(crate) custom: CustomTransforms,
    pub(crate) models: ModelTransforms,
    pub(crate) loader: ModuleLoader,
    pub(crate) generators: BTreeMap<String, Arc<dyn GeneratedModule>>,
    pub(crate) creations: PendingOps<String, Entity>,
    pub(crate) upload_cache: PendingOps<(PathBuf, String), Entity>,
    pub(crate) contents: PendingOps<PathBuf, String>,
    pub(crate) buffers: PendingOps<PathBuf, Arc<Vec<u8>>>,
    pub(crate) batches: PendingOps<String, Option<Arc<LoadedBatch>>>,
    pub(crate) generated: PendingOps<String, Option<Arc<GeneratedSet>>>,
    pub(crate) placeholders: PlaceholderRegistry,
    pub(crate) waits: WaitGraph,
    pub(crate) logged: LogOnce,
    pub(crate) stats: Mutex<ImportReport>,
    pub(crate) created: Mutex<HashSet<ObjectId>>,
}

/// Builder for [`ImportSession`].
pub struct ImportSessionBuilder {
    store: Arc<dyn Store>,
    options: ImportOptions,
    files: Option<Arc<dyn FileSource>>,
    uploads: Option<Arc<dyn UploadStore>>,
    custom: CustomTransforms,
    models: ModelTransforms,
    modules: Vec<(String, ModuleSource)>,
    generators: Vec<(String, Arc<dyn GeneratedModule>)>,
}

impl ImportSessionBuilder {
    /// File source used for fixture files and content (default: local disk).
    pub fn files(mut self, files: Arc<dyn FileSource>) -> Self {
        self.files = Some(files);
        self
    }

    /// Upload sink (default: records uploads in the uploads collection).
    pub fn uploads(mut self, uploads: Arc<dyn UploadStore>) -> Self {
        self.uploads = Some(uploads);
        self
    }

    pub fn custom_transform(
        mut self,
        name: impl Into<String>,
        transform: Arc<dyn CustomTransform>,
    ) -> Self {
        self.custom.register(name, transform);
        self
    }

    pub fn model_transform(
        mut self,
        model: impl Into<String>,
        field: impl Into<String>,
        transform: Arc<dyn ModelTransform>,
    ) -> Self {
        self.models.register(model, field, transform);
        self
    }

    /// Registers a code module for the exact fixture id.
    pub fn module(mut self, id: impl Into<String>, source: impl Into<ModuleSource>) -> Self {
        self.modules.push((id.into(), source.into()));
        self
    }

    /// Registers a generator producing every fixture of `collection`.
    pub fn generated(
        mut self,
        collection: impl Into<String>,
        generator: Arc<dyn GeneratedModule>,
    ) -> Self {
        self.generators.push((collection.into(), generator));
        self
    }

    pub fn build(self) -> ImportResult<ImportSession> {
        let files = self.files.unwrap_or_else(|| Arc::new(LocalFiles));
        let uploads = match self.uploads {
            Some(uploads) => uploads,
            None => Arc::new(StoreUploads::new(
                self.store.clone(),
                files.clone(),
                self.options.uploads_collection.clone(),
            )),
        };

        let mut loader = ModuleLoader::new(self.options.base_dir.clone(), files.clone());
        for (id, source) in self.modules {
            loader.register(id, source);
        }

        let mut generators = BTreeMap::new();
        for (name, generator) in self.generators {
            let schema = self.store.schema().require(&name)?;
            generators.insert(schema.collection.clone(), generator);
        }

        Ok(ImportSession {
            store: self.store,
            files,
            uploads,
            options: self.options,
            patterns: Patterns::new()?,
            custom: self.custom,
            models: self.models,
            loader,
            generators,
            creations: PendingOps::default(),
            upload_cache: PendingOps::default(),
            contents: PendingOps::default(),
            buffers: PendingOps::default(),
            batches: PendingOps::default(),
            generated: PendingOps::default(),
            placeholders: PlaceholderRegistry::default(),
            waits: WaitGraph::default(),
            logged: LogOnce::default(),
            stats: Mutex::new(ImportReport::default()),
            created: Mutex::new(HashSet::new()),
        })
    }
}

impl ImportSession {
    pub fn builder(store: Arc<dyn Store>, options: ImportOptions) -> ImportSessionBuilder {
        ImportSessionBuilder {
            store,
            options,
            files: None,
            uploads: None,
            custom: CustomTransforms::default(),
            models: ModelTransforms::default(),
            modules: Vec::new(),
            generators: Vec::new(),
        }
    }

    /// Session with the built-in transforms and default capabilities.
    pub fn new(store: Arc<dyn Store>, options: ImportOptions) -> ImportResult<Self> {
        Self::builder(store, options).build()
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn placeholders(&self) -> &PlaceholderRegistry {
        &self.placeholders
    }

    /// Imports `id`: the empty id imports every collection, a bare
    /// collection imports its directory or batch, `collection/name` one
    /// entity.
    pub async fn import_fixtures(&self, id: &str) -> ImportResult<Imported> {
        self.import_with_meta(id, None).await
    }

    /// Imports a single fixture and returns its latest snapshot.
    pub async fn import_entity(&self, id: &str) -> ImportResult<Entity> {
        self.import_fixtures(id)
            .await?
            .into_entity()
            .ok_or_else(|| ImportError::NotAnEntity(id.to_string()))
    }

    pub(crate) fn import_with_meta<'a>(
        &'a self,
        id: &'a str,
        meta: Option<Arc<ResolutionMeta>>,
    ) -> BoxFuture<'a, ImportResult<Imported>> {
        async move {
            let (base, name) = id::split(id);
            if base.is_empty() {
                return self.import_root(meta).await;
            }
            let base = self.canonical_base(base);
            if let Some(set) = self.generated_fixtures(&base).await? {
                if name.is_empty() {
                    return Ok(self.generated_set(&set));
                }
                let entity = set.get(name).ok_or_else(|| ImportError::MissingGenerated {
                    base: base.clone(),
                    name: name.to_string(),
                })?;
                return Ok(Imported::Entity(self.latest(entity)));
            }
            if name.is_empty() {
                self.import_directory(&base, meta).await
            } else {
                let fixture_id = id::join(&base, name);
                self.import_fixture(&fixture_id, meta).await.map(Imported::Entity)
            }
        }
        .boxed()
    }

    async fn import_root(&self, meta: Option<Arc<ResolutionMeta>>) -> ImportResult<Imported> {
        let mut bases = self.loader.list_collections(self.store.schema()).await?;
        for base in self.generators.keys() {
            if !bases.contains(base) {
                bases.push(base.clone());
            }
        }
        bases.sort();

        let mut fixtures = BTreeMap::new();
        for base in bases {
            let set = self.import_with_meta(&base, meta.clone()).await?;
            if let Imported::Set(entries) = &set {
                for (name, entry) in entries {
                    fixtures.insert(id::join(&base, name), entry.clone());
                }
            }
            fixtures.insert(base, set);
        }
        Ok(Imported::Set(fixtures))
    }

    async fn import_directory(
        &self,
        base: &str,
        meta: Option<Arc<ResolutionMeta>>,
    ) -> ImportResult<Imported> {
        let mut fixtures = BTreeMap::new();
        for name in self.loader.list_directory(base).await? {
            let imported = self
                .import_with_meta(&id::join(base, &name), meta.clone())
                .await?;
            fixtures.insert(name, imported);
        }
        Ok(Imported::Set(fixtures))
    }

    async fn import_fixture(
        &self,
        id: &str,
        meta: Option<Arc<ResolutionMeta>>,
    ) -> ImportResult<Entity> {
        let result = async {
            let raw = self.loader.require(id).await?;
            let attributes =
                attributes_from_json(raw.as_ref().clone()).ok_or_else(|| ImportError::Load {
                    id: id.to_string(),
                    message: "fixture definition must be an object".to_string(),
                })?;
            self.run_import(id, attributes, meta.clone()).await
        }
        .await;
        result.map_err(|err| self.breadcrumb(id, meta.as_deref(), err))
    }

    /// Creates `id` from `attributes` unless it is already created or in
    /// flight, in which case that result is shared.
    pub(crate) async fn run_import(
        &self,
        id: &str,
        attributes: Attributes,
        parent: Option<Arc<ResolutionMeta>>,
    ) -> ImportResult<Entity> {
        let schema = self.store.schema().require(id::base_of(id))?.clone();
        let meta = ResolutionMeta::fixture(id, schema.clone(), Arc::new(attributes.clone()), parent);
        let entity = self
            .creations
            .get_or_try_init(id.to_string(), || {
                self.create_entity(id, &schema, attributes, &meta)
            })
            .await?;
        Ok(self.latest(&entity))
    }

    async fn create_entity(
        &self,
        id: &str,
        schema: &CollectionSchema,
        attributes: Attributes,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Entity> {
        debug!(id = %id, "importing fixture");
        let attributes = self.transform_attributes(attributes, meta).await?;
        let attributes = self.apply_model_transforms(attributes, meta).await?;
        let entity = self.store.create(&schema.collection, attributes).await?;
        self.created.lock().insert(entity.id);

        self.placeholders.set_resolved(id, &entity);
        self.placeholders.queue_pending_if_needed(schema, &entity);
        self.flush_pending().await?;

        self.stats.lock().record_fixture(id);
        debug!(id = %id, entity = %entity.id, "finished fixture import");
        Ok(entity)
    }

    /// Annotates a fatal error with the chain that led to `id`.
    pub(crate) fn breadcrumb(
        &self,
        id: &str,
        meta: Option<&ResolutionMeta>,
        err: ImportError,
    ) -> ImportError {
        if err.is_recoverable() {
            return err;
        }
        let chain = meta
            .map(|meta| meta.render_chain(Some(id)))
            .unwrap_or_else(|| id.to_string());
        error!(id = %id, chain = %chain, error = %err, "bad fixture or reference");
        match err {
            ImportError::Fixture { .. } => err,
            other => ImportError::Fixture {
                id: id.to_string(),
                chain,
                source: Box::new(other),
            },
        }
    }

    fn generated_set(&self, set: &GeneratedSet) -> Imported {
        Imported::Set(
            set.iter()
                .map(|(name, entity)| (name.to_string(), Imported::Entity(self.latest(entity))))
                .collect(),
        )
    }

    /// Freshest snapshot of `entity`, including placeholder rewrites that
    /// happened after it was created.
    pub fn latest(&self, entity: &Entity) -> Entity {
        self.placeholders.latest(entity)
    }

    /// Whether `entity` was created by this session.
    pub fn is_fixture(&self, entity: &Entity) -> bool {
        self.created.lock().contains(&entity.id)
    }

    /// Statistics gathered since the last reset.
    pub fn report(&self) -> ImportReport {
        let mut report = self.stats.lock().clone();
        report.unresolved_placeholders = self.placeholders.unresolved();
        report
    }

    pub fn reset_report(&self) {
        *self.stats.lock() = ImportReport::default();
    }

    /// Drops every cache so the next import starts from scratch.
    pub fn reset(&self) {
        self.loader.clear();
        self.creations.clear();
        self.upload_cache.clear();
        self.contents.clear();
        self.buffers.clear();
        self.batches.clear();
        self.generated.clear();
        self.placeholders.clear();
        self.waits.clear();
        self.logged.clear();
        self.created.lock().clear();
        self.reset_report();
    }

    /// The handle custom and model transforms receive.
    pub fn context(&self) -> ImportContext<'_> {
        ImportContext { session: self }
    }
}

/// Capabilities handed to custom and model transforms.
#[derive(Clone, Copy)]
pub struct ImportContext<'a> {
    session: &'a ImportSession,
}

impl<'a> ImportContext<'a> {
    pub fn options(&self) -> &'a ImportOptions {
        &self.session.options
    }

    pub fn store(&self) -> &'a dyn Store {
        self.session.store.as_ref()
    }

    /// Imports `id` as a child of `meta`, without the placeholder guards.
    pub async fn import_fixtures(
        &self,
        id: &str,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Imported> {
        self.session.import_with_meta(id, Some(meta.clone())).await
    }

    pub async fn resolve_reference(
        &self,
        id: &str,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Resolution> {
        self.session.resolve_reference(id, meta).await
    }

    pub async fn import_upload(&self, file: &str, meta: &Arc<ResolutionMeta>) -> ImportResult<Entity> {
        self.session.import_upload(file, meta).await
    }

    pub fn latest(&self, entity: &Entity) -> Entity {
        self.session.latest(entity)
    }

    /// True the first time `key` is seen in this session.
    pub fn should_log(&self, key: &str) -> bool {
        self.session.logged.first(key)
    }
}
