use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use fixtura_core::SchemaRegistry;
use fixtura_store::FileSource;

use crate::errors::{ImportError, ImportResult};
use crate::pending::PendingOps;

/// Extensions fixture definitions may be written in.
pub const DATA_EXTENSIONS: &[&str] = &["json", "toml"];

/// Pristine fixture definition shared by every consumer of the cache.
pub type RawDefinition = Arc<Value>;

/// Context handed to code modules when they are built.
#[derive(Debug, Clone, Copy)]
pub struct ModuleArgs<'a> {
    pub id: &'a str,
    pub base_dir: &'a Path,
}

/// Fixture definition produced by code rather than a data file.
#[async_trait]
pub trait FixtureModule: Send + Sync {
    async fn build(&self, args: ModuleArgs<'_>) -> ImportResult<Value>;
}

/// A registered code module.
#[derive(Clone)]
pub enum ModuleSource {
    Static(RawDefinition),
    Factory(Arc<dyn FixtureModule>),
}

impl From<Arc<dyn FixtureModule>> for ModuleSource {
    fn from(factory: Arc<dyn FixtureModule>) -> Self {
        ModuleSource::Factory(factory)
    }
}

impl From<Value> for ModuleSource {
    fn from(value: Value) -> Self {
        ModuleSource::Static(Arc::new(value))
    }
}

/// Resolves fixture ids to raw definitions, memoized per id.
pub struct ModuleLoader {
    base_dir: PathBuf,
    files: Arc<dyn FileSource>,
    modules: BTreeMap<String, ModuleSource>,
    cache: PendingOps<String, Option<RawDefinition>>,
}

impl ModuleLoader {
    pub fn new(base_dir: impl Into<PathBuf>, files: Arc<dyn FileSource>) -> Self {
        Self {
            base_dir: base_dir.into(),
            files,
            modules: BTreeMap::new(),
            cache: PendingOps::default(),
        }
    }

    pub fn register(&mut self, id: impl Into<String>, source: ModuleSource) {
        self.modules.insert(id.into(), source);
    }

    /// Raw definition for `id`, or `None` when no source matches.
    ///
    /// Repeated and concurrent loads of one id share a single read.
    pub async fn load(&self, id: &str) -> ImportResult<Option<RawDefinition>> {
        self.cache
            .get_or_try_init(id.to_string(), || self.load_uncached(id))
            .await
    }

    /// Like `load`, failing `NotFound` when nothing matches.
    pub async fn require(&self, id: &str) -> ImportResult<RawDefinition> {
        self.load(id)
            .await?
            .ok_or_else(|| ImportError::NotFound(id.to_string()))
    }

    async fn load_uncached(&self, id: &str) -> ImportResult<Option<RawDefinition>> {
        if let Some(source) = self.modules.get(id) {
            debug!(id = %id, "loading code module");
            return match source {
                ModuleSource::Static(value) => Ok(Some(value.clone())),
                ModuleSource::Factory(factory) => {
                    let args = ModuleArgs {
                        id,
                        base_dir: &self.base_dir,
                    };
                    let value = factory.build(args).await.map_err(|err| ImportError::Load {
                        id: id.to_string(),
                        message: err.to_string(),
                    })?;
                    Ok(Some(Arc::new(value)))
                }
            };
        }

        for path in self.candidates(id) {
            if self.files.exists(&path).await {
                debug!(id = %id, path = %path.display(), "loading fixture file");
                let text = self.files.read_text(&path).await?;
                return parse_definition(id, &path, &text).map(|value| Some(Arc::new(value)));
            }
        }
        Ok(None)
    }

    /// Files that may hold the definition of `id`, in lookup order.
    pub fn candidates(&self, id: &str) -> Vec<PathBuf> {
        let root = self.base_dir.join(id);
        let mut paths = Vec::new();
        if has_data_extension(&root) {
            paths.push(root.clone());
        }
        for ext in DATA_EXTENSIONS {
            paths.push(PathBuf::from(format!("{}.{ext}", root.display())));
        }
        for ext in DATA_EXTENSIONS {
            paths.push(root.join(format!("index.{ext}")));
        }
        paths
    }

    /// Fixture names under `base`, extensionless, `index` files collapsed
    /// onto their directory, plus code modules registered under `base/`.
    pub async fn list_directory(&self, base: &str) -> ImportResult<Vec<String>> {
        let root = self.base_dir.join(base);
        let mut names = BTreeSet::new();
        for path in self.files.list_files(&root).await? {
            if !has_data_extension(&path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&root) else {
                continue;
            };
            let mut relative = relative.with_extension("");
            if relative.file_name().is_some_and(|name| name == "index") {
                relative.pop();
            }
            let name = path_to_name(&relative);
            if !name.is_empty() {
                names.insert(name);
            }
        }
        let prefix = format!("{base}/");
        for id in self.modules.keys() {
            if let Some(name) = id.strip_prefix(&prefix) {
                if !name.is_empty() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Collections present under the base directory: subdirectories and
    /// collection-level data files (`posts.json`) naming a known schema.
    pub async fn list_collections(&self, schema: &SchemaRegistry) -> ImportResult<Vec<String>> {
        let mut bases = BTreeSet::new();
        for (path, is_dir) in self.files.list_dir(&self.base_dir).await? {
            let name = if is_dir {
                path.file_name()
            } else if has_data_extension(&path) {
                path.file_stem()
            } else {
                None
            };
            if let Some(name) = name.and_then(|name| name.to_str()) {
                if schema.lookup(name).is_some() {
                    bases.insert(name.to_string());
                }
            }
        }
        Ok(bases.into_iter().collect())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

fn has_data_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DATA_EXTENSIONS.contains(&ext))
}

fn path_to_name(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_definition(id: &str, path: &Path, text: &str) -> ImportResult<Value> {
    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str::<Value>(text).map_err(|err| err.to_string()),
        _ => serde_json::from_str::<Value>(text).map_err(|err| err.to_string()),
    };
    parsed.map_err(|message| ImportError::Load {
        id: id.to_string(),
        message: format!("{}: {message}", path.display()),
    })
}
