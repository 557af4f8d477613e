//! Custom token transforms, invoked as `<name:payload>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use fixtura_core::FieldValue;

use crate::errors::{ImportError, ImportResult};
use crate::meta::ResolutionMeta;
use crate::resolver::Resolution;
use crate::session::{ImportContext, ImportSession};
use crate::time::{format_timestamp, relative_time};

/// A named function computing a field value from a token payload.
#[async_trait]
pub trait CustomTransform: Send + Sync {
    async fn apply(
        &self,
        payload: &str,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue>;
}

/// Adapts a plain closure over the payload.
pub struct FnTransform<F>(pub F);

#[async_trait]
impl<F> CustomTransform for FnTransform<F>
where
    F: Fn(&str) -> ImportResult<FieldValue> + Send + Sync,
{
    async fn apply(
        &self,
        payload: &str,
        _meta: &Arc<ResolutionMeta>,
        _ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue> {
        (self.0)(payload)
    }
}

/// Boxes a closure over the payload as a custom transform.
pub fn custom_fn<F>(transform: F) -> Arc<dyn CustomTransform>
where
    F: Fn(&str) -> ImportResult<FieldValue> + Send + Sync + 'static,
{
    Arc::new(FnTransform(transform))
}

/// Custom transforms by name.
#[derive(Clone)]
pub struct CustomTransforms {
    entries: BTreeMap<String, Arc<dyn CustomTransform>>,
}

impl Default for CustomTransforms {
    fn default() -> Self {
        let mut transforms = Self::empty();
        transforms.register("env", Arc::new(EnvTransform));
        transforms.register("ref", Arc::new(RefTransform));
        transforms.register("obj", Arc::new(ObjTransform));
        transforms.register("upload", Arc::new(UploadTransform));
        transforms.register("rel", Arc::new(RelTransform));
        transforms
    }
}

impl CustomTransforms {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Adds `transform`, replacing any existing one of the same name.
    pub fn register(&mut self, name: impl Into<String>, transform: Arc<dyn CustomTransform>) {
        self.entries.insert(name.into(), transform);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CustomTransform>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// `<env:NAME>`: environment variable, `null` when unset.
struct EnvTransform;

#[async_trait]
impl CustomTransform for EnvTransform {
    async fn apply(
        &self,
        payload: &str,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue> {
        match std::env::var(payload) {
            Ok(value) => Ok(FieldValue::String(value)),
            Err(_) => {
                if ctx.should_log(&format!("env:{payload}")) {
                    warn!(id = %meta.id(), variable = %payload, "environment variable is not set");
                }
                Ok(FieldValue::Null)
            }
        }
    }
}

/// `<ref:collection/name>`: id of the referenced fixture.
struct RefTransform;

#[async_trait]
impl CustomTransform for RefTransform {
    async fn apply(
        &self,
        payload: &str,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue> {
        let resolution = ctx.resolve_reference(payload, meta).await?;
        Ok(FieldValue::Ref(resolution.id()))
    }
}

/// `<obj:collection/name>`: plain snapshot of the referenced fixture.
struct ObjTransform;

#[async_trait]
impl CustomTransform for ObjTransform {
    async fn apply(
        &self,
        payload: &str,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue> {
        match ctx.resolve_reference(payload, meta).await? {
            Resolution::Resolved(entity) => Ok(FieldValue::Object(ctx.latest(&entity).to_object())),
            Resolution::Deferred(_) => Err(ImportError::CircularReference(
                meta.render_chain(Some(payload)),
            )),
        }
    }
}

/// `<upload:path>`: id of an upload created from `path`.
struct UploadTransform;

#[async_trait]
impl CustomTransform for UploadTransform {
    async fn apply(
        &self,
        payload: &str,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue> {
        let upload = ctx.import_upload(payload, meta).await?;
        Ok(FieldValue::Ref(upload.id))
    }
}

/// `<rel:-2 days>`: absolute timestamp relative to now.
struct RelTransform;

#[async_trait]
impl CustomTransform for RelTransform {
    async fn apply(
        &self,
        payload: &str,
        _meta: &Arc<ResolutionMeta>,
        _ctx: ImportContext<'_>,
    ) -> ImportResult<FieldValue> {
        let timestamp = relative_time(payload, Utc::now())?;
        Ok(FieldValue::String(format_timestamp(timestamp)))
    }
}

impl ImportSession {
    /// Dispatches a `<name:payload>` token to its registered transform.
    pub(crate) async fn transform_custom(
        &self,
        value: &str,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<FieldValue> {
        let (name, payload) = self
            .patterns
            .custom
            .captures(value)
            .and_then(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .ok_or_else(|| ImportError::UnknownTransform(value.to_string()))?;
        let transform = self
            .custom
            .get(name)
            .ok_or_else(|| ImportError::UnknownTransform(name.to_string()))?;
        transform.apply(payload, meta, self.context()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ships_builtins_and_allows_overrides() {
        let mut transforms = CustomTransforms::default();
        let names: Vec<&str> = transforms.names().collect();
        assert_eq!(names, vec!["env", "obj", "ref", "rel", "upload"]);

        transforms.register(
            "env",
            custom_fn(|payload| Ok(FieldValue::from(payload.to_uppercase()))),
        );
        assert!(transforms.get("env").is_some());
        assert!(transforms.get("missing").is_none());
    }
}
