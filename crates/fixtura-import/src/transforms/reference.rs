use std::sync::Arc;

use fixtura_core::{FieldValue, RefTarget, get_path, id};

use crate::errors::{ImportError, ImportResult};
use crate::meta::ResolutionMeta;
use crate::session::ImportSession;

impl ImportSession {
    /// Resolves a fixture name held by a reference field to an entity id.
    ///
    /// Anything but a string is taken as already resolved and returned as
    /// is, so running the transform twice is harmless.
    pub async fn transform_reference(
        &self,
        path: &str,
        value: FieldValue,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<FieldValue> {
        let FieldValue::String(name) = value else {
            return Ok(value);
        };
        let Some(collection) = self.reference_collection(path, meta)? else {
            return Ok(FieldValue::String(name));
        };
        let id = id::join(&collection, &name);
        let resolution = self.resolve_reference(&id, meta).await?;
        Ok(FieldValue::Ref(resolution.id()))
    }

    /// Collection directory of the entity a reference field points at, or
    /// `None` when `path` is not a reference.
    fn reference_collection(
        &self,
        path: &str,
        meta: &ResolutionMeta,
    ) -> ImportResult<Option<String>> {
        let Some(schema) = meta.schema() else {
            return Ok(None);
        };
        let model = match schema.reference_target(path) {
            None => return Ok(None),
            Some(RefTarget::Collection(target)) => target,
            Some(RefTarget::Dynamic(ref_path)) => meta
                .base()
                .and_then(|base| get_path(base, &ref_path))
                .and_then(FieldValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| ImportError::DynamicReference {
                    path: path.to_string(),
                    ref_path: ref_path.clone(),
                })?,
        };
        let target = self.store.schema().require(&model)?;
        Ok(Some(target.collection.clone()))
    }
}
