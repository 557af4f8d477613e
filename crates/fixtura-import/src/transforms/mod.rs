//! Per-attribute transform dispatch.
//!
//! Each attribute goes through, in priority order: unknown-field check,
//! structured recursion, local file, custom token, reference.

pub mod custom;
pub mod file;
pub mod model;
pub mod reference;

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, try_join_all};
use regex::Regex;
use tracing::warn;

use fixtura_core::{Attributes, FieldValue};

use crate::errors::{ImportError, ImportResult};
use crate::meta::ResolutionMeta;
use crate::session::ImportSession;

const FILE_PATTERN: &str = r"\.(jpg|png|svg|gif|webp|mp3|mp4|md|txt|html|pdf|csv)$";
const URL_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9+.-]*://";
const CUSTOM_PATTERN: &str = r"^<(\w+):(.+)>$";
const INLINE_PATTERN: &str = r#"(\(|")([^)"\n]+?\.(?:jpg|png|svg|gif|webp|pdf))([)"])"#;
const MARKUP_PATTERN: &str = r"\.(md|html)$";

/// Compiled patterns shared by the pipeline.
#[derive(Debug)]
pub(crate) struct Patterns {
    pub(crate) file: Regex,
    pub(crate) url: Regex,
    pub(crate) custom: Regex,
    pub(crate) inline: Regex,
    pub(crate) markup: Regex,
}

impl Patterns {
    pub(crate) fn new() -> ImportResult<Self> {
        Ok(Self {
            file: Regex::new(FILE_PATTERN)?,
            url: Regex::new(URL_PATTERN)?,
            custom: Regex::new(CUSTOM_PATTERN)?,
            inline: Regex::new(INLINE_PATTERN)?,
            markup: Regex::new(MARKUP_PATTERN)?,
        })
    }
}

impl ImportSession {
    /// Transforms every top-level attribute. Siblings run concurrently and
    /// all of them settle before this returns.
    pub async fn transform_attributes(
        &self,
        attributes: Attributes,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Attributes> {
        let pending = attributes.into_iter().map(|(key, value)| async move {
            let value = self
                .transform_property(vec![key.clone()], value, meta, false)
                .await?;
            Ok::<_, ImportError>((key, value))
        });
        Ok(try_join_all(pending).await?.into_iter().collect())
    }

    /// Transforms one value at `keys`. `opaque` marks children of an
    /// undeclared structure: they get file and token handling but no
    /// reference resolution and no bad-data warnings.
    pub(crate) fn transform_property<'a>(
        &'a self,
        keys: Vec<String>,
        value: FieldValue,
        meta: &'a Arc<ResolutionMeta>,
        opaque: bool,
    ) -> BoxFuture<'a, ImportResult<FieldValue>> {
        async move {
            let path = keys.join(".");
            let known = !opaque && self.is_known_field(&keys, meta);
            if !known && !opaque && !value.is_structured() {
                self.log_bad_field(meta, &path, &value);
                return Ok(value);
            }

            match value {
                FieldValue::Object(map) => {
                    let entries = map.into_iter().map(|(key, value)| {
                        let keys = keys.clone();
                        async move {
                            let key = if self.patterns.custom.is_match(&key) {
                                self.transform_key(&key, meta).await?
                            } else {
                                key
                            };
                            let mut child = keys;
                            child.push(key.clone());
                            let value = self.transform_property(child, value, meta, !known).await?;
                            Ok::<_, ImportError>((key, value))
                        }
                    });
                    let entries = try_join_all(entries).await?;
                    Ok(FieldValue::Object(entries.into_iter().collect()))
                }
                FieldValue::Array(items) => {
                    let entries = items.into_iter().enumerate().map(|(index, value)| {
                        let mut child = keys.clone();
                        child.push(index.to_string());
                        self.transform_property(child, value, meta, !known)
                    });
                    Ok(FieldValue::Array(try_join_all(entries).await?))
                }
                FieldValue::String(text) => self.transform_string(&path, text, meta, known).await,
                other => Ok(other),
            }
        }
        .boxed()
    }

    async fn transform_string(
        &self,
        path: &str,
        text: String,
        meta: &Arc<ResolutionMeta>,
        known: bool,
    ) -> ImportResult<FieldValue> {
        if let Some(file) = self.local_file(&text, meta).await {
            return self.transform_file(path, &file, meta).await;
        }
        if self.patterns.custom.is_match(&text) {
            return self.transform_custom(&text, meta).await;
        }
        if known {
            return self.transform_reference(path, FieldValue::String(text), meta).await;
        }
        Ok(FieldValue::String(text))
    }

    /// Resolves a custom-token object key to its string form.
    async fn transform_key(&self, key: &str, meta: &Arc<ResolutionMeta>) -> ImportResult<String> {
        match self.transform_custom(key, meta).await? {
            FieldValue::String(value) => Ok(value),
            FieldValue::Ref(id) => Ok(id.to_string()),
            FieldValue::Number(number) => Ok(number.to_string()),
            other => Err(ImportError::InvalidKey(other.render())),
        }
    }

    /// Declared at the top level of the schema, or handled by a model
    /// transform for this exact path.
    pub(crate) fn is_known_field(&self, keys: &[String], meta: &ResolutionMeta) -> bool {
        let Some(schema) = meta.schema() else {
            return false;
        };
        if self.models.handles(&schema.model, &keys.join(".")) {
            return true;
        }
        keys.first().is_some_and(|top| schema.has_top_level(top))
    }

    fn log_bad_field(&self, meta: &ResolutionMeta, path: &str, value: &FieldValue) {
        let rendered = value.render();
        if self.logged.first(format!("bad-field:{}:{path}:{rendered}", meta.id())) {
            warn!(
                id = %meta.id(),
                field = %path,
                value = %rendered,
                "unknown field, possible bad fixture data"
            );
        }
    }
}
