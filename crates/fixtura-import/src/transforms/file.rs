use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use fixtura_core::{Entity, FieldClass, FieldValue};

use crate::errors::{ImportError, ImportResult};
use crate::meta::ResolutionMeta;
use crate::session::ImportSession;

/// One inline asset link found in markup content.
struct InlineLink {
    start: usize,
    end: usize,
    open: String,
    link: String,
    close: String,
}

impl ImportSession {
    /// Whether `text` is shaped like a local file name: a known extension,
    /// no URL scheme and no line breaks.
    pub fn looks_like_local_file(&self, text: &str) -> bool {
        self.patterns.file.is_match(text)
            && !self.patterns.url.is_match(text)
            && !text.contains('\n')
    }

    /// Resolved path of `text` when it names an existing local file.
    pub(crate) async fn local_file(&self, text: &str, meta: &ResolutionMeta) -> Option<PathBuf> {
        if !self.looks_like_local_file(text) {
            return None;
        }
        let path = self.resolve_relative_file(text, meta).await;
        self.files.exists(&path).await.then_some(path)
    }

    /// Looks next to the fixture first (`<base>/<id>/file`), then one level
    /// up, which is where files sit for generated and flat fixtures.
    pub(crate) async fn resolve_relative_file(&self, file: &str, meta: &ResolutionMeta) -> PathBuf {
        let dir = self.options.base_dir.join(meta.id());
        let direct = normalize(&dir.join(file));
        if self.files.exists(&direct).await {
            return direct;
        }
        normalize(&dir.join("..").join(file))
    }

    pub(crate) async fn transform_file(
        &self,
        path: &str,
        file: &Path,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<FieldValue> {
        let class = meta
            .schema()
            .map(|schema| schema.field_class(path))
            .unwrap_or(FieldClass::Unknown);
        match class {
            FieldClass::Reference => {
                let upload = self.import_upload_path(file, meta).await?;
                Ok(FieldValue::Ref(upload.id))
            }
            FieldClass::Binary => {
                let bytes = self.import_buffer(file).await?;
                Ok(FieldValue::Binary(bytes.as_ref().clone()))
            }
            _ => Ok(FieldValue::String(self.import_content(file, meta).await?)),
        }
    }

    /// Creates (once per file and fixture) an upload for `file`, resolved
    /// relative to the fixture in `meta`.
    pub async fn import_upload(&self, file: &str, meta: &Arc<ResolutionMeta>) -> ImportResult<Entity> {
        let path = self.resolve_relative_file(file, meta).await;
        self.import_upload_path(&path, meta).await
    }

    pub(crate) async fn import_upload_path(
        &self,
        file: &Path,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Entity> {
        let key = (file.to_path_buf(), meta.id().to_string());
        let upload = self
            .upload_cache
            .get_or_try_init(key, || self.create_upload(file, meta))
            .await?;
        Ok(self.latest(&upload))
    }

    async fn create_upload(&self, file: &Path, meta: &Arc<ResolutionMeta>) -> ImportResult<Entity> {
        let admin_id = self.options.admin_fixture_id.as_str();
        let owner = if meta.id() == admin_id {
            // The admin's own uploads cannot wait for the admin to exist.
            self.placeholder(admin_id)
        } else {
            let upload_meta = ResolutionMeta::upload(file.display().to_string(), meta.clone());
            self.resolve_reference(admin_id, &upload_meta).await?.id()
        };
        debug!(path = %file.display(), owner = %owner, "creating upload");
        let upload = self.uploads.create_upload(file, owner).await?;
        self.stats.lock().record_upload();
        if let Some(schema) = self.store.schema().lookup(&upload.collection) {
            self.placeholders.queue_pending_if_needed(schema, &upload);
        }
        self.flush_pending().await?;
        Ok(upload)
    }

    /// File text, with markup asset links rewritten to upload URLs.
    pub(crate) async fn import_content(
        &self,
        file: &Path,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<String> {
        let text = self
            .contents
            .get_or_try_init(file.to_path_buf(), || async {
                Ok::<_, ImportError>(self.files.read_text(file).await?)
            })
            .await?;
        if self.patterns.markup.is_match(&file.to_string_lossy()) {
            self.inline_content_files(&text, meta).await
        } else {
            Ok(text)
        }
    }

    async fn inline_content_files(
        &self,
        content: &str,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<String> {
        let links: Vec<InlineLink> = self
            .patterns
            .inline
            .captures_iter(content)
            .filter_map(|caps| {
                let all = caps.get(0)?;
                Some(InlineLink {
                    start: all.start(),
                    end: all.end(),
                    open: caps.get(1)?.as_str().to_string(),
                    link: caps.get(2)?.as_str().to_string(),
                    close: caps.get(3)?.as_str().to_string(),
                })
            })
            .filter(|link| !self.patterns.url.is_match(&link.link))
            .collect();

        let mut out = String::with_capacity(content.len());
        let mut last = 0;
        for link in links {
            let upload = self.import_upload(&link.link, meta).await?;
            out.push_str(&content[last..link.start]);
            out.push_str(&link.open);
            out.push_str(&self.options.upload_url(&upload.id.to_string()));
            out.push_str(&link.close);
            last = link.end;
        }
        out.push_str(&content[last..]);
        Ok(out)
    }

    pub(crate) async fn import_buffer(&self, file: &Path) -> ImportResult<Arc<Vec<u8>>> {
        self.buffers
            .get_or_try_init(file.to_path_buf(), || async {
                Ok::<_, ImportError>(Arc::new(self.files.read_bytes(file).await?))
            })
            .await
    }
}

/// Lexically resolves `.` and `..` so one file has one cache key.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_parent_segments() {
        assert_eq!(
            normalize(Path::new("/seed/users/admin/../logo.png")),
            PathBuf::from("/seed/users/logo.png")
        );
        assert_eq!(normalize(Path::new("../a/./b")), PathBuf::from("../a/b"));
    }
}
