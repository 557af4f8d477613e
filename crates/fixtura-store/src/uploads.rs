use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use fixtura_core::{Attributes, Entity, FieldValue, ObjectId};

use crate::adapter::Store;
use crate::error::StoreResult;
use crate::files::FileSource;

/// Turns a local file into a persisted upload entity.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn create_upload(&self, path: &Path, owner: ObjectId) -> StoreResult<Entity>;
}

/// `UploadStore` that records upload metadata in a store collection.
pub struct StoreUploads {
    store: Arc<dyn Store>,
    files: Arc<dyn FileSource>,
    collection: String,
}

impl StoreUploads {
    pub fn new(
        store: Arc<dyn Store>,
        files: Arc<dyn FileSource>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            files,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl UploadStore for StoreUploads {
    async fn create_upload(&self, path: &Path, owner: ObjectId) -> StoreResult<Entity> {
        let bytes = self.files.read_bytes(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut attributes = Attributes::new();
        attributes.insert("filename".to_string(), FieldValue::from(filename));
        attributes.insert(
            "mimeType".to_string(),
            FieldValue::from(mime_type(path)),
        );
        attributes.insert("size".to_string(), FieldValue::Number(bytes.len().into()));
        attributes.insert("owner".to_string(), FieldValue::Ref(owner));

        self.store.create(&self.collection, attributes).await
    }
}

/// Content type guessed from the file extension.
pub fn mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_content_type_from_extension() {
        assert_eq!(mime_type(Path::new("users/logo.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(
            mime_type(Path::new("brief.docx")),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(mime_type(Path::new("blob")), "application/octet-stream");
    }
}
