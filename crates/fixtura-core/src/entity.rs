use serde::Serialize;

use crate::value::{Attributes, FieldValue, ObjectId, get_path};

/// A persisted document as returned by a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: ObjectId,
    pub collection: String,
    pub attributes: Attributes,
}

impl Entity {
    pub fn new(id: ObjectId, collection: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id,
            collection: collection.into(),
            attributes,
        }
    }

    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        get_path(&self.attributes, path)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(FieldValue::as_str)
    }

    /// Plain snapshot of the entity including its `id`.
    pub fn to_object(&self) -> Attributes {
        let mut object = self.attributes.clone();
        object.insert("id".to_string(), FieldValue::Ref(self.id));
        object
    }
}
