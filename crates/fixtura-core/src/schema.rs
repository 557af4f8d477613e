use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{camel_case, kebab_case, plural_camel, plural_kebab};
use crate::value::{Attributes, FieldValue, ObjectId};

/// Top-level schema document, as read from `schema.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Contract version for this schema format.
    #[serde(default)]
    pub schema_version: Option<String>,
    pub collections: Vec<CollectionSchema>,
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    /// Free-form value; nothing below it is declared.
    Mixed,
    /// Reference to an entity of a fixed model.
    Reference { target: String },
    /// Reference whose model is named by a sibling field.
    DynamicReference { ref_path: String },
    Binary,
    Nested { fields: BTreeMap<String, FieldKind> },
    Array { of: Box<FieldKind> },
}

impl FieldKind {
    pub fn reference(target: impl Into<String>) -> Self {
        FieldKind::Reference {
            target: target.into(),
        }
    }

    pub fn dynamic_reference(ref_path: impl Into<String>) -> Self {
        FieldKind::DynamicReference {
            ref_path: ref_path.into(),
        }
    }

    pub fn array(of: FieldKind) -> Self {
        FieldKind::Array { of: Box::new(of) }
    }

    pub fn nested<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldKind)>,
        K: Into<String>,
    {
        FieldKind::Nested {
            fields: fields
                .into_iter()
                .map(|(key, kind)| (key.into(), kind))
                .collect(),
        }
    }

    pub fn class(&self) -> FieldClass {
        match self {
            FieldKind::String
            | FieldKind::Number
            | FieldKind::Boolean
            | FieldKind::Date
            | FieldKind::Mixed => FieldClass::Primitive,
            FieldKind::Reference { .. } | FieldKind::DynamicReference { .. } => {
                FieldClass::Reference
            }
            FieldKind::Binary => FieldClass::Binary,
            FieldKind::Nested { .. } | FieldKind::Array { .. } => FieldClass::Nested,
        }
    }

    fn child(&self, segment: &str) -> Option<&FieldKind> {
        match self {
            FieldKind::Nested { fields } => fields.get(segment),
            FieldKind::Array { of } => {
                if segment.parse::<usize>().is_ok() {
                    Some(of)
                } else {
                    of.child(segment)
                }
            }
            _ => None,
        }
    }
}

/// Coarse classification used by the field transform dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Primitive,
    Reference,
    Binary,
    Nested,
    Unknown,
}

/// Where a reference field points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// A model or collection name.
    Collection(String),
    /// Dotted path of a sibling field naming the model.
    Dynamic(String),
}

/// Schema descriptor for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Model name, e.g. `UserProfile`.
    pub model: String,
    /// Directory/collection name, e.g. `user-profiles`.
    #[serde(default)]
    pub collection: String,
    /// Singular kebab name used for generated ids, e.g. `user-profile`.
    #[serde(default)]
    pub singular: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,
    #[serde(default)]
    pub unique: Vec<String>,
}

impl CollectionSchema {
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            collection: plural_kebab(&model),
            singular: kebab_case(&model),
            model,
            fields: BTreeMap::new(),
            unique: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn unique(mut self, name: impl Into<String>) -> Self {
        self.unique.push(name.into());
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }

    /// Fills derived names left empty by a deserialized document.
    pub fn normalized(mut self) -> Self {
        if self.collection.is_empty() {
            self.collection = plural_kebab(&self.model);
        }
        if self.singular.is_empty() {
            self.singular = kebab_case(&self.model);
        }
        self
    }

    pub fn has_top_level(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Declared kind at a dotted path; numeric segments step into arrays.
    pub fn field_kind(&self, path: &str) -> Option<&FieldKind> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    pub fn field_class(&self, path: &str) -> FieldClass {
        self.field_kind(path)
            .map(FieldKind::class)
            .unwrap_or(FieldClass::Unknown)
    }

    pub fn reference_target(&self, path: &str) -> Option<RefTarget> {
        match self.field_kind(path)? {
            FieldKind::Reference { target } => Some(RefTarget::Collection(target.clone())),
            FieldKind::DynamicReference { ref_path } => Some(RefTarget::Dynamic(ref_path.clone())),
            _ => None,
        }
    }

    /// Every resolved id held at a reference-typed location, paired with
    /// the top-level field containing it.
    pub fn reference_ids(&self, attributes: &Attributes) -> Vec<(String, ObjectId)> {
        let mut found = Vec::new();
        for (name, kind) in &self.fields {
            if let Some(value) = attributes.get(name) {
                collect_refs(value, kind, &mut |id| found.push((name.clone(), id)));
            }
        }
        found
    }

    /// Replaces reference ids for which `lookup` yields a substitute and
    /// returns the names of the top-level fields that changed.
    pub fn rewrite_references<F>(&self, attributes: &mut Attributes, mut lookup: F) -> Vec<String>
    where
        F: FnMut(&ObjectId) -> Option<ObjectId>,
    {
        let mut changed = Vec::new();
        for (name, kind) in &self.fields {
            if let Some(value) = attributes.get_mut(name) {
                if rewrite_refs(value, kind, &mut lookup) {
                    changed.push(name.clone());
                }
            }
        }
        changed
    }
}

fn collect_refs(value: &FieldValue, kind: &FieldKind, found: &mut dyn FnMut(ObjectId)) {
    match (kind, value) {
        (FieldKind::Reference { .. } | FieldKind::DynamicReference { .. }, FieldValue::Ref(id)) => {
            found(*id)
        }
        (FieldKind::Nested { fields }, FieldValue::Object(map)) => {
            for (name, kind) in fields {
                if let Some(value) = map.get(name) {
                    collect_refs(value, kind, found);
                }
            }
        }
        (FieldKind::Array { of }, FieldValue::Array(items)) => {
            for item in items {
                collect_refs(item, of, found);
            }
        }
        _ => {}
    }
}

fn rewrite_refs<F>(value: &mut FieldValue, kind: &FieldKind, lookup: &mut F) -> bool
where
    F: FnMut(&ObjectId) -> Option<ObjectId>,
{
    match (kind, value) {
        (FieldKind::Reference { .. } | FieldKind::DynamicReference { .. }, FieldValue::Ref(id)) => {
            match lookup(id) {
                Some(resolved) => {
                    *id = resolved;
                    true
                }
                None => false,
            }
        }
        (FieldKind::Nested { fields }, FieldValue::Object(map)) => {
            let mut changed = false;
            for (name, kind) in fields {
                if let Some(value) = map.get_mut(name) {
                    changed |= rewrite_refs(value, kind, lookup);
                }
            }
            changed
        }
        (FieldKind::Array { of }, FieldValue::Array(items)) => {
            let mut changed = false;
            for item in items {
                changed |= rewrite_refs(item, of, lookup);
            }
            changed
        }
        _ => false,
    }
}

/// All collection schemas known to an import, addressable by several
/// spellings of their name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: Vec<Arc<CollectionSchema>>,
    aliases: BTreeMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: SchemaDocument) -> Result<Self> {
        let mut registry = Self::new();
        for schema in document.collections {
            registry.insert(schema);
        }
        crate::validation::validate_registry(&registry)?;
        Ok(registry)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(raw)
            .map_err(|err| Error::InvalidSchema(format!("schema document: {err}")))?;
        Self::from_document(document)
    }

    pub fn with(mut self, schema: CollectionSchema) -> Self {
        self.insert(schema);
        self
    }

    /// Registers a collection under its model name (`UserProfile`), camel
    /// singular (`userProfile`), camel plural (`userProfiles`) and
    /// collection name (`user-profiles`). Earlier registrations keep an
    /// alias they already own.
    pub fn insert(&mut self, schema: CollectionSchema) {
        let schema = schema.normalized();
        let index = self.collections.len();
        let aliases = [
            schema.collection.clone(),
            schema.model.clone(),
            camel_case(&schema.model),
            plural_camel(&schema.model),
        ];
        for alias in aliases {
            self.aliases.entry(alias).or_insert(index);
        }
        self.collections.push(Arc::new(schema));
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<CollectionSchema>> {
        self.aliases
            .get(name)
            .and_then(|index| self.collections.get(*index))
    }

    pub fn require(&self, name: &str) -> Result<&Arc<CollectionSchema>> {
        self.lookup(name)
            .ok_or_else(|| Error::UnknownModel(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CollectionSchema>> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
