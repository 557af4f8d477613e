#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fixtura_core::{CollectionSchema, Entity, FieldKind, SchemaRegistry};
use fixtura_import::{ImportOptions, ImportSession, ImportSessionBuilder, RoleDefinition};
use fixtura_store::MemoryStore;

pub const ADMIN_EMAIL: &str = "admin@example.org";

pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            CollectionSchema::new("User")
                .field("firstName", FieldKind::String)
                .field("lastName", FieldKind::String)
                .field("email", FieldKind::String)
                .field("password", FieldKind::String)
                .field(
                    "roles",
                    FieldKind::array(FieldKind::nested([
                        ("role", FieldKind::String),
                        ("scope", FieldKind::String),
                        ("scopeRef", FieldKind::reference("Organization")),
                    ])),
                )
                .field("image", FieldKind::reference("Upload"))
                .field("avatar", FieldKind::Binary)
                .field("friend", FieldKind::reference("User"))
                .field("bio", FieldKind::String)
                .field("homepage", FieldKind::String)
                .unique("email"),
        )
        .with(
            CollectionSchema::new("Organization")
                .field("name", FieldKind::String)
                .field("owner", FieldKind::reference("User")),
        )
        .with(
            CollectionSchema::new("Post")
                .field("title", FieldKind::String)
                .field("body", FieldKind::String)
                .field("publishedAt", FieldKind::Date)
                .field("author", FieldKind::reference("User"))
                .field("previous", FieldKind::reference("Post"))
                .field("extra", FieldKind::Mixed),
        )
        .with(
            CollectionSchema::new("Comment")
                .field("text", FieldKind::String)
                .field("subjectType", FieldKind::String)
                .field("subject", FieldKind::dynamic_reference("subjectType"))
                .field("snapshot", FieldKind::Mixed)
                .field(
                    "labels",
                    FieldKind::nested([("lookup", FieldKind::Mixed)]),
                ),
        )
        .with(
            CollectionSchema::new("Upload")
                .field("filename", FieldKind::String)
                .field("mimeType", FieldKind::String)
                .field("size", FieldKind::Number)
                .field("owner", FieldKind::reference("User")),
        )
}

pub fn fixture_dir(files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fixtura_import_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    for (relative, contents) in files {
        write(&dir, relative, contents);
    }
    dir
}

pub fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create fixture dir");
    fs::write(path, contents).expect("write fixture");
}

pub fn options(dir: &Path) -> ImportOptions {
    ImportOptions {
        base_dir: dir.to_path_buf(),
        admin_email: Some(ADMIN_EMAIL.to_string()),
        admin_password: Some("secret".to_string()),
        api_url: "https://api.example.org".to_string(),
        ..ImportOptions::default()
    }
    .with_role(RoleDefinition::new("admin", ["global"]))
    .with_role(RoleDefinition::new("viewer", ["organization"]))
}

pub fn builder(dir: &Path) -> (Arc<MemoryStore>, ImportSessionBuilder) {
    let store = Arc::new(MemoryStore::new(schema()));
    let builder = ImportSession::builder(store.clone(), options(dir));
    (store, builder)
}

pub fn session(dir: &Path) -> (Arc<MemoryStore>, ImportSession) {
    let (store, builder) = builder(dir);
    (store, builder.build().expect("build session"))
}

/// Stored copy of an entity, by id.
pub fn stored(store: &MemoryStore, collection: &str, entity: &Entity) -> Entity {
    store
        .all(collection)
        .into_iter()
        .find(|candidate| candidate.id == entity.id)
        .expect("entity is stored")
}
