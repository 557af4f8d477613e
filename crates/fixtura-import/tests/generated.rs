mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use fixtura_core::FieldValue;
use fixtura_import::{
    GeneratedFixtures, GeneratedModule, GeneratorContext, ImportError, ImportResult,
};

use common::{builder, fixture_dir, session, stored};

const ADMIN: &str = r#"{ "name": "Ada Admin", "email": "admin@example.org" }"#;

/// Three posts by the admin, each pointing at another one of the batch.
struct PostSeries;

#[async_trait]
impl GeneratedModule for PostSeries {
    async fn generate(&self, ctx: &GeneratorContext<'_>) -> ImportResult<GeneratedFixtures> {
        let admin = ctx.load_fixture_modules("users/admin").await?;
        let author = admin.get("name").and_then(Value::as_str).unwrap_or("nobody");
        Ok(GeneratedFixtures::Sequence(vec![
            json!({ "title": format!("{author} part 1"), "author": "admin", "previous": "post-3" }),
            json!({ "title": format!("{author} part 2"), "author": "admin", "previous": "post-1" }),
            json!({ "title": format!("{author} part 3"), "author": "admin" }),
        ]))
    }
}

/// Names its entries up front so they can point at each other.
struct KeyedPosts;

#[async_trait]
impl GeneratedModule for KeyedPosts {
    async fn generate(&self, ctx: &GeneratorContext<'_>) -> ImportResult<GeneratedFixtures> {
        let first = ctx.generate_fixture_id();
        let second = ctx.generate_fixture_id();
        Ok(GeneratedFixtures::Keyed(vec![
            (first.clone(), json!({ "title": ctx.base() })),
            (second, json!({ "title": "follow-up", "previous": first })),
        ]))
    }
}

/// Asks for its own collection while being generated.
struct SelfLoading;

#[async_trait]
impl GeneratedModule for SelfLoading {
    async fn generate(&self, ctx: &GeneratorContext<'_>) -> ImportResult<GeneratedFixtures> {
        ctx.load_fixture_modules("posts").await?;
        Ok(GeneratedFixtures::Sequence(Vec::new()))
    }
}

#[tokio::test]
async fn generated_sequence_is_named_and_linked_in_order() {
    let dir = fixture_dir(&[("users/admin.json", ADMIN)]);
    let (store, builder) = builder(&dir);
    let session = builder
        .generated("Post", Arc::new(PostSeries))
        .build()
        .expect("session");

    let posts = session.import_fixtures("posts").await.expect("generated posts");
    assert_eq!(posts.len(), 3);
    let first = posts.entity("post-1").expect("post-1");
    let second = posts.entity("post-2").expect("post-2");
    let third = posts.entity("post-3").expect("post-3");
    let admin = session.import_entity("users/admin").await.expect("admin");

    assert_eq!(first.get_str("title"), Some("Ada Admin part 1"));
    assert_eq!(first.get("author"), Some(&FieldValue::Ref(admin.id)));
    assert_eq!(
        stored(&store, "posts", first).get("previous"),
        Some(&FieldValue::Ref(third.id))
    );
    assert_eq!(first.get("previous"), Some(&FieldValue::Ref(third.id)));
    assert_eq!(second.get("previous"), Some(&FieldValue::Ref(first.id)));
    assert!(third.get("previous").is_none());

    let single = session.import_entity("posts/post-2").await.expect("single entry");
    assert_eq!(single.id, second.id);
    let err = session
        .import_entity("posts/post-9")
        .await
        .expect_err("outside the batch");
    assert!(matches!(err, ImportError::MissingGenerated { ref name, .. } if name == "post-9"));

    let report = session.report();
    assert_eq!(report.modules, vec!["posts".to_string()]);
    assert!(report.unresolved_placeholders.is_empty());
    assert_eq!(store.all("posts").len(), 3);

    let ctx = session.context();
    assert!(!ctx.should_log("generated:posts/post-3"), "deferral already logged");
    assert!(!ctx.should_log("generated:posts/post-1"), "deferral already logged");
    assert!(ctx.should_log("generated:posts/post-2"));
}

#[tokio::test]
async fn keyed_generator_uses_its_own_names() {
    let dir = fixture_dir(&[]);
    let (_store, builder) = builder(&dir);
    let session = builder
        .generated("posts", Arc::new(KeyedPosts))
        .build()
        .expect("session");

    let posts = session.import_fixtures("Post").await.expect("generated posts");
    let first = posts.entity("post-1").expect("post-1");
    let second = posts.entity("post-2").expect("post-2");
    assert_eq!(first.get_str("title"), Some("posts"));
    assert_eq!(second.get("previous"), Some(&FieldValue::Ref(first.id)));
}

#[tokio::test]
async fn generator_loading_its_own_collection_conflicts() {
    let dir = fixture_dir(&[]);
    let (_store, builder) = builder(&dir);
    let session = builder
        .generated("posts", Arc::new(SelfLoading))
        .build()
        .expect("session");

    let err = session.import_fixtures("posts").await.expect_err("conflict");
    assert!(matches!(err.root_cause(), ImportError::GeneratedConflict(_)));
}

#[tokio::test]
async fn collection_data_file_is_a_batch() {
    let dir = fixture_dir(&[
        ("users/admin.json", ADMIN),
        (
            "posts.json",
            r#"[
                { "title": "First", "author": "admin" },
                { "title": "Second", "author": "admin", "previous": "post-1" }
            ]"#,
        ),
    ]);
    let (_store, session) = session(&dir);

    let everything = session.import_fixtures("").await.expect("import root");
    let first = everything.entity("posts/post-1").expect("post-1");
    let second = everything.entity("posts/post-2").expect("post-2");
    let admin = everything.entity("users/admin").expect("admin");
    assert_eq!(first.get("author"), Some(&FieldValue::Ref(admin.id)));
    assert_eq!(second.get("previous"), Some(&FieldValue::Ref(first.id)));
    assert_eq!(everything.get("posts").map(|set| set.len()), Some(2));

    let report = session.report();
    assert_eq!(report.modules, vec!["posts".to_string()]);
    assert_eq!(report.fixtures.len(), 3);
}
