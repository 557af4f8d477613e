mod common;

use fixtura_import::load_fixtures;

use common::{fixture_dir, session};

#[tokio::test]
async fn seeds_once_per_store() {
    let dir = fixture_dir(&[
        (
            "users/admin.json",
            r#"{ "name": "Ada Admin", "email": "admin@example.org", "role": "admin" }"#,
        ),
        ("users/jane.json", r#"{ "name": "Jane Doe", "role": "viewer" }"#),
        (
            "organizations/default.json",
            r#"{ "name": "Default", "owner": "admin" }"#,
        ),
    ]);
    let (store, session) = session(&dir);

    assert!(load_fixtures(&session).await.expect("first seed"));
    assert_eq!(store.all("users").len(), 2);
    assert_eq!(store.all("organizations").len(), 1);
    let report = session.report();
    assert_eq!(report.fixtures.len(), 3);
    assert!(report.unresolved_placeholders.is_empty());

    session.reset();
    assert!(!load_fixtures(&session).await.expect("second seed"));
    assert_eq!(store.count(), 3);
}
