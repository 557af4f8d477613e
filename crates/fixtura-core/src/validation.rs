use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::schema::{FieldKind, SchemaRegistry};

/// Validate internal consistency of a schema registry.
///
/// This checks:
/// - duplicate collection and model names
/// - reference targets resolve to a registered collection
/// - dynamic references name a declared sibling path
/// - unique fields are declared
pub fn validate_registry(registry: &SchemaRegistry) -> Result<()> {
    let mut collections = BTreeSet::new();
    let mut models = BTreeMap::new();

    for schema in registry.iter() {
        if !collections.insert(schema.collection.clone()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate collection name: {}",
                schema.collection
            )));
        }
        if let Some(previous) = models.insert(schema.model.clone(), schema.collection.clone()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate model name: {} ({} and {})",
                schema.model, previous, schema.collection
            )));
        }
    }

    for schema in registry.iter() {
        for (name, kind) in &schema.fields {
            check_kind(registry, &schema.model, name, kind, &|path: &str| {
                schema.field_kind(path).is_some()
            })?;
        }

        for field in &schema.unique {
            if schema.field_kind(field).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "unique field not found: {}.{}",
                    schema.model, field
                )));
            }
        }
    }

    Ok(())
}

fn check_kind(
    registry: &SchemaRegistry,
    model: &str,
    path: &str,
    kind: &FieldKind,
    declared: &dyn Fn(&str) -> bool,
) -> Result<()> {
    match kind {
        FieldKind::Reference { target } => {
            if registry.lookup(target).is_none() {
                return Err(Error::InvalidSchema(format!(
                    "reference target not found: {model}.{path} -> {target}"
                )));
            }
        }
        FieldKind::DynamicReference { ref_path } => {
            if !declared(ref_path) {
                return Err(Error::InvalidSchema(format!(
                    "dynamic reference path not declared: {model}.{path} -> {ref_path}"
                )));
            }
        }
        FieldKind::Nested { fields } => {
            for (name, kind) in fields {
                check_kind(registry, model, &format!("{path}.{name}"), kind, declared)?;
            }
        }
        FieldKind::Array { of } => check_kind(registry, model, path, of, declared)?,
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CollectionSchema;

    #[test]
    fn accepts_consistent_registry() {
        let registry = SchemaRegistry::new()
            .with(
                CollectionSchema::new("Upload")
                    .field("owner", FieldKind::dynamic_reference("ownerType"))
                    .field("ownerType", FieldKind::String),
            )
            .with(
                CollectionSchema::new("User")
                    .field("email", FieldKind::String)
                    .field("image", FieldKind::reference("Upload"))
                    .unique("email"),
            );
        assert!(validate_registry(&registry).is_ok());
    }

    #[test]
    fn rejects_dangling_reference() {
        let registry = SchemaRegistry::new().with(
            CollectionSchema::new("User").field(
                "profile",
                FieldKind::nested([("shop", FieldKind::reference("Shop"))]),
            ),
        );
        let err = validate_registry(&registry).unwrap_err();
        assert!(err.to_string().contains("User.profile.shop -> Shop"));
    }

    #[test]
    fn rejects_duplicate_collections() {
        let registry = SchemaRegistry::new()
            .with(CollectionSchema::new("User"))
            .with(CollectionSchema::new("Member").collection_name("users"));
        assert!(matches!(
            validate_registry(&registry),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn rejects_undeclared_unique_field() {
        let registry = SchemaRegistry::new().with(CollectionSchema::new("User").unique("email"));
        assert!(validate_registry(&registry).is_err());
    }
}
