//! Per-model post-transforms, applied after the field pipeline and before
//! the entity is persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use fixtura_core::{Attributes, FieldValue, id};

use crate::errors::{ImportError, ImportResult};
use crate::meta::ResolutionMeta;
use crate::session::{ImportContext, ImportSession};

#[async_trait]
pub trait ModelTransform: Send + Sync {
    async fn apply(
        &self,
        attributes: &mut Attributes,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<()>;
}

/// Adapts a plain closure over the attributes.
pub struct FnModelTransform<F>(pub F);

#[async_trait]
impl<F> ModelTransform for FnModelTransform<F>
where
    F: Fn(&mut Attributes) -> ImportResult<()> + Send + Sync,
{
    async fn apply(
        &self,
        attributes: &mut Attributes,
        _meta: &Arc<ResolutionMeta>,
        _ctx: ImportContext<'_>,
    ) -> ImportResult<()> {
        (self.0)(attributes)
    }
}

/// Boxes a closure over the attributes as a model transform.
pub fn model_fn<F>(transform: F) -> Arc<dyn ModelTransform>
where
    F: Fn(&mut Attributes) -> ImportResult<()> + Send + Sync + 'static,
{
    Arc::new(FnModelTransform(transform))
}

/// Ordered post-transforms per model, keyed by the field they handle.
#[derive(Clone)]
pub struct ModelTransforms {
    entries: BTreeMap<String, Vec<(String, Arc<dyn ModelTransform>)>>,
}

impl Default for ModelTransforms {
    fn default() -> Self {
        let mut transforms = Self::empty();
        transforms.register("User", "name", Arc::new(SplitName));
        transforms.register("User", "email", Arc::new(DefaultEmail));
        transforms.register("User", "role", Arc::new(AssignRole));
        transforms.register("User", "password", Arc::new(DefaultPassword));
        transforms
    }
}

impl ModelTransforms {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Appends a transform for `model.field`; an existing entry for the
    /// same field is replaced where it stands.
    pub fn register(
        &mut self,
        model: impl Into<String>,
        field: impl Into<String>,
        transform: Arc<dyn ModelTransform>,
    ) {
        let field = field.into();
        let list = self.entries.entry(model.into()).or_default();
        match list.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = transform,
            None => list.push((field, transform)),
        }
    }

    pub fn handles(&self, model: &str, path: &str) -> bool {
        self.entries
            .get(model)
            .is_some_and(|list| list.iter().any(|(field, _)| field == path))
    }

    pub fn fields(&self, model: &str) -> Vec<&str> {
        self.entries
            .get(model)
            .map(|list| list.iter().map(|(field, _)| field.as_str()).collect())
            .unwrap_or_default()
    }

    fn for_model(&self, model: &str) -> Vec<Arc<dyn ModelTransform>> {
        self.entries
            .get(model)
            .map(|list| list.iter().map(|(_, transform)| transform.clone()).collect())
            .unwrap_or_default()
    }
}

/// `name: "Marlon Brando"` becomes `firstName` and `lastName`.
struct SplitName;

#[async_trait]
impl ModelTransform for SplitName {
    async fn apply(
        &self,
        attributes: &mut Attributes,
        _meta: &Arc<ResolutionMeta>,
        _ctx: ImportContext<'_>,
    ) -> ImportResult<()> {
        let Some(FieldValue::String(name)) = attributes.get("name").cloned() else {
            return Ok(());
        };
        if name.is_empty() {
            return Ok(());
        }
        let (first, last) = name.split_once(' ').unwrap_or((name.as_str(), ""));
        attributes.insert("firstName".to_string(), FieldValue::from(first));
        attributes.insert("lastName".to_string(), FieldValue::from(last));
        attributes.remove("name");
        Ok(())
    }
}

/// Missing email defaults to `<kebab first name>@<admin email domain>`.
struct DefaultEmail;

#[async_trait]
impl ModelTransform for DefaultEmail {
    async fn apply(
        &self,
        attributes: &mut Attributes,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<()> {
        if is_set(attributes.get("email")) {
            return Ok(());
        }
        let Some(first) = attributes.get("firstName").and_then(FieldValue::as_str) else {
            return Ok(());
        };
        let domain = ctx.options().admin_domain().ok_or_else(|| {
            ImportError::Config(format!(
                "admin email is required to derive an email for {}",
                meta.id()
            ))
        })?;
        let email = format!("{}@{domain}", id::kebab_case(first));
        attributes.insert("email".to_string(), FieldValue::String(email));
        Ok(())
    }
}

/// `role: "<name>"` becomes a one-element `roles` list, scoped globally
/// when the role allows it, otherwise to the default organization.
struct AssignRole;

#[async_trait]
impl ModelTransform for AssignRole {
    async fn apply(
        &self,
        attributes: &mut Attributes,
        meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<()> {
        let Some(FieldValue::String(role)) = attributes.get("role").cloned() else {
            return Ok(());
        };
        let options = ctx.options();
        let definition = options
            .roles
            .get(&role)
            .ok_or_else(|| ImportError::Config(format!("unknown role `{role}` in {}", meta.id())))?;

        let mut entry = Attributes::new();
        entry.insert("role".to_string(), FieldValue::from(role.as_str()));
        if definition.is_global() {
            entry.insert("scope".to_string(), FieldValue::from("global"));
        } else {
            let organization = ctx
                .resolve_reference(&options.organization_fixture_id, meta)
                .await?;
            entry.insert("scope".to_string(), FieldValue::from("organization"));
            entry.insert("scopeRef".to_string(), FieldValue::Ref(organization.id()));
        }
        attributes.insert(
            "roles".to_string(),
            FieldValue::Array(vec![FieldValue::Object(entry)]),
        );
        attributes.remove("role");
        Ok(())
    }
}

/// Missing password defaults to the admin password.
struct DefaultPassword;

#[async_trait]
impl ModelTransform for DefaultPassword {
    async fn apply(
        &self,
        attributes: &mut Attributes,
        _meta: &Arc<ResolutionMeta>,
        ctx: ImportContext<'_>,
    ) -> ImportResult<()> {
        if is_set(attributes.get("password")) {
            return Ok(());
        }
        if let Some(password) = &ctx.options().admin_password {
            attributes.insert("password".to_string(), FieldValue::from(password.as_str()));
        }
        Ok(())
    }
}

fn is_set(value: Option<&FieldValue>) -> bool {
    match value {
        None | Some(FieldValue::Null) => false,
        Some(FieldValue::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

impl ImportSession {
    /// Runs the model's post-transforms in registration order.
    pub(crate) async fn apply_model_transforms(
        &self,
        mut attributes: Attributes,
        meta: &Arc<ResolutionMeta>,
    ) -> ImportResult<Attributes> {
        let Some(schema) = meta.schema() else {
            return Ok(attributes);
        };
        for transform in self.models.for_model(&schema.model) {
            transform.apply(&mut attributes, meta, self.context()).await?;
        }
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_in_place() {
        let mut transforms = ModelTransforms::default();
        assert_eq!(
            transforms.fields("User"),
            vec!["name", "email", "role", "password"]
        );
        transforms.register("User", "email", model_fn(|_| Ok(())));
        transforms.register("User", "nickname", model_fn(|_| Ok(())));
        assert_eq!(
            transforms.fields("User"),
            vec!["name", "email", "role", "password", "nickname"]
        );
        assert!(transforms.handles("User", "role"));
        assert!(!transforms.handles("Shop", "role"));
    }

    #[test]
    fn empty_values_count_as_unset() {
        assert!(!is_set(None));
        assert!(!is_set(Some(&FieldValue::Null)));
        assert!(!is_set(Some(&FieldValue::from(""))));
        assert!(is_set(Some(&FieldValue::from("x"))));
    }
}
