use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Options for an import session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Root directory holding one subdirectory per collection.
    pub base_dir: PathBuf,
    /// Fixture id of the bootstrap admin user that owns uploads.
    pub admin_fixture_id: String,
    /// Fixture id of the organization used for organization-scoped roles.
    pub organization_fixture_id: String,
    /// Role table consulted by the `role` model transform.
    pub roles: BTreeMap<String, RoleDefinition>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// Base URL used when rewriting markup links to uploads.
    pub api_url: String,
    pub uploads_collection: String,
    pub users_collection: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("fixtures"),
            admin_fixture_id: "users/admin".to_string(),
            organization_fixture_id: "organizations/default".to_string(),
            roles: BTreeMap::new(),
            admin_email: None,
            admin_password: None,
            api_url: String::new(),
            uploads_collection: "uploads".to_string(),
            users_collection: "users".to_string(),
        }
    }
}

impl ImportOptions {
    /// Defaults with `ADMIN_EMAIL`, `ADMIN_PASSWORD` and `API_URL` applied.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Fills admin credentials and the API url from the environment when unset.
    pub fn with_env(mut self) -> Self {
        if self.admin_email.is_none() {
            self.admin_email = std::env::var("ADMIN_EMAIL").ok();
        }
        if self.admin_password.is_none() {
            self.admin_password = std::env::var("ADMIN_PASSWORD").ok();
        }
        if self.api_url.is_empty() {
            if let Ok(url) = std::env::var("API_URL") {
                self.api_url = url;
            }
        }
        self
    }

    pub fn with_role(mut self, role: RoleDefinition) -> Self {
        self.roles.insert(role.name.clone(), role);
        self
    }

    /// Domain part of the admin email, used for generated user emails.
    pub fn admin_domain(&self) -> Option<&str> {
        self.admin_email
            .as_deref()
            .and_then(|email| email.split_once('@'))
            .map(|(_, domain)| domain)
    }

    /// Absolute URL of an upload's raw content.
    pub fn upload_url(&self, id: &str) -> String {
        format!("{}/1/uploads/{}/raw", self.api_url.trim_end_matches('/'), id)
    }
}

/// Entry of the role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default)]
    pub allow_scopes: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleDefinition {
    pub fn new<I, S>(name: impl Into<String>, allow_scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            allow_scopes: allow_scopes.into_iter().map(Into::into).collect(),
            permissions: Vec::new(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.allow_scopes.iter().any(|scope| scope == "global")
    }
}

/// Statistics collected over an import session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    /// Fixture ids in creation order.
    pub fixtures: Vec<String>,
    /// Collections whose fixtures came from a generated source.
    pub modules: Vec<String>,
    /// Circular reference chains, rendered `a -> b -> a`.
    pub circular: Vec<String>,
    /// Fixture ids that received a placeholder.
    pub referenced_placeholders: BTreeSet<String>,
    /// Placeholders whose fixture was never created.
    pub unresolved_placeholders: BTreeSet<String>,
    pub uploads: u64,
    pub placeholder_updates: u64,
}

impl ImportReport {
    pub fn record_fixture(&mut self, id: &str) {
        self.fixtures.push(id.to_string());
    }

    pub fn record_module(&mut self, base: &str) {
        if !self.modules.iter().any(|module| module == base) {
            self.modules.push(base.to_string());
        }
    }

    pub fn record_circular(&mut self, chain: &str) {
        if !self.circular.iter().any(|known| known == chain) {
            self.circular.push(chain.to_string());
        }
    }

    pub fn record_placeholder(&mut self, id: &str) {
        self.referenced_placeholders.insert(id.to_string());
    }

    pub fn record_upload(&mut self) {
        self.uploads += 1;
    }

    pub fn record_placeholder_update(&mut self) {
        self.placeholder_updates += 1;
    }

    pub fn log_summary(&self) {
        info!(
            fixtures = self.fixtures.len(),
            modules = self.modules.len(),
            uploads = self.uploads,
            circular = self.circular.len(),
            referenced_placeholders = self.referenced_placeholders.len(),
            placeholder_updates = self.placeholder_updates,
            "import finished"
        );
        if !self.modules.is_empty() {
            info!(modules = %self.modules.join(", "), "generated modules found");
        }
        for chain in &self.circular {
            info!(chain = %chain, "circular reference resolved with placeholder");
        }
        if !self.unresolved_placeholders.is_empty() {
            warn!(
                ids = %self.unresolved_placeholders.iter().cloned().collect::<Vec<_>>().join(", "),
                "placeholders referenced but never resolved"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_domain_comes_from_email() {
        let options = ImportOptions {
            admin_email: Some("root@example.org".to_string()),
            ..ImportOptions::default()
        };
        assert_eq!(options.admin_domain(), Some("example.org"));
        assert_eq!(ImportOptions::default().admin_domain(), None);
    }

    #[test]
    fn upload_url_trims_trailing_slash() {
        let options = ImportOptions {
            api_url: "https://api.example.org/".to_string(),
            ..ImportOptions::default()
        };
        assert_eq!(
            options.upload_url("abc"),
            "https://api.example.org/1/uploads/abc/raw"
        );
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: ImportOptions = toml::from_str(
            r#"
base_dir = "seed"

[roles.admin]
name = "admin"
allow_scopes = ["global"]
"#,
        )
        .expect("options");
        assert_eq!(options.base_dir, PathBuf::from("seed"));
        assert_eq!(options.admin_fixture_id, "users/admin");
        assert!(options.roles["admin"].is_global());
    }

    #[test]
    fn report_deduplicates_modules_and_chains() {
        let mut report = ImportReport::default();
        report.record_module("posts");
        report.record_module("posts");
        report.record_circular("a -> b -> a");
        report.record_circular("a -> b -> a");
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.circular.len(), 1);
    }
}
