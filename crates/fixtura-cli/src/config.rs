//! `fixtura.toml` loading. Flags override the file; the environment fills
//! whatever is still unset.

use std::path::{Path, PathBuf};

use thiserror::Error;

use fixtura_import::ImportOptions;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "fixtura.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub fixtures: Option<PathBuf>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub api_url: Option<String>,
}

/// Reads `path`, or `fixtura.toml` when it exists, into import options.
pub fn load_options(path: Option<&Path>) -> Result<ImportOptions, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG);
            if !fallback.exists() {
                return Ok(ImportOptions::default());
            }
            fallback
        }
    };
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_options(&content).map_err(|source| ConfigError::Parse { path, source })
}

pub fn parse_options(content: &str) -> Result<ImportOptions, toml::de::Error> {
    toml::from_str(content)
}

/// Layers flags, then environment variables, over file options.
pub fn resolve(mut options: ImportOptions, overrides: Overrides) -> ImportOptions {
    if let Some(fixtures) = overrides.fixtures {
        options.base_dir = fixtures;
    }
    if overrides.admin_email.is_some() {
        options.admin_email = overrides.admin_email;
    }
    if overrides.admin_password.is_some() {
        options.admin_password = overrides.admin_password;
    }
    if let Some(api_url) = overrides.api_url {
        options.api_url = api_url;
    }
    options.with_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_file_values() {
        let options = parse_options(
            r#"
base_dir = "seed"
admin_email = "root@example.org"
api_url = "https://api.example.org"

[roles.viewer]
name = "viewer"
allow_scopes = ["organization"]
"#,
        )
        .expect("parse");
        let options = resolve(
            options,
            Overrides {
                fixtures: Some(PathBuf::from("other")),
                admin_email: Some("ops@example.org".to_string()),
                ..Overrides::default()
            },
        );
        assert_eq!(options.base_dir, PathBuf::from("other"));
        assert_eq!(options.admin_email.as_deref(), Some("ops@example.org"));
        assert_eq!(options.api_url, "https://api.example.org");
        assert!(!options.roles["viewer"].is_global());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("fixtura_{}.toml", uuid::Uuid::new_v4()));
        let err = load_options(Some(&path)).expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
