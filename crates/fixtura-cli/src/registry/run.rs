use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use fixtura_import::{ImportOptions, ImportReport};

use super::{RegistryError, RegistryResult};

/// Metadata captured when an import run starts.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub engine: String,
    pub fixture_id: String,
    pub schema_path: PathBuf,
    pub run_dir: PathBuf,
    pub options: ImportOptions,
}

/// `config.json` of a run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub engine: String,
    pub fixture_id: String,
    pub schema_path: PathBuf,
    pub options: ImportOptions,
    pub git: GitInfo,
}

#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub report_path: PathBuf,
    pub entities_path: PathBuf,
    pub logs_path: PathBuf,
}

/// Creates `<run_dir>/<timestamp>__run_<id>/` with its `config.json` and an
/// empty log file.
pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));
    create_dir_all(&root)?;

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        engine: ctx.engine.clone(),
        fixture_id: ctx.fixture_id.clone(),
        schema_path: ctx.schema_path.clone(),
        options: redacted(&ctx.options),
        git: collect_git_info(),
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        report_path: root.join("report.json"),
        entities_path: root.join("entities.json"),
        logs_path,
        root,
    })
}

pub fn write_report(paths: &RunPaths, report: &ImportReport) -> RegistryResult<()> {
    write_json(&paths.report_path, report)
}

pub fn write_entities(paths: &RunPaths, entities: &Value) -> RegistryResult<()> {
    write_json(&paths.entities_path, entities)
}

/// Options as recorded on disk; the admin password never is.
fn redacted(options: &ImportOptions) -> ImportOptions {
    let mut options = options.clone();
    if options.admin_password.is_some() {
        options.admin_password = Some("***".to_string());
    }
    options
}

fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_directory_holds_config_and_log_file() {
        let run_dir = std::env::temp_dir().join(format!("fixtura_runs_{}", uuid::Uuid::new_v4()));
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            engine: "memory".to_string(),
            fixture_id: String::new(),
            schema_path: PathBuf::from("schema.json"),
            run_dir: run_dir.clone(),
            options: ImportOptions {
                admin_password: Some("hunter2".to_string()),
                ..ImportOptions::default()
            },
        };

        let paths = start_run(&ctx).expect("start run");
        assert!(paths.root.starts_with(&run_dir));
        assert!(paths.logs_path.exists());

        let config = std::fs::read_to_string(paths.root.join("config.json")).expect("config");
        let config: Value = serde_json::from_str(&config).expect("config json");
        assert_eq!(config["run_id"], "abc");
        assert_eq!(config["options"]["admin_password"], "***");

        write_report(&paths, &ImportReport::default()).expect("report");
        assert!(paths.report_path.exists());
    }
}
