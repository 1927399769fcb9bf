//! Configuration loader and validator for the outline engine.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub studio: Studio,
    pub course: Course,
}

/// Which `StudioService` implementation drives the outline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Studio,
    Local,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub backend: Backend,
}

/// Authoring API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Studio {
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Course the outline belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Course {
    pub id: String,
}

fn default_auth_scheme() -> String {
    "JWT".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl App {
    /// `data_dir` with a leading `~/` expanded.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }

    /// SQLite URL for the local backend; `DATABASE_URL` wins when set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/outline.db", self.resolved_data_dir()))
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_with_backend(path, None)
}

/// Load with an optional backend override applied before validation.
pub fn load_with_backend(
    path: Option<&Path>,
    backend: Option<Backend>,
) -> Result<Config, ConfigError> {
    let mut cfg = read(path)?;
    if let Some(backend) = backend {
        cfg.app.backend = backend;
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Parse the YAML file without validating it.
pub fn read(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.course.id.trim().is_empty() {
        return Err(ConfigError::Invalid("course.id must be non-empty"));
    }
    if !crate::usage_key::is_course_key(cfg.course.id.trim()) {
        return Err(ConfigError::Invalid("course.id must be a course-v1 key"));
    }

    // The local backend never talks to the authoring API.
    if cfg.app.backend == Backend::Local {
        return Ok(());
    }

    if cfg.studio.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("studio.base_url must be non-empty"));
    }
    if !cfg.studio.base_url.starts_with("http://") && !cfg.studio.base_url.starts_with("https://") {
        return Err(ConfigError::Invalid("studio.base_url must be an http(s) URL"));
    }
    if cfg.studio.token.trim().is_empty() {
        return Err(ConfigError::Invalid("studio.token must be non-empty"));
    }
    if cfg.studio.auth_scheme.trim().is_empty() {
        return Err(ConfigError::Invalid("studio.auth_scheme must be non-empty"));
    }
    if cfg.studio.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("studio.timeout_seconds must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  backend: "studio"

studio:
  base_url: "http://localhost:18010/"
  token: "YOUR_STUDIO_JWT"
  auth_scheme: "JWT"
  timeout_seconds: 30

course:
  id: "course-v1:OpenedX+DemoX+Demo_Course"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.backend, Backend::Studio);
    }

    #[test]
    fn defaults_applied() {
        let cfg: Config = serde_yaml::from_str(
            r#"app: { data_dir: "./d" }
studio: { base_url: "https://studio.example.com/", token: "t" }
course: { id: "course-v1:O+C+R" }
"#,
        )
        .unwrap();
        assert_eq!(cfg.studio.auth_scheme, "JWT");
        assert_eq!(cfg.studio.timeout_seconds, 30);
        assert_eq!(cfg.app.backend, Backend::Studio);
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.studio.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("studio.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_course_id() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.course.id = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("course.id")));

        cfg.course.id = "not-a-course".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.studio.base_url = "ftp://x".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(msg)) if msg.contains("base_url")));
    }

    #[test]
    fn local_backend_skips_studio_checks() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.backend = Backend::Local;
        cfg.studio.token = "".into();
        cfg.studio.base_url = "".into();
        validate(&cfg).unwrap();
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.course.id, "course-v1:OpenedX+DemoX+Demo_Course");
    }

    #[test]
    fn backend_override_applies_before_validation() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(
            &p,
            r#"app: { data_dir: "./d" }
studio: { base_url: "", token: "" }
course: { id: "course-v1:O+C+R" }
"#,
        )
        .unwrap();
        assert!(matches!(load(Some(&p)), Err(ConfigError::Invalid(msg)) if msg.contains("base_url")));

        let cfg = load_with_backend(Some(&p), Some(Backend::Local)).unwrap();
        assert_eq!(cfg.app.backend, Backend::Local);
        assert_eq!(read(Some(&p)).unwrap().app.backend, Backend::Studio);
    }
}
