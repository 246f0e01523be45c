use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::context::{Role, UserContext};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub user: UserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base directory for project snapshots and the execution log.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Python interpreter binary used by the process engine.
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    /// Hard wall-clock budget for one Python run, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EditorConfig {
    /// Quiet period before a debounced auto-save fires, in milliseconds.
    #[serde(default = "default_autosave_quiet_ms")]
    pub autosave_quiet_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    /// Supports ${ENV_VAR} substitution
    #[serde(default = "default_user_id")]
    pub id: String,
    /// One of student / staff / admin; anything else falls back to student.
    #[serde(default = "default_user_role")]
    pub role: String,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/projects")
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_timeout_ms() -> u64 {
    4500
}

fn default_autosave_quiet_ms() -> u64 {
    1200
}

fn default_user_id() -> String {
    "guest".to_string()
}

fn default_user_role() -> String {
    "student".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_bin: default_python_bin(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_quiet_ms: default_autosave_quiet_ms(),
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
            role: default_user_role(),
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EditorConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.autosave_quiet_ms)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${VERTEX_USER_ID}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Builds the explicit user context handed to the playground.
    pub fn user_context(&self) -> UserContext {
        UserContext::new(self.user.id.clone(), Role::parse(&self.user.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.path, PathBuf::from("./data/projects"));
        assert_eq!(config.sandbox.python_bin, "python3");
        assert_eq!(config.sandbox.timeout_ms, 4500);
        assert_eq!(config.editor.autosave_quiet_ms, 1200);
        assert_eq!(config.user.id, "guest");
        assert_eq!(config.user.role, "student");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sandbox]
            timeout_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.sandbox.timeout_ms, 1000);
        assert_eq!(config.sandbox.python_bin, "python3");
        assert_eq!(config.user.id, "guest");
    }

    #[test]
    fn test_duration_accessors() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sandbox.timeout(), Duration::from_millis(4500));
        assert_eq!(config.editor.quiet_period(), Duration::from_millis(1200));
    }

    #[test]
    fn test_user_context_normalizes_role() {
        let config: Config = toml::from_str(
            r#"
            [user]
            id = "alice"
            role = "Mystery"
            "#,
        )
        .unwrap();
        let ctx = config.user_context();
        assert_eq!(ctx.id, "alice");
        assert_eq!(ctx.role, Role::Student);
    }

    #[test]
    fn test_user_context_staff() {
        let config: Config = toml::from_str(
            r#"
            [user]
            id = "mr-jones"
            role = "staff"
            "#,
        )
        .unwrap();
        let ctx = config.user_context();
        assert_eq!(ctx.role, Role::Staff);
    }
}
