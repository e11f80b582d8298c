//! Configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--root`, `--log-level`, etc.)
//! 2. `$FTS_CONFIG` environment variable (path to config file)
//! 3. Project-local `.fts.toml` in the current working directory
//! 4. Global `~/.config/fts/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{BusyPolicy, EngineConfig};
use crate::error::{Result, TreeError};
use crate::logging::LogFormat;

// ── Section configs ──────────────────────────────────────────────────────────

/// General settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory to connect to (overridden by `--root`).
    pub default_path: Option<String>,
    /// Ask before deleting.
    pub confirm_delete: Option<bool>,
}

/// How external storage is mirrored.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Entries starting with this prefix are never shown. Empty shows all.
    pub hidden_prefix: Option<String>,
    /// Root id used while no storage is connected.
    pub virtual_root_name: Option<String>,
}

/// Defaults for newly created entries.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CreateConfig {
    pub folder_name: Option<String>,
    pub file_stem: Option<String>,
    /// Extension without the dot. Empty means none.
    pub file_extension: Option<String>,
    /// Initial content of new files.
    pub file_template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineSection {
    /// "queue" or "reject".
    pub busy_policy: Option<String>,
}

/// Notification display durations.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    pub duration_ms: Option<u64>,
    pub error_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "file_tree_sync=debug".
    pub level: Option<String>,
    /// "text" or "json".
    pub format: Option<String>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub storage: StorageConfig,
    pub create: CreateConfig,
    pub engine: EngineSection,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

// ── Default constants ────────────────────────────────────────────────────────

pub const DEFAULT_HIDDEN_PREFIX: &str = ".";
pub const DEFAULT_VIRTUAL_ROOT: &str = "workspace";
pub const DEFAULT_FOLDER_NAME: &str = "NewFolder";
pub const DEFAULT_FILE_STEM: &str = "NewFile";
pub const DEFAULT_FILE_EXTENSION: &str = "tex";
/// Minimal LaTeX document written into new files.
pub const DEFAULT_FILE_TEMPLATE: &str =
    "% New LaTeX file\n\\documentclass{article}\n\\begin{document}\n\n\\end{document}";
/// Default notification duration in milliseconds.
pub const DEFAULT_NOTIFY_MS: u64 = 3000;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

// ── Config file locator ──────────────────────────────────────────────────────

/// Candidate config file paths in priority order, excluding `--config`.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("FTS_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".fts.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("fts").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning printed to stderr).
///
/// Logging is configured from the result, so this cannot log through tracing.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

fn pick<T: Clone>(over: &Option<T>, base: Option<T>) -> Option<T> {
    over.clone().or(base)
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: pick(&other.general.default_path, self.general.default_path),
                confirm_delete: other.general.confirm_delete.or(self.general.confirm_delete),
            },
            storage: StorageConfig {
                hidden_prefix: pick(&other.storage.hidden_prefix, self.storage.hidden_prefix),
                virtual_root_name: pick(
                    &other.storage.virtual_root_name,
                    self.storage.virtual_root_name,
                ),
            },
            create: CreateConfig {
                folder_name: pick(&other.create.folder_name, self.create.folder_name),
                file_stem: pick(&other.create.file_stem, self.create.file_stem),
                file_extension: pick(&other.create.file_extension, self.create.file_extension),
                file_template: pick(&other.create.file_template, self.create.file_template),
            },
            engine: EngineSection {
                busy_policy: pick(&other.engine.busy_policy, self.engine.busy_policy),
            },
            notify: NotifyConfig {
                duration_ms: other.notify.duration_ms.or(self.notify.duration_ms),
                error_duration_ms: other
                    .notify
                    .error_duration_ms
                    .or(self.notify.error_duration_ms),
            },
            logging: LoggingConfig {
                level: pick(&other.logging.level, self.logging.level),
                format: pick(&other.logging.format, self.logging.format),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so higher ones overwrite.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn default_path(&self) -> Option<&str> {
        self.general.default_path.as_deref()
    }

    pub fn confirm_delete(&self) -> bool {
        self.general.confirm_delete.unwrap_or(true)
    }

    pub fn hidden_prefix(&self) -> &str {
        self.storage
            .hidden_prefix
            .as_deref()
            .unwrap_or(DEFAULT_HIDDEN_PREFIX)
    }

    pub fn virtual_root_name(&self) -> &str {
        self.storage
            .virtual_root_name
            .as_deref()
            .unwrap_or(DEFAULT_VIRTUAL_ROOT)
    }

    pub fn folder_name(&self) -> &str {
        self.create.folder_name.as_deref().unwrap_or(DEFAULT_FOLDER_NAME)
    }

    pub fn file_stem(&self) -> &str {
        self.create.file_stem.as_deref().unwrap_or(DEFAULT_FILE_STEM)
    }

    /// Extension for new files, `None` when configured empty.
    pub fn file_extension(&self) -> Option<&str> {
        let ext = self
            .create
            .file_extension
            .as_deref()
            .unwrap_or(DEFAULT_FILE_EXTENSION)
            .trim_start_matches('.');
        (!ext.is_empty()).then_some(ext)
    }

    pub fn file_template(&self) -> &str {
        self.create
            .file_template
            .as_deref()
            .unwrap_or(DEFAULT_FILE_TEMPLATE)
    }

    /// Busy policy. Unknown values are an error rather than a silent default.
    pub fn busy_policy(&self) -> Result<BusyPolicy> {
        match self.engine.busy_policy.as_deref() {
            None | Some("queue") => Ok(BusyPolicy::Queue),
            Some("reject") => Ok(BusyPolicy::Reject),
            Some(other) => Err(TreeError::Config(format!(
                "unknown busy_policy \"{}\" (expected \"queue\" or \"reject\")",
                other
            ))),
        }
    }

    pub fn notify_duration(&self) -> Duration {
        Duration::from_millis(self.notify.duration_ms.unwrap_or(DEFAULT_NOTIFY_MS))
    }

    pub fn error_notify_duration(&self) -> Duration {
        Duration::from_millis(self.notify.error_duration_ms.unwrap_or(DEFAULT_NOTIFY_MS))
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_format(&self) -> Result<LogFormat> {
        match self.logging.format.as_deref() {
            None | Some("text") => Ok(LogFormat::Text),
            Some("json") => Ok(LogFormat::Json),
            Some(other) => Err(TreeError::Config(format!(
                "unknown log format \"{}\" (expected \"text\" or \"json\")",
                other
            ))),
        }
    }

    /// Settings handed to the tree service.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            virtual_root: self.virtual_root_name().to_string(),
            hidden_prefix: self.hidden_prefix().to_string(),
            folder_name: self.folder_name().to_string(),
            file_stem: self.file_stem().to_string(),
            file_extension: self.file_extension().map(str::to_string),
            file_template: self.file_template().as_bytes().to_vec(),
            busy_policy: self.busy_policy()?,
            notify_duration: self.notify_duration(),
            error_notify_duration: self.error_notify_duration(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.default_path(), None);
        assert!(cfg.confirm_delete());
        assert_eq!(cfg.hidden_prefix(), ".");
        assert_eq!(cfg.virtual_root_name(), "workspace");
        assert_eq!(cfg.folder_name(), "NewFolder");
        assert_eq!(cfg.file_stem(), "NewFile");
        assert_eq!(cfg.file_extension(), Some("tex"));
        assert!(cfg.file_template().contains("\\documentclass{article}"));
        assert_eq!(cfg.busy_policy().unwrap(), BusyPolicy::Queue);
        assert_eq!(cfg.notify_duration(), Duration::from_millis(3000));
        assert_eq!(cfg.error_notify_duration(), Duration::from_millis(3000));
        assert_eq!(cfg.log_level(), "warn");
        assert_eq!(cfg.log_format().unwrap(), LogFormat::Text);
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r##"
[general]
default_path = "/srv/thesis"
confirm_delete = false

[storage]
hidden_prefix = "_"
virtual_root_name = "scratch"

[create]
folder_name = "Folder"
file_stem = "Untitled"
file_extension = "md"
file_template = "# Title"

[engine]
busy_policy = "reject"

[notify]
duration_ms = 1500
error_duration_ms = 6000

[logging]
level = "debug"
format = "json"
"##;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.default_path(), Some("/srv/thesis"));
        assert!(!cfg.confirm_delete());
        assert_eq!(cfg.hidden_prefix(), "_");
        assert_eq!(cfg.virtual_root_name(), "scratch");
        assert_eq!(cfg.folder_name(), "Folder");
        assert_eq!(cfg.file_stem(), "Untitled");
        assert_eq!(cfg.file_extension(), Some("md"));
        assert_eq!(cfg.file_template(), "# Title");
        assert_eq!(cfg.busy_policy().unwrap(), BusyPolicy::Reject);
        assert_eq!(cfg.notify_duration(), Duration::from_millis(1500));
        assert_eq!(cfg.error_notify_duration(), Duration::from_millis(6000));
        assert_eq!(cfg.log_level(), "debug");
        assert_eq!(cfg.log_format().unwrap(), LogFormat::Json);
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[create]
file_extension = ""
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.file_extension(), None);
        // Everything else should be defaults
        assert_eq!(cfg.folder_name(), "NewFolder");
        assert!(cfg.confirm_delete());
    }

    #[test]
    fn test_extension_leading_dot_is_ignored() {
        let cfg = AppConfig {
            create: CreateConfig {
                file_extension: Some(".txt".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(cfg.file_extension(), Some("txt"));
    }

    #[test]
    fn test_unknown_policy_is_config_error() {
        let cfg: AppConfig = toml::from_str("[engine]\nbusy_policy = \"drop\"").unwrap();
        assert!(matches!(cfg.busy_policy(), Err(TreeError::Config(_))));
        assert!(cfg.engine_config().is_err());
    }

    #[test]
    fn test_unknown_log_format_is_config_error() {
        let cfg: AppConfig = toml::from_str("[logging]\nformat = \"xml\"").unwrap();
        assert!(matches!(cfg.log_format(), Err(TreeError::Config(_))));
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            general: GeneralConfig {
                default_path: Some("/a".into()),
                confirm_delete: Some(true),
            },
            notify: NotifyConfig {
                duration_ms: Some(1000),
                error_duration_ms: Some(2000),
            },
            ..Default::default()
        };

        let over = AppConfig {
            general: GeneralConfig {
                default_path: Some("/b".into()),
                // confirm_delete not set, should keep base
                ..Default::default()
            },
            notify: NotifyConfig {
                duration_ms: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.default_path(), Some("/b"));
        assert!(merged.confirm_delete());
        assert_eq!(merged.notify_duration(), Duration::from_millis(500));
        assert_eq!(merged.error_notify_duration(), Duration::from_millis(2000));
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            storage: StorageConfig {
                hidden_prefix: Some("~".into()),
                virtual_root_name: Some("v".into()),
            },
            ..Default::default()
        };
        let merged = base.merge(&AppConfig::default());
        assert_eq!(merged.hidden_prefix(), "~");
        assert_eq!(merged.virtual_root_name(), "v");
    }

    #[test]
    fn test_engine_config_from_defaults() {
        let engine = AppConfig::default().engine_config().unwrap();
        assert_eq!(engine.virtual_root, "workspace");
        assert_eq!(engine.hidden_prefix, ".");
        assert_eq!(engine.file_extension.as_deref(), Some("tex"));
        assert_eq!(engine.file_template, DEFAULT_FILE_TEMPLATE.as_bytes());
        assert_eq!(engine.busy_policy, BusyPolicy::Queue);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[storage]
hidden_prefix = ""

[create]
folder_name = "Dir"
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.hidden_prefix(), "");
        assert_eq!(cfg.folder_name(), "Dir");
        // Unset fields fall through to defaults
        assert_eq!(cfg.file_stem(), "NewFile");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_file(Path::new("/nonexistent/config.toml")).is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[general]
confirm_delete = false

[logging]
level = "info"
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            logging: LoggingConfig {
                level: Some("trace".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        // CLI override wins
        assert_eq!(cfg.log_level(), "trace");
        // File value preserved
        assert!(!cfg.confirm_delete());
    }
}
