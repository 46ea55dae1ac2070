//! Runtime settings.
//!
//! Settings are assembled once at startup and passed by reference to every
//! component. Sources, highest priority first:
//!
//! 1. process environment
//! 2. `.env` file (optional unless named explicitly)
//! 3. built-in defaults
//!
//! Empty values count as unset, so `LOCAL_APPS_REGCTL_PATH=` falls back to
//! `regctl` on `$PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const KEY_DESTINATION: &str = "DESTINATION_REGISTRY_HOSTNAME";
pub const KEY_CATALOG_DIR: &str = "CATALOG_DIR";
pub const KEY_DATA_DIR: &str = "DATA_DIR";
pub const KEY_STATE_PATH: &str = "STATE_DATABASE_PATH";
pub const KEY_LOCK_PATH: &str = "LOCK_FILE_PATH";
pub const KEY_SYNC_INTERVAL: &str = "SYNC_INTERVAL";
pub const KEY_WORKERS: &str = "SYNC_WORKERS";
pub const KEY_DEBUG_LEVEL: &str = "DEBUG_LEVEL";
pub const KEY_INSIDE_CONTAINER: &str = "LOCAL_APPS_RUN_INSIDE_CONTAINER";
pub const KEY_CONTAINER_ENGINE: &str = "LOCAL_APPS_CONTAINER_ENGINE";
pub const KEY_CONTAINER_NAME: &str = "LOCAL_APPS_CONTAINER_NAME";
pub const KEY_REGCTL_PATH: &str = "LOCAL_APPS_REGCTL_PATH";
pub const KEY_SKOPEO_PATH: &str = "LOCAL_APPS_SKOPEO_PATH";

pub const DEFAULT_CATALOG_DIR: &str = "sync.d";
pub const DEFAULT_SYNC_INTERVAL: u64 = 3600;
pub const DEFAULT_ENV_FILE: &str = ".env";

/// How the external registry tools are invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub run_inside_container: bool,
    pub container_engine: String,
    pub container_name: String,
    pub regctl: String,
    pub skopeo: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            run_inside_container: false,
            container_engine: "podman".to_string(),
            container_name: "regmirror-tools".to_string(),
            regctl: "regctl".to_string(),
            skopeo: "skopeo".to_string(),
        }
    }
}

/// Immutable run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub destination_host: String,
    pub catalog_dir: PathBuf,
    pub state_path: PathBuf,
    pub lock_path: PathBuf,
    /// Global staleness interval in seconds.
    pub sync_interval: u64,
    /// Worker threads for evaluation and sync; `1` means sequential.
    pub workers: usize,
    pub debug_level: u8,
    pub tools: ToolSettings,
}

impl Settings {
    /// Build settings for `destination_host` with every other value defaulted
    /// beneath `data_dir`.
    pub fn with_defaults(destination_host: impl Into<String>, data_dir: &Path) -> Self {
        Self {
            destination_host: destination_host.into(),
            catalog_dir: PathBuf::from(DEFAULT_CATALOG_DIR),
            state_path: default_state_path(data_dir),
            lock_path: default_lock_path(data_dir),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            workers: 1,
            debug_level: 0,
            tools: ToolSettings::default(),
        }
    }

    /// Build settings from a flat key/value map.
    ///
    /// `home` is only consulted when `DATA_DIR` is unset and a state or lock
    /// path has to be defaulted beneath it.
    pub fn from_map(
        vars: &HashMap<String, String>,
        home: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let destination_host = get(KEY_DESTINATION)
            .map(|host| host.trim_end_matches('/').to_string())
            .ok_or(ConfigError::Missing {
                key: KEY_DESTINATION,
            })?;

        let data_dir = get(KEY_DATA_DIR)
            .map(PathBuf::from)
            .or_else(|| home.map(|h| h.join(".regmirror")));
        let beneath_data_dir = |default: fn(&Path) -> PathBuf| {
            data_dir
                .as_deref()
                .map(default)
                .ok_or(ConfigError::HomeNotFound)
        };
        let state_path = match get(KEY_STATE_PATH) {
            Some(path) => PathBuf::from(path),
            None => beneath_data_dir(default_state_path)?,
        };
        let lock_path = match get(KEY_LOCK_PATH) {
            Some(path) => PathBuf::from(path),
            None => beneath_data_dir(default_lock_path)?,
        };

        let mut settings = Settings {
            destination_host,
            catalog_dir: PathBuf::from(DEFAULT_CATALOG_DIR),
            state_path,
            lock_path,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            workers: 1,
            debug_level: 0,
            tools: ToolSettings::default(),
        };
        if let Some(dir) = get(KEY_CATALOG_DIR) {
            settings.catalog_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(KEY_SYNC_INTERVAL) {
            settings.sync_interval = parse_number(KEY_SYNC_INTERVAL, &raw)?;
        }
        if let Some(raw) = get(KEY_WORKERS) {
            let workers: usize = parse_number(KEY_WORKERS, &raw)?;
            if workers == 0 {
                return Err(ConfigError::Invalid {
                    key: KEY_WORKERS,
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            settings.workers = workers;
        }
        if let Some(raw) = get(KEY_DEBUG_LEVEL) {
            settings.debug_level = parse_number(KEY_DEBUG_LEVEL, &raw)?;
        }

        let tools = &mut settings.tools;
        if let Some(raw) = get(KEY_INSIDE_CONTAINER) {
            tools.run_inside_container = parse_bool(KEY_INSIDE_CONTAINER, &raw)?;
        }
        if let Some(engine) = get(KEY_CONTAINER_ENGINE) {
            tools.container_engine = engine;
        }
        if let Some(name) = get(KEY_CONTAINER_NAME) {
            tools.container_name = name;
        }
        if let Some(path) = get(KEY_REGCTL_PATH) {
            tools.regctl = path;
        }
        if let Some(path) = get(KEY_SKOPEO_PATH) {
            tools.skopeo = path;
        }

        Ok(settings)
    }

    /// Load settings from the process environment layered over `env_file`.
    ///
    /// With `env_file = None` a `.env` in the working directory is used if
    /// present. An explicitly named file must exist.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();

        let (path, required) = match env_file {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_ENV_FILE), false),
        };
        if required || path.exists() {
            vars.extend(read_env_file(&path)?);
        }
        vars.extend(process_env());

        let home = dirs::home_dir();
        Self::from_map(&vars, home.as_deref())
    }
}

/// The process environment, minus entries that are not valid UTF-8.
fn process_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                tracing::debug!("ignoring {key}: value is not valid UTF-8");
                None
            }
            (Err(key), _) => {
                tracing::debug!("ignoring non-UTF-8 variable {}", key.to_string_lossy());
                None
            }
        })
        .collect()
}

/// `<data_dir>/state/database.json`
pub fn default_state_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state").join("database.json")
}

/// `<data_dir>/run/regmirror.lock`
pub fn default_lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("run").join("regmirror.lock")
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let env_err = |source: dotenvy::Error| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };
    dotenvy::from_path_iter(path)
        .map_err(env_err)?
        .map(|item| item.map_err(env_err))
        .collect()
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
