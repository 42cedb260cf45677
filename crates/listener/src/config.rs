use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_LOG_FILE: &str = "/logs/portwatcher.log";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

pub const ENV_LOG_FILE: &str = "LOG_FILE";
pub const ENV_HOST: &str = "LISTENER_HOST";
pub const ENV_PORT: &str = "LISTENER_PORT";
pub const ENV_CONFIG: &str = "LISTENER_CONFIG";

/// Fully resolved runtime settings. Immutable once the server starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub log_file: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ListenerConfig {
    pub fn with_log_file(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CliOptions {
    pub log_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone)]
pub struct EnvOptions {
    pub log_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config_path: Option<PathBuf>,
}

impl EnvOptions {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get(ENV_PORT) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .with_context(|| format!("{ENV_PORT} must be a port number, got '{raw}'"))?,
            ),
            None => None,
        };

        Ok(Self {
            log_file: get(ENV_LOG_FILE).map(PathBuf::from),
            host: get(ENV_HOST),
            port,
            config_path: get(ENV_CONFIG).map(PathBuf::from),
        })
    }
}

/// The `[listener]` table of a TOML config file. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub log_file: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    listener: FileConfig,
}

/// Reads the `[listener]` table from `path`.
///
/// A file that does not exist yields `None`. A relative `log_file` is taken
/// relative to the directory holding the config file.
pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(None);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading config file {}", path.display()))
        }
    };

    let mut document: ConfigDocument = toml::from_str(&contents)
        .with_context(|| format!("parsing config file {}", path.display()))?;

    if let (Some(log_file), Some(dir)) = (document.listener.log_file.take(), path.parent()) {
        // `join` keeps absolute paths as they are.
        document.listener.log_file = Some(dir.join(log_file));
    }

    Ok(Some(document.listener))
}

/// Merges the layers: CLI, then environment, then file, then defaults.
pub fn resolve(cli: &CliOptions, env: &EnvOptions, file_cfg: Option<&FileConfig>) -> ListenerConfig {
    let file_cfg = file_cfg.cloned().unwrap_or_default();
    let defaults = ListenerConfig::default();

    ListenerConfig {
        log_file: cli
            .log_file
            .clone()
            .or_else(|| env.log_file.clone())
            .or(file_cfg.log_file)
            .unwrap_or(defaults.log_file),
        host: cli
            .host
            .clone()
            .or_else(|| env.host.clone())
            .or(file_cfg.host)
            .unwrap_or(defaults.host),
        port: cli
            .port
            .or(env.port)
            .or(file_cfg.port)
            .unwrap_or(defaults.port),
    }
}
