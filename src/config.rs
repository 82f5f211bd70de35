use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use std::{env, path::PathBuf, sync::Arc};
use tracing::{info, warn};

use crate::flow::history::DEFAULT_HISTORY_LIMIT;

pub const ROOT_KEY: &str = "FLOWSTUDIO_ROOT";
pub const LOG_LEVEL_KEY: &str = "FLOWSTUDIO_LOG_LEVEL";
pub const HISTORY_LIMIT_KEY: &str = "FLOWSTUDIO_HISTORY_LIMIT";
pub const SESSION_TTL_KEY: &str = "FLOWSTUDIO_SESSION_TTL";

/// A key/value configuration source.
#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    fn describe(&self) -> String;
}

#[derive(Clone)]
pub struct ConfigManager(pub Arc<dyn ConfigManagerType>);

impl ConfigManager {
    pub fn new(inner: impl ConfigManagerType + 'static) -> Self {
        Self(Arc::new(inner))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).await
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.describe())
    }
}

/// Process environment, after loading an optional `.env` file into it.
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: PathBuf,
}

impl EnvConfigManager {
    pub fn new(env_file: PathBuf) -> Self {
        if env_file.exists() {
            dotenvy::from_path(&env_file).ok();
            info!("Loaded .env from {}", env_file.display());
        }
        Self { env_file }
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn describe(&self) -> String {
        format!("EnvConfigManager({})", self.env_file.display())
    }
}

/// In-memory configuration, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.map.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn describe(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

/// Settings of an editor workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub root: PathBuf,
    pub log_level: String,
    pub history_limit: usize,
    /// Token lifetime; `None` disables authentication.
    pub session_ttl: Option<Duration>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./flowstudio"),
            log_level: "info".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            session_ttl: None,
        }
    }
}

impl EditorConfig {
    /// Read the `FLOWSTUDIO_*` keys. Unparsable values fall back to defaults.
    pub async fn from_manager(config: &ConfigManager) -> Self {
        let defaults = Self::default();
        let root = config.get(ROOT_KEY).await.map(PathBuf::from).unwrap_or(defaults.root);
        let log_level = config.get(LOG_LEVEL_KEY).await.unwrap_or(defaults.log_level);
        let history_limit = parse_or(config, HISTORY_LIMIT_KEY, defaults.history_limit).await;
        let ttl_secs: i64 = parse_or(config, SESSION_TTL_KEY, 0).await;
        Self {
            root,
            log_level,
            history_limit,
            session_ttl: (ttl_secs > 0).then(|| Duration::seconds(ttl_secs)),
        }
    }

    pub fn flows_dir(&self) -> PathBuf {
        self.root.join("flows")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join("schemas")
    }
}

async fn parse_or<T: std::str::FromStr>(config: &ConfigManager, key: &str, default: T) -> T {
    match config.get(key).await {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring {key}={raw}: not a valid value");
            default
        }),
    }
}
