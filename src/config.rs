use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::sync::ReplayFailurePolicy;

/// Sync layer configuration.
///
/// Loadable from YAML for deployed installations; `Default` covers embedded
/// and test use.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub remote: RemoteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Override for the sync database location (default: platform data dir)
  #[serde(default)]
  pub database_path: Option<PathBuf>,
  /// What to do when a queued mutation fails during the reconnect drain
  #[serde(default)]
  pub replay_failure_policy: ReplayFailurePolicy,
  #[serde(default)]
  pub bus: BusConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      remote: RemoteConfig::default(),
      cache: CacheConfig::default(),
      database_path: None,
      replay_failure_policy: ReplayFailurePolicy::default(),
      bus: BusConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  pub base_url: String,
  /// Environment variable holding the session token
  #[serde(default = "default_token_env")]
  pub token_env: String,
}

fn default_token_env() -> String {
  "PORTAL_SYNC_TOKEN".to_string()
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      token_env: default_token_env(),
    }
  }
}

impl RemoteConfig {
  /// Get the session token from the configured environment variable.
  pub fn token(&self) -> Option<String> {
    std::env::var(&self.token_env).ok()
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Maximum number of live cache entries
  #[serde(default = "default_max_entries")]
  pub max_entries: usize,
  /// Fallback TTL in seconds for tables without an explicit entry
  #[serde(default = "default_ttl_secs")]
  pub default_ttl_secs: u64,
  /// Per-table TTL overrides in seconds
  #[serde(default = "default_table_ttls")]
  pub table_ttl_secs: BTreeMap<String, u64>,
}

fn default_max_entries() -> usize {
  crate::cache::DEFAULT_MAX_ENTRIES
}

fn default_ttl_secs() -> u64 {
  300
}

/// Per-table defaults: volatile data caches shorter.
fn default_table_ttls() -> BTreeMap<String, u64> {
  BTreeMap::from([
    ("channels".to_string(), 600),
    ("articles".to_string(), 300),
    ("games".to_string(), 300),
    ("advertisements".to_string(), 120),
    ("settings".to_string(), 1800),
  ])
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_entries: default_max_entries(),
      default_ttl_secs: default_ttl_secs(),
      table_ttl_secs: default_table_ttls(),
    }
  }
}

impl CacheConfig {
  /// TTL for a table, falling back to the default.
  pub fn ttl_for(&self, table: &str) -> chrono::Duration {
    let secs = self
      .table_ttl_secs
      .get(table)
      .copied()
      .unwrap_or(self.default_ttl_secs);
    chrono::Duration::seconds(secs as i64)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
  /// How long an emitted event stays on the cross-process channel (ms)
  #[serde(default = "default_echo_ttl_ms")]
  pub echo_ttl_ms: u64,
  /// Watcher poll interval (ms)
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
}

fn default_echo_ttl_ms() -> u64 {
  100
}

fn default_poll_interval_ms() -> u64 {
  25
}

impl Default for BusConfig {
  fn default() -> Self {
    Self {
      echo_ttl_ms: default_echo_ttl_ms(),
      poll_interval_ms: default_poll_interval_ms(),
    }
  }
}

impl BusConfig {
  pub fn echo_ttl(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.echo_ttl_ms)
  }

  pub fn poll_interval(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.poll_interval_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./portal-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/portal-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("portal-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("portal-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.cache.ttl_for("channels"), chrono::Duration::seconds(600));
    assert_eq!(config.cache.ttl_for("unknown"), chrono::Duration::seconds(300));
    assert_eq!(config.replay_failure_policy, ReplayFailurePolicy::SkipAndLog);
  }

  #[test]
  fn test_parse_yaml() {
    let yaml = r#"
remote:
  base_url: "https://cms.example.net/api"
cache:
  max_entries: 50
  table_ttl_secs:
    advertisements: 30
replay_failure_policy: halt
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.remote.base_url, "https://cms.example.net/api");
    assert_eq!(config.cache.max_entries, 50);
    assert_eq!(
      config.cache.ttl_for("advertisements"),
      chrono::Duration::seconds(30)
    );
    assert_eq!(config.replay_failure_policy, ReplayFailurePolicy::Halt);
  }
}
