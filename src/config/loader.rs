//! Configuration Loader - Environment Parsing and Validation
//!
//! Reads the process environment (or any lookup function, for tests),
//! merges in the optional TOML network profile, and validates every
//! value. Any problem is a `ListenerError::Config`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;

use super::{
  ChunkConfig, ListenerConfig, LogConfig, LogFormat, NetworkConfig, NetworkProfile, ProfileFile,
  QueueConfig, UpdaterConfig,
};
use crate::domain::StepBounds;
use crate::error::{ListenerError, ListenerResult};

macro_rules! ensure_config {
  ($cond:expr, $($arg:tt)+) => {
    if !$cond {
      return Err(ListenerError::config(format!($($arg)+)));
    }
  };
}

/// Load configuration from the process environment.
///
/// # Errors
/// Returns `ListenerError::Config` when a required variable is missing,
/// a value does not parse, or a validation rule is violated.
pub fn load_config() -> ListenerResult<ListenerConfig> {
  load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> ListenerResult<ListenerConfig>
where
  F: Fn(&str) -> Option<String>,
{
  let env = Env(lookup);

  let network = env
    .required("NETWORK")?
    .trim()
    .to_lowercase();

  let profile = match env.get("CONFIG_PATH") {
    Some(path) => load_profile(Path::new(&path), &network)?,
    None => NetworkProfile::default(),
  };

  let rpc_ws_url = env
    .get("RPC_WS_URL")
    .or(profile.rpc_ws_url)
    .ok_or_else(|| ListenerError::config("RPC_WS_URL is required"))?;

  let network = NetworkConfig {
    name: network,
    rpc_ws_url,
    required_confirmations: env
      .parsed("REQUIRED_CONFIRMATIONS")?
      .or(profile.required_confirmations)
      .unwrap_or_else(super::default_required_confirmations),
    poll_interval_ms: env
      .parsed("POLL_INTERVAL_MS")?
      .or(profile.poll_interval_ms)
      .unwrap_or_else(super::default_poll_interval_ms),
    start_block: env.parsed("START_BLOCK")?.or(profile.start_block),
  };

  let timeout_secs = env
    .parsed("ASSET_UPDATE_TIMEOUT_SECS")?
    .unwrap_or_else(super::default_updater_timeout_secs);
  let updater = match (env.get("ASSET_UPDATE_COMMAND"), env.get("ASSET_UPDATE_WEBHOOK_URL")) {
    (Some(command), None) => UpdaterConfig::Command { command, timeout_secs },
    (None, Some(url)) => UpdaterConfig::Webhook { url, timeout_secs },
    (Some(_), Some(_)) => {
      return Err(ListenerError::config(
        "set only one of ASSET_UPDATE_COMMAND and ASSET_UPDATE_WEBHOOK_URL",
      ));
    }
    (None, None) => {
      return Err(ListenerError::config(
        "one of ASSET_UPDATE_COMMAND or ASSET_UPDATE_WEBHOOK_URL is required",
      ));
    }
  };

  let defaults = StepBounds::default();
  let chunk = ChunkConfig {
    bounds: StepBounds {
      initial: env.parsed("CHUNK_INITIAL_STEP")?.unwrap_or(defaults.initial),
      min: env.parsed("CHUNK_MIN_STEP")?.unwrap_or(defaults.min),
      max: env.parsed("CHUNK_MAX_STEP")?.unwrap_or(defaults.max),
    },
    backoff_ms: env
      .parsed("CHUNK_BACKOFF_MS")?
      .unwrap_or_else(super::default_backoff_ms),
  };

  let format = match env.get("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
    None | Some("pretty") => LogFormat::Pretty,
    Some("json") => LogFormat::Json,
    Some(other) => {
      return Err(ListenerError::config(format!(
        "LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
      )));
    }
  };

  let config = ListenerConfig {
    network,
    deployments_dir: env
      .get("DEPLOYMENTS_DIR")
      .map_or_else(|| PathBuf::from("deployments"), PathBuf::from),
    data_dir: env
      .get("DATA_DIR")
      .map_or_else(|| PathBuf::from("data"), PathBuf::from),
    updater,
    queue: QueueConfig {
      max_dispatch_retries: env
        .parsed("MAX_DISPATCH_RETRIES")?
        .unwrap_or_else(super::default_max_dispatch_retries),
      max_event_age_secs: env
        .parsed("MAX_EVENT_AGE_SECS")?
        .unwrap_or_else(super::default_max_event_age_secs),
    },
    chunk,
    metrics_addr: env.get("METRICS_ADDR"),
    log: LogConfig {
      level: env.get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
      format,
    },
  };

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &ListenerConfig) -> ListenerResult<()> {
  let network = &config.network;

  ensure_config!(
    network
      .name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
      && !network.name.is_empty(),
    "NETWORK must be a plain name like 'sepolia', got '{}'",
    network.name
  );
  ensure_config!(
    network.rpc_ws_url.starts_with("ws://") || network.rpc_ws_url.starts_with("wss://"),
    "RPC_WS_URL must be a ws:// or wss:// URL"
  );
  ensure_config!(
    network.poll_interval_ms > 0,
    "POLL_INTERVAL_MS must be positive"
  );
  ensure_config!(
    config.queue.max_dispatch_retries > 0,
    "MAX_DISPATCH_RETRIES must be positive"
  );
  ensure_config!(
    config.queue.max_event_age_secs > 0,
    "MAX_EVENT_AGE_SECS must be positive"
  );
  ensure_config!(
    config.chunk.bounds.is_valid(),
    "chunk steps must satisfy 1 <= CHUNK_MIN_STEP <= CHUNK_INITIAL_STEP <= CHUNK_MAX_STEP, got {:?}",
    config.chunk.bounds
  );

  match &config.updater {
    UpdaterConfig::Command { command, timeout_secs } => {
      ensure_config!(!command.trim().is_empty(), "ASSET_UPDATE_COMMAND must not be empty");
      ensure_config!(*timeout_secs > 0, "ASSET_UPDATE_TIMEOUT_SECS must be positive");
    }
    UpdaterConfig::Webhook { url, timeout_secs } => {
      ensure_config!(
        url.starts_with("http://") || url.starts_with("https://"),
        "ASSET_UPDATE_WEBHOOK_URL must be an http(s) URL"
      );
      ensure_config!(*timeout_secs > 0, "ASSET_UPDATE_TIMEOUT_SECS must be positive");
    }
  }

  info!(
    network = %network.name,
    confirmations = network.required_confirmations,
    poll_interval_ms = network.poll_interval_ms,
    "Configuration loaded successfully"
  );

  Ok(())
}

/// Read the profile for `network` from a TOML file.
fn load_profile(path: &Path, network: &str) -> ListenerResult<NetworkProfile> {
  let content = std::fs::read_to_string(path).map_err(|e| {
    ListenerError::config(format!("failed to read config file {}: {e}", path.display()))
  })?;
  let mut file: ProfileFile = toml::from_str(&content).map_err(|e| {
    ListenerError::config(format!("failed to parse config file {}: {e}", path.display()))
  })?;
  Ok(file.networks.remove(network).unwrap_or_default())
}

/// Variable lookup with typed accessors.
struct Env<F>(F);

impl<F> Env<F>
where
  F: Fn(&str) -> Option<String>,
{
  /// Value if set and non-blank.
  fn get(&self, key: &str) -> Option<String> {
    (self.0)(key).filter(|v| !v.trim().is_empty())
  }

  fn required(&self, key: &str) -> ListenerResult<String> {
    self
      .get(key)
      .ok_or_else(|| ListenerError::config(format!("{key} is required")))
  }

  fn parsed<T>(&self, key: &str) -> ListenerResult<Option<T>>
  where
    T: FromStr,
    T::Err: std::fmt::Display,
  {
    self
      .get(key)
      .map(|raw| {
        raw.trim().parse::<T>().map_err(|e| {
          ListenerError::config(format!("{key} has invalid value '{raw}': {e}"))
        })
      })
      .transpose()
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::io::Write;

  use super::*;

  fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  const BASE: &[(&str, &str)] = &[
    ("NETWORK", "Sepolia"),
    ("RPC_WS_URL", "wss://rpc.example.org/ws"),
    ("ASSET_UPDATE_COMMAND", "npm run build-assets"),
  ];

  #[test]
  fn test_minimal_environment_uses_defaults() {
    let config = load_config_from(env(BASE)).unwrap();
    assert_eq!(config.network.name, "sepolia");
    assert_eq!(config.network.required_confirmations, 5);
    assert_eq!(config.network.poll_interval_ms, 12_000);
    assert_eq!(config.network.start_block, None);
    assert_eq!(config.chunk.bounds, StepBounds::default());
    assert_eq!(config.log.format, LogFormat::Pretty);
    assert!(matches!(config.updater, UpdaterConfig::Command { timeout_secs: 300, .. }));
  }

  #[test]
  fn test_missing_network_is_fatal() {
    let err = load_config_from(env(&BASE[1..])).unwrap_err();
    assert!(matches!(err, ListenerError::Config(msg) if msg.contains("NETWORK")));
  }

  #[test]
  fn test_http_rpc_url_is_rejected() {
    let mut pairs = BASE.to_vec();
    pairs[1] = ("RPC_WS_URL", "https://rpc.example.org");
    assert!(load_config_from(env(&pairs)).is_err());
  }

  #[test]
  fn test_unparseable_number_is_fatal() {
    let mut pairs = BASE.to_vec();
    pairs.push(("REQUIRED_CONFIRMATIONS", "five"));
    let err = load_config_from(env(&pairs)).unwrap_err();
    assert!(err.to_string().contains("REQUIRED_CONFIRMATIONS"));
  }

  #[test]
  fn test_updater_must_be_exactly_one() {
    let mut pairs = BASE.to_vec();
    pairs.push(("ASSET_UPDATE_WEBHOOK_URL", "https://hooks.example.org/build"));
    assert!(load_config_from(env(&pairs)).is_err());

    let pairs = &BASE[..2];
    assert!(load_config_from(env(pairs)).is_err());
  }

  #[test]
  fn test_inverted_chunk_bounds_rejected() {
    let mut pairs = BASE.to_vec();
    pairs.push(("CHUNK_MIN_STEP", "5000"));
    assert!(load_config_from(env(&pairs)).is_err());
  }

  #[test]
  fn test_profile_file_supplies_defaults_and_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "[networks.sepolia]\nrequired_confirmations = 3\npoll_interval_ms = 4000\nstart_block = 77\n"
    )
    .unwrap();
    let path = file.path().to_string_lossy().to_string();

    let mut pairs = BASE.to_vec();
    pairs.push(("CONFIG_PATH", path.as_str()));
    pairs.push(("POLL_INTERVAL_MS", "2500"));

    let config = load_config_from(env(&pairs)).unwrap();
    assert_eq!(config.network.required_confirmations, 3);
    assert_eq!(config.network.poll_interval_ms, 2500);
    assert_eq!(config.network.start_block, Some(77));
  }

  #[test]
  fn test_unreadable_profile_file_is_fatal() {
    let mut pairs = BASE.to_vec();
    pairs.push(("CONFIG_PATH", "/nonexistent/listener.toml"));
    assert!(load_config_from(env(&pairs)).is_err());
  }
}
