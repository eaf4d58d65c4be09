use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "neoai-bridge";
pub const BINARIES_DIR_NAME: &str = "binaries";
pub const ACTIVE_FILE_NAME: &str = ".active";
pub const UPDATE_URL_BASE: &str = "https://update.neoai.com";
pub const EXECUTABLE_NAME: &str = "NeoAi";
pub const CLIENT_ARG: &str = "--client=jupyter-server";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeSettings {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_update_url")]
    pub update_url: String,
    #[serde(default = "default_executable_name")]
    pub executable_name: String,
    #[serde(default = "default_client_arg")]
    pub client_arg: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub custom_binary_path: Option<PathBuf>,
    /// Per-request deadline for one engine exchange. `None` blocks until the
    /// engine answers or its pipe closes.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Send a semantic-completion request right after the engine starts.
    #[serde(default)]
    pub warm_up: bool,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}
fn default_update_url() -> String {
    UPDATE_URL_BASE.to_string()
}
fn default_executable_name() -> String {
    EXECUTABLE_NAME.to_string()
}
fn default_client_arg() -> String {
    CLIENT_ARG.to_string()
}
fn default_http_timeout_secs() -> u64 {
    600
}
fn default_port() -> u16 {
    9999
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            update_url: default_update_url(),
            executable_name: default_executable_name(),
            client_arg: default_client_arg(),
            extra_args: Vec::new(),
            custom_binary_path: None,
            request_timeout_ms: None,
            warm_up: false,
            http_timeout_secs: default_http_timeout_secs(),
            port: default_port(),
        }
    }
}

impl BridgeSettings {
    /// Settings rooted at `base_dir`, everything else default.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn binaries_dir(&self) -> PathBuf {
        self.base_dir.join(BINARIES_DIR_NAME)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Arguments passed to the engine; the client flag always comes first.
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = vec![self.client_arg.clone()];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("NEOAI_BASE_DIR") {
            self.base_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("NEOAI_UPDATE_URL") {
            self.update_url = url;
        }
        if let Ok(path) = std::env::var("NEOAI_CUSTOM_BINARY_PATH") {
            self.custom_binary_path = Some(PathBuf::from(path));
        }
        if let Ok(ms) = std::env::var("NEOAI_REQUEST_TIMEOUT_MS") {
            let ms = ms.parse::<u64>().map_err(|_| {
                BridgeError::Config(format!("NEOAI_REQUEST_TIMEOUT_MS is not a number: '{}'", ms))
            })?;
            self.request_timeout_ms = Some(ms).filter(|ms| *ms > 0);
        }
        if let Ok(flag) = std::env::var("NEOAI_WARM_UP") {
            self.warm_up = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(port) = std::env::var("NEOAI_PORT") {
            self.port = port
                .parse::<u16>()
                .map_err(|_| BridgeError::Config(format!("NEOAI_PORT is not a port: '{}'", port)))?;
        }
        Ok(())
    }
}

/// Loads settings from an optional JSON file, then applies environment
/// overrides. A missing file is not an error.
pub fn load_settings(config_path: Option<&Path>) -> Result<BridgeSettings> {
    let mut settings = match config_path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path).map_err(|e| {
                BridgeError::Config(format!("could not read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                BridgeError::Config(format!("could not parse {}: {}", path.display(), e))
            })?
        }
        Some(path) => {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            BridgeSettings::default()
        }
        None => BridgeSettings::default(),
    };

    settings.apply_env_overrides()?;
    tracing::debug!("Resolved settings: {:?}", settings);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(&path, r#"{"port": 8123, "extra_args": ["--log-level", "debug"]}"#).unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.port, 8123);
        assert_eq!(settings.executable_name, EXECUTABLE_NAME);
        assert_eq!(
            settings.engine_args(),
            vec![CLIENT_ARG.to_string(), "--log-level".to_string(), "debug".to_string()]
        );
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn binaries_dir_is_under_base_dir() {
        let settings = BridgeSettings::with_base_dir("/srv/neoai");
        assert_eq!(settings.binaries_dir(), PathBuf::from("/srv/neoai/binaries"));
        assert_eq!(settings.request_timeout(), None);
    }
}
