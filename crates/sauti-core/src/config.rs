//! Configuration types for the transcription service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Python interpreter used to run the worker.
    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,

    /// Persistent worker daemon script.
    #[serde(default = "default_worker_script")]
    pub worker_script: PathBuf,

    /// One-shot worker script used when the daemon is unreachable.
    #[serde(default = "default_fallback_script")]
    pub fallback_script: PathBuf,

    /// Unix socket the worker daemon listens on.
    #[serde(default = "default_daemon_socket")]
    pub daemon_socket: PathBuf,

    /// Directory for request-scoped scratch copies of uploads.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Preferred compute device ("cuda" or "cpu"). Unset means auto-detect.
    #[serde(default = "default_device_preference")]
    pub device_preference: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            python_cmd: default_python_cmd(),
            worker_script: default_worker_script(),
            fallback_script: default_fallback_script(),
            daemon_socket: default_daemon_socket(),
            scratch_dir: default_scratch_dir(),
            device_preference: default_device_preference(),
        }
    }
}

fn default_python_cmd() -> String {
    env_or("SAUTI_PYTHON", "python3")
}

fn default_worker_script() -> PathBuf {
    PathBuf::from(env_or("SAUTI_WORKER_SCRIPT", "scripts/whisper_daemon.py"))
}

fn default_fallback_script() -> PathBuf {
    PathBuf::from(env_or("SAUTI_FALLBACK_SCRIPT", "scripts/whisper_oneshot.py"))
}

fn default_daemon_socket() -> PathBuf {
    PathBuf::from(env_or("SAUTI_WORKER_SOCKET", "/tmp/sauti_worker.sock"))
}

fn default_scratch_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("SAUTI_SCRATCH_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join("sauti")
}

fn default_device_preference() -> Option<String> {
    std::env::var("SAUTI_DEVICE")
        .ok()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

fn env_or(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.to_string(),
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on uploads processed concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl ServerConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults on missing or unparsable values.
    pub fn from_env() -> Self {
        let host = env_or("SAUTI_HOST", &default_host());
        let port = match std::env::var("SAUTI_PORT") {
            Ok(raw) => match raw.parse::<u16>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!("Invalid SAUTI_PORT='{}', falling back to {}", raw, default_port());
                    default_port()
                }
            },
            Err(_) => default_port(),
        };
        let max_concurrent_requests = std::env::var("MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_max_concurrent);

        Self {
            host,
            port,
            max_concurrent_requests,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_concurrent() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        std::env::set_var("SAUTI_PORT", "not-a-port");
        let config = ServerConfig::from_env();
        assert_eq!(config.port, default_port());
        std::env::remove_var("SAUTI_PORT");
    }

    #[test]
    fn port_is_read_from_env() {
        let _guard = env_lock().lock().expect("env lock poisoned");
        std::env::set_var("SAUTI_PORT", "9001");
        let config = ServerConfig::from_env();
        assert_eq!(config.port, 9001);
        std::env::remove_var("SAUTI_PORT");
    }
}
