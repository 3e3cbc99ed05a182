use std::{env, path::PathBuf, time::Duration};

use worker::{config::app_dir, RunnerConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    /// Cada cuánto el stream de progreso vuelve a leer el tracker
    pub poll_interval: Duration,
    pub max_upload_bytes: usize,
    pub runner: RunnerConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

/// MiB a bytes; un valor enorme queda en `usize::MAX` en vez de desbordar.
fn upload_limit_bytes(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let upload_dir = env::var("SEG_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_dir().join("uploads"));

        Self {
            bind_addr: env::var("SEG_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            upload_dir,
            poll_interval: Duration::from_millis(env_parse(
                "SEG_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            max_upload_bytes: upload_limit_bytes(env_parse(
                "SEG_MAX_UPLOAD_MB",
                DEFAULT_MAX_UPLOAD_MB,
            )),
            runner: RunnerConfig::from_env(),
        }
    }
}
