use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default quiet window for coalescing rule change signals.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default per-bundle rule ceiling.
pub const DEFAULT_RULES_LIMIT: usize = 50_000;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            pipeline: PipelineConfig::from_env(),
            storage: StorageConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  pipeline:    debounce={}ms, rules_limit={}, event_capacity={}",
            self.pipeline.debounce_ms,
            self.pipeline.rules_limit,
            self.pipeline.event_capacity
        );
        tracing::info!(
            "  storage:     data_dir={}, output_dir={}, catalog={}",
            self.storage.data_dir.display(),
            self.storage.output_dir.display(),
            self.storage
                .catalog_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(built-in)".to_string())
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Quiet window after the last change signal before a reload runs.
    pub debounce_ms: u64,
    /// Rules per bundle above which the bundle is flagged over limit.
    pub rules_limit: usize,
    /// Buffer size of the event bus broadcast channel.
    pub event_capacity: usize,
}

impl PipelineConfig {
    fn from_env() -> Self {
        Self {
            debounce_ms: env_u64("RULECAST_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS),
            rules_limit: env_usize("RULECAST_RULES_LIMIT", DEFAULT_RULES_LIMIT),
            event_capacity: env_usize("RULECAST_EVENT_CAPACITY", 256).max(1),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            rules_limit: DEFAULT_RULES_LIMIT,
            event_capacity: 256,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `filters/`, `allowlist.txt` and `settings.json`.
    pub data_dir: PathBuf,
    /// Directory the reference consumer writes bundle payloads into.
    pub output_dir: PathBuf,
    /// Optional YAML bundle catalog; built-in targets are used when absent.
    pub catalog_path: Option<PathBuf>,
}

impl StorageConfig {
    fn from_env() -> Self {
        let data_dir = PathBuf::from(env_or("RULECAST_DATA_DIR", "data"));
        let output_dir = env_opt("RULECAST_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("bundles"));
        Self {
            data_dir,
            output_dir,
            catalog_path: env_opt("RULECAST_CATALOG").map(PathBuf::from),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("data/bundles"),
            catalog_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let cfg = Config::default();
        assert_eq!(cfg.pipeline.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.pipeline.rules_limit, 50_000);
        assert_eq!(cfg.storage.output_dir, PathBuf::from("data/bundles"));
        assert!(cfg.storage.catalog_path.is_none());
    }
}
