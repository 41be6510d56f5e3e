//! Engine configuration (§6): recognized keys, loaded from `canopy.toml` with
//! environment overrides via `dotenvy`.

use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_embedding_batch_size() -> usize {
    128
}

fn default_resolver_batch_size() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_watcher_stability_window_ms() -> u64 {
    200
}

fn default_watcher_poll_interval_ms() -> u64 {
    50
}

fn default_tombstone_grace_ms() -> u64 {
    30_000
}

fn default_ai_analysis_confidence_threshold() -> f32 {
    0.7
}

fn default_ai_analysis_budget_tokens() -> u32 {
    50_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_excludes: Vec<String>,
    pub exclude_extensions: Vec<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    pub similarity_threshold: f32,
    pub disable_watcher: bool,
    #[serde(default = "default_true")]
    pub reconcile_on_start: bool,
    #[serde(default = "default_resolver_batch_size")]
    pub resolver_batch_size: usize,
    /// `tsconfig.json`'s `compilerOptions.paths`, pre-loaded by the caller (Open Question b).
    pub ts_paths: std::collections::HashMap<String, Vec<String>>,
    /// PSR-4 namespace prefix → directory table, pre-loaded by the caller.
    pub psr4_map: std::collections::HashMap<String, String>,
    #[serde(default = "default_watcher_stability_window_ms")]
    pub watcher_stability_window_ms: u64,
    #[serde(default = "default_watcher_poll_interval_ms")]
    pub watcher_poll_interval_ms: u64,
    /// How long a tombstoned component survives with no incoming reference
    /// before it's actually removed.
    #[serde(default = "default_tombstone_grace_ms")]
    pub tombstone_grace_ms: u64,
    /// Opt-in supplemental AI-assisted relationship pass (§4.10.1). Off by
    /// default — strictly additive, never required for correctness.
    pub enable_ai_analysis: bool,
    #[serde(default = "default_ai_analysis_confidence_threshold")]
    pub ai_analysis_confidence_threshold: f32,
    #[serde(default = "default_ai_analysis_budget_tokens")]
    pub ai_analysis_budget_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_excludes: Vec::new(),
            exclude_extensions: Vec::new(),
            max_file_size: default_max_file_size(),
            workers: default_workers(),
            embedding_batch_size: default_embedding_batch_size(),
            similarity_threshold: 0.0,
            disable_watcher: false,
            reconcile_on_start: true,
            resolver_batch_size: default_resolver_batch_size(),
            ts_paths: std::collections::HashMap::new(),
            psr4_map: std::collections::HashMap::new(),
            watcher_stability_window_ms: default_watcher_stability_window_ms(),
            watcher_poll_interval_ms: default_watcher_poll_interval_ms(),
            tombstone_grace_ms: default_tombstone_grace_ms(),
            enable_ai_analysis: false,
            ai_analysis_confidence_threshold: default_ai_analysis_confidence_threshold(),
            ai_analysis_budget_tokens: default_ai_analysis_budget_tokens(),
        }
    }
}

impl EngineConfig {
    /// Loads `canopy.toml` from the project root if present, falling back to
    /// defaults; then applies a `.env` file via `dotenvy` for secret-bearing
    /// overrides (e.g. embedding provider API keys), which callers read
    /// directly via `std::env`.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let _ = dotenvy::from_path(root.join(".env"));
        let path = root.join("canopy.toml");
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: EngineConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_file_size, 1024 * 1024);
        assert!(cfg.workers >= 1);
        assert!(cfg.reconcile_on_start);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.embedding_batch_size, 128);
    }

    #[test]
    fn parses_recognized_keys_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("canopy.toml"),
            r#"
            workers = 2
            similarity_threshold = 0.3
            disable_watcher = true
            "#,
        )
        .unwrap();
        let cfg = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.workers, 2);
        assert!((cfg.similarity_threshold - 0.3).abs() < 1e-6);
        assert!(cfg.disable_watcher);
    }
}
