// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8787
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body size, in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit: default_body_limit(),
        }
    }
}

fn default_upstream_timeout() -> u64 {
    120
}

/// Connection details for the upstream LLM API that requests are forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API, e.g. `https://api.anthropic.com`.
    pub base_url: String,
    /// Environment variable holding the upstream credential (preferred over
    /// `api_key` so secrets don't land in version-controlled config files).
    pub api_key_env: Option<String>,
    /// Explicit credential; only used when `api_key_env` is unset.
    pub api_key: Option<String>,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            api_key: None,
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// Resolve the credential to forward, preferring the env var over the
    /// inline value so config files committed to version control never leak
    /// a secret in practice.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(var) = &self.api_key_env {
            if let Ok(v) = std::env::var(var) {
                if !v.is_empty() {
                    return Some(v);
                }
            }
        }
        self.api_key.clone()
    }
}

fn default_memory_timeout() -> u64 {
    5
}

fn default_memory_limit() -> usize {
    3
}

/// Client settings for the external team-memory / ingest service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_memory_timeout")]
    pub timeout_secs: u64,
    /// Memories returned per preview (spec default 3, tunable up to 5).
    #[serde(default = "default_memory_limit")]
    pub preview_limit: usize,
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_memory_timeout(),
            preview_limit: default_memory_limit(),
        }
    }
}

fn default_analyzer_timeout() -> u64 {
    15
}

/// Client settings for the external LLM-based analyzers (task/drift/alignment/summary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// When `None`, the built-in deterministic mock analyzer is used — useful
    /// for local development and for the test suite.
    pub base_url: Option<String>,
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_analyzer_timeout(),
        }
    }
}

fn default_token_clear_threshold() -> u64 {
    150_000
}
fn default_drift_check_interval() -> u32 {
    5
}
fn default_stale_after_secs() -> u64 {
    3600
}
fn default_completed_retention_secs() -> u64 {
    86_400
}

/// Session lifecycle tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// "actual context size" (cache-creation + cache-read tokens) above which
    /// the core should prefer checkpointing the session.
    #[serde(default = "default_token_clear_threshold")]
    pub token_clear_threshold: u64,
    /// Run a drift check every N assistant turns.
    #[serde(default = "default_drift_check_interval")]
    pub drift_check_interval: u32,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_completed_retention_secs")]
    pub completed_retention_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_clear_threshold: default_token_clear_threshold(),
            drift_check_interval: default_drift_check_interval(),
            stale_after_secs: default_stale_after_secs(),
            completed_retention_secs: default_completed_retention_secs(),
        }
    }
}

fn default_cache_max_entries() -> usize {
    100
}
fn default_cache_idle_evict_secs() -> u64 {
    600
}
fn default_cache_keepalive_after_secs() -> u64 {
    240
}
fn default_cache_keepalive_max_attempts() -> u32 {
    2
}
fn default_cache_tick_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// Extended-cache keep-alive tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub extended_cache_enabled: bool,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_idle_evict_secs")]
    pub idle_evict_secs: u64,
    #[serde(default = "default_cache_keepalive_after_secs")]
    pub keepalive_after_secs: u64,
    #[serde(default = "default_cache_keepalive_max_attempts")]
    pub keepalive_max_attempts: u32,
    #[serde(default = "default_cache_tick_secs")]
    pub tick_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            extended_cache_enabled: true,
            max_entries: default_cache_max_entries(),
            idle_evict_secs: default_cache_idle_evict_secs(),
            keepalive_after_secs: default_cache_keepalive_after_secs(),
            keepalive_max_attempts: default_cache_keepalive_max_attempts(),
            tick_secs: default_cache_tick_secs(),
        }
    }
}

fn default_db_path() -> String {
    "grov.sqlite3".into()
}

/// SQLite persistence location for sessions/steps/drift log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub memory: MemoryServiceConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_http_host_is_loopback() {
        let c = Config::default();
        assert_eq!(c.http.host, "127.0.0.1");
    }

    #[test]
    fn config_default_port_is_8787() {
        let c = Config::default();
        assert_eq!(c.http.port, 8787);
    }

    #[test]
    fn config_default_cache_extended_enabled() {
        let c = Config::default();
        assert!(c.cache.extended_cache_enabled);
        assert_eq!(c.cache.max_entries, 100);
    }

    #[test]
    fn config_default_session_thresholds() {
        let c = Config::default();
        assert_eq!(c.session.drift_check_interval, 5);
        assert_eq!(c.session.stale_after_secs, 3600);
        assert_eq!(c.session.completed_retention_secs, 86_400);
    }

    #[test]
    fn config_default_memory_preview_limit_is_three() {
        let c = Config::default();
        assert_eq!(c.memory.preview_limit, 3);
    }

    #[test]
    fn config_partial_yaml_fills_defaults() {
        let yaml = "http:\n  port: 9000\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.http.port, 9000);
        assert_eq!(c.http.host, "127.0.0.1");
        assert_eq!(c.cache.max_entries, 100);
    }

    #[test]
    fn upstream_resolve_api_key_falls_back_to_inline() {
        let mut cfg = UpstreamConfig::default();
        cfg.api_key_env = Some("GROV_TEST_NONEXISTENT_KEY_VAR".into());
        cfg.api_key = Some("inline-secret".into());
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("inline-secret"));
    }
}
