//! Layered configuration: hardcoded defaults, optional TOML file, then
//! environment variable overrides — same precedence order as the
//! core config loader this crate grew out of.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    Postgres,
    None,
}

impl std::str::FromStr for CheckpointBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            "none" => Ok(Self::None),
            other => Err(ConfigError::InvalidEnvValue {
                var: "CHECKPOINT_BACKEND".to_string(),
                value: other.to_string(),
                expected: "memory|postgres|none".to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid value for ${var}: '{value}' (expected: {expected})")]
    InvalidEnvValue {
        var: String,
        value: String,
        expected: String,
    },
}

/// Application-wide settings. Every field has a hardcoded default
/// mirroring the values spec'd for the pipeline; a TOML file and then
/// environment variables may override them, in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cors_origins: Vec<String>,

    pub naver_max_concurrency: usize,
    pub ddg_max_concurrency: usize,

    pub external_api_timeout_seconds: f64,
    pub external_api_retry_attempts: usize,
    pub external_api_backoff_seconds: f64,

    pub checkpoint_enabled: bool,
    pub checkpoint_backend: CheckpointBackend,
    pub checkpoint_ttl_seconds: i64,

    pub embed_model: String,
    pub embed_dim: usize,
    pub embed_ndigits: usize,

    pub stage4_low_overlap_threshold: f64,
    pub stage5_threshold_rumor: f64,
    pub stage3_web_query_cap_per_claim: usize,
    pub stage3_html_signal_enabled: bool,
    pub stage3_html_signal_top_n: usize,
    pub stage9_quality_cutoff: f64,

    pub stage6_llm_timeout_seconds: u64,
    pub stage_soft_timeout_seconds: u64,

    pub heartbeat_interval_seconds: u64,

    pub llm_primary_base_url: String,
    pub llm_fallback_base_url: Option<String>,
    pub judge_base_url: Option<String>,

    pub corpus_db_path: String,
    pub corpus_db_pool_size: u32,
    pub checkpoint_db_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec!["*".to_string()],
            naver_max_concurrency: 3,
            ddg_max_concurrency: 3,
            external_api_timeout_seconds: 10.0,
            external_api_retry_attempts: 3,
            external_api_backoff_seconds: 0.4,
            checkpoint_enabled: true,
            checkpoint_backend: CheckpointBackend::Memory,
            checkpoint_ttl_seconds: 86_400,
            embed_model: "bge-m3".to_string(),
            embed_dim: 1024,
            embed_ndigits: 6,
            stage4_low_overlap_threshold: 0.4,
            stage5_threshold_rumor: 0.78,
            stage3_web_query_cap_per_claim: 3,
            stage3_html_signal_enabled: true,
            stage3_html_signal_top_n: 5,
            stage9_quality_cutoff: 65.0,
            stage6_llm_timeout_seconds: 60,
            stage_soft_timeout_seconds: 120,
            heartbeat_interval_seconds: 5,
            llm_primary_base_url: "http://localhost:11434/v1".to_string(),
            llm_fallback_base_url: None,
            judge_base_url: None,
            corpus_db_path: "veritas_corpus.db".to_string(),
            corpus_db_pool_size: 10,
            checkpoint_db_path: "veritas_checkpoints.db".to_string(),
        }
    }
}

/// Loads config in three layers: hardcoded defaults, an optional TOML
/// file, then `VERITAS_*` environment variable overrides.
pub struct ConfigLoader {
    file_path: Option<std::path::PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file_path: None,
            env_prefix: "VERITAS".to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = &self.file_path
            && path.exists()
        {
            let text = std::fs::read_to_string(path)?;
            config = toml::from_str(&text)?;
        }

        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    fn env_var(&self, key: &str) -> Option<String> {
        env::var(format!("{}_{key}", self.env_prefix)).ok()
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(v) = self.env_var("NAVER_MAX_CONCURRENCY") {
            config.naver_max_concurrency = parse_env(&self.env_prefix, "NAVER_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = self.env_var("DDG_MAX_CONCURRENCY") {
            config.ddg_max_concurrency = parse_env(&self.env_prefix, "DDG_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = self.env_var("EXTERNAL_API_TIMEOUT_SECONDS") {
            config.external_api_timeout_seconds =
                parse_env(&self.env_prefix, "EXTERNAL_API_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = self.env_var("EXTERNAL_API_RETRY_ATTEMPTS") {
            config.external_api_retry_attempts =
                parse_env(&self.env_prefix, "EXTERNAL_API_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = self.env_var("EXTERNAL_API_BACKOFF_SECONDS") {
            config.external_api_backoff_seconds =
                parse_env(&self.env_prefix, "EXTERNAL_API_BACKOFF_SECONDS", &v)?;
        }
        if let Some(v) = self.env_var("CHECKPOINT_ENABLED") {
            config.checkpoint_enabled = parse_env(&self.env_prefix, "CHECKPOINT_ENABLED", &v)?;
        }
        if let Some(v) = self.env_var("CHECKPOINT_BACKEND") {
            config.checkpoint_backend = v.parse()?;
        }
        if let Some(v) = self.env_var("CHECKPOINT_TTL_SECONDS") {
            config.checkpoint_ttl_seconds = parse_env(&self.env_prefix, "CHECKPOINT_TTL_SECONDS", &v)?;
        }
        if let Some(v) = self.env_var("EMBED_MODEL") {
            config.embed_model = v;
        }
        if let Some(v) = self.env_var("EMBED_DIM") {
            config.embed_dim = parse_env(&self.env_prefix, "EMBED_DIM", &v)?;
        }
        if let Some(v) = self.env_var("EMBED_NDIGITS") {
            config.embed_ndigits = parse_env(&self.env_prefix, "EMBED_NDIGITS", &v)?;
        }
        if let Some(v) = self.env_var("STAGE9_QUALITY_CUTOFF") {
            config.stage9_quality_cutoff = parse_env(&self.env_prefix, "STAGE9_QUALITY_CUTOFF", &v)?;
        }
        if let Some(v) = self.env_var("LLM_PRIMARY_BASE_URL") {
            config.llm_primary_base_url = v;
        }
        if let Some(v) = self.env_var("LLM_FALLBACK_BASE_URL") {
            config.llm_fallback_base_url = Some(v);
        }
        if let Some(v) = self.env_var("CORPUS_DB_PATH") {
            config.corpus_db_path = v;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(prefix: &str, key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidEnvValue {
        var: format!("{prefix}_{key}"),
        value: raw.to_string(),
        expected: std::any::type_name::<T>().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec_values() {
        let config = AppConfig::default();
        assert_eq!(config.naver_max_concurrency, 3);
        assert_eq!(config.ddg_max_concurrency, 3);
        assert_eq!(config.external_api_timeout_seconds, 10.0);
        assert_eq!(config.external_api_retry_attempts, 3);
        assert_eq!(config.checkpoint_ttl_seconds, 86_400);
        assert_eq!(config.embed_ndigits, 6);
        assert_eq!(config.stage4_low_overlap_threshold, 0.4);
        assert_eq!(config.stage5_threshold_rumor, 0.78);
        assert_eq!(config.stage9_quality_cutoff, 65.0);
    }

    #[test]
    #[serial]
    fn env_override_takes_precedence_over_default() {
        // SAFETY: test is `#[serial]`, no concurrent env mutation in this process.
        unsafe {
            env::set_var("VERITAS_TEST_NAVER_MAX_CONCURRENCY", "7");
        }
        let loader = ConfigLoader::new().with_env_prefix("VERITAS_TEST");
        let config = loader.load().unwrap();
        assert_eq!(config.naver_max_concurrency, 7);
        unsafe {
            env::remove_var("VERITAS_TEST_NAVER_MAX_CONCURRENCY");
        }
    }

    #[test]
    fn bad_checkpoint_backend_is_rejected() {
        let result: Result<CheckpointBackend, _> = "bogus".parse();
        assert!(result.is_err());
    }
}
