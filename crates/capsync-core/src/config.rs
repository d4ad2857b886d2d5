use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::request::RequestDefaults;
use crate::retry::RetryPolicy;
use crate::transport::DeadlineFloors;
use crate::upload::UploadSettings;

/// Retry and timeout parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Default number of attempts per operation (including the first).
    pub max_attempts: u32,
    /// Default base timeout in milliseconds for the first attempt.
    pub base_timeout_ms: u64,
    /// Backoff after attempt k is k × step.
    pub backoff_step_ms: u64,
    /// Upper bound on backoff, except for upstream-unavailable failures.
    pub backoff_cap_ms: u64,
    /// Per-attempt timeout multiplier (timeout(k) = base × growth^(k-1)).
    pub timeout_growth: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_timeout_ms: 10_000,
            backoff_step_ms: 1_000,
            backoff_cap_ms: 5_000,
            timeout_growth: 1.5,
        }
    }
}

/// Deadline floors per payload class (optional `[transport]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Minimum first-attempt deadline for small API calls.
    pub small_call_floor_ms: u64,
    /// Minimum first-attempt deadline for large binary transfers.
    pub large_transfer_floor_ms: u64,
    /// TCP/TLS connect timeout used by the curl connector.
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            small_call_floor_ms: 5_000,
            large_transfer_floor_ms: 120_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Upload strategy parameters (optional `[upload]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Payloads strictly below this size use a single simple upload.
    pub simple_threshold_bytes: u64,
    /// Fixed chunk size for resumable uploads.
    pub chunk_size_bytes: u64,
    /// Attempts per chunk (and per simple upload / session call).
    pub chunk_retry_budget: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            simple_threshold_bytes: 50 * 1024 * 1024,
            chunk_size_bytes: 5 * 1024 * 1024,
            chunk_retry_budget: 3,
        }
    }
}

/// Dedup cache parameters (optional `[dedup]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a completed outcome stays joinable.
    pub ttl_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { ttl_ms: 2_000 }
    }
}

/// Global configuration loaded from `~/.config/capsync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsyncConfig {
    /// Base URL for small API calls (metadata registration, reads).
    pub api_base_url: String,
    /// Base URL of the object store.
    pub store_base_url: String,
    /// Static bearer token used by the CLI; applications plug in their own credential provider.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub transport: Option<TransportConfig>,
    #[serde(default)]
    pub upload: Option<UploadConfig>,
    #[serde(default)]
    pub dedup: Option<DedupConfig>,
}

impl Default for CapsyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            store_base_url: "http://127.0.0.1:8080/storage".to_string(),
            auth_token: None,
            retry: None,
            transport: None,
            upload: None,
            dedup: None,
        }
    }
}

impl CapsyncConfig {
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn transport_or_default(&self) -> TransportConfig {
        self.transport.clone().unwrap_or_default()
    }

    pub fn upload_or_default(&self) -> UploadConfig {
        self.upload.clone().unwrap_or_default()
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_millis(self.dedup.clone().unwrap_or_default().ttl_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.retry_or_default())
    }

    /// Budget and base timeout for descriptors built by the REST mappings.
    pub fn request_defaults(&self) -> RequestDefaults {
        let r = self.retry_or_default();
        RequestDefaults {
            retry_budget: r.max_attempts.max(1),
            base_timeout: Duration::from_millis(r.base_timeout_ms),
        }
    }

    pub fn deadline_floors(&self) -> DeadlineFloors {
        let t = self.transport_or_default();
        DeadlineFloors {
            small: Duration::from_millis(t.small_call_floor_ms),
            large: Duration::from_millis(t.large_transfer_floor_ms),
        }
    }

    pub fn upload_settings(&self) -> UploadSettings {
        let u = self.upload_or_default();
        UploadSettings {
            simple_threshold: u.simple_threshold_bytes,
            chunk_size: u.chunk_size_bytes.max(1),
        }
    }

    /// Pretty TOML with the effective values of every section filled in.
    pub fn to_toml(&self) -> Result<String> {
        let mut effective = self.clone();
        effective.retry = Some(self.retry_or_default());
        effective.transport = Some(self.transport_or_default());
        effective.upload = Some(self.upload_or_default());
        effective.dedup = Some(self.dedup.clone().unwrap_or_default());
        if effective.auth_token.is_some() {
            effective.auth_token = Some("<redacted>".to_string());
        }
        Ok(toml::to_string_pretty(&effective)?)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("capsync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CapsyncConfig> {
    load_or_init_at(&config_path()?)
}

/// Like `load_or_init` but with an explicit path (tests, `--config`).
pub fn load_or_init_at(path: &Path) -> Result<CapsyncConfig> {
    if !path.exists() {
        let default_cfg = CapsyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: CapsyncConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_toml_fills_sections_and_hides_token() {
        let cfg = CapsyncConfig {
            auth_token: Some("abc".into()),
            ..CapsyncConfig::default()
        };
        let out = cfg.to_toml().unwrap();
        assert!(out.contains("[retry]"));
        assert!(out.contains("[dedup]"));
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("abc"));
    }

    #[test]
    fn default_config_values() {
        let cfg = CapsyncConfig::default();
        assert!(cfg.auth_token.is_none());
        let upload = cfg.upload_or_default();
        assert_eq!(upload.simple_threshold_bytes, 50 * 1024 * 1024);
        assert_eq!(upload.chunk_size_bytes, 5 * 1024 * 1024);
        let retry = cfg.retry_or_default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff_cap_ms, 5_000);
        assert_eq!(cfg.request_defaults(), RequestDefaults::default());
        assert_eq!(cfg.dedup_ttl(), Duration::from_secs(2));
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = CapsyncConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: CapsyncConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.api_base_url, cfg.api_base_url);
        assert_eq!(parsed.store_base_url, cfg.store_base_url);
        assert!(parsed.retry.is_none());
    }

    #[test]
    fn config_toml_custom_sections() {
        let toml = r#"
            api_base_url = "https://api.example.com/v1"
            store_base_url = "https://store.example.com"
            auth_token = "secret"

            [retry]
            max_attempts = 5
            base_timeout_ms = 2000
            backoff_step_ms = 500
            backoff_cap_ms = 4000
            timeout_growth = 2.0

            [upload]
            simple_threshold_bytes = 1048576
            chunk_size_bytes = 262144
            chunk_retry_budget = 4

            [dedup]
            ttl_ms = 750
        "#;
        let cfg: CapsyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.auth_token.as_deref(), Some("secret"));
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert!((retry.timeout_growth - 2.0).abs() < 1e-9);
        let defaults = cfg.request_defaults();
        assert_eq!(defaults.retry_budget, 5);
        assert_eq!(defaults.base_timeout, Duration::from_secs(2));
        let settings = cfg.upload_settings();
        assert_eq!(settings.simple_threshold, 1_048_576);
        assert_eq!(settings.chunk_size, 262_144);
        assert_eq!(cfg.dedup_ttl(), Duration::from_millis(750));
        // Missing [transport] falls back to defaults.
        assert_eq!(cfg.deadline_floors().large, Duration::from_secs(120));
    }

    #[test]
    fn load_or_init_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let created = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        let loaded = load_or_init_at(&path).unwrap();
        assert_eq!(loaded.api_base_url, created.api_base_url);
    }
}
