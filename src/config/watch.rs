// src/config/watch.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::amount::DEFAULT_AMOUNT_KEYWORD;
use crate::fingerprint::DEFAULT_MIN_FINGERPRINT_LEN;
use crate::observer::http::{HttpSessionConfig, DEFAULT_USER_AGENT};
use crate::observer::matcher::{PhraseMatcher, DEFAULT_TARGET_PHRASE};
use crate::observer::ObserverConfig;
use crate::pipeline::PipelineConfig;

pub const ENV_CONFIG_PATH: &str = "RAIN_WATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/rain_watch.toml";

fn default_base_url() -> String {
    "https://bandit.camp".to_string()
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_poll_interval_ms() -> u64 {
    20_000
}
fn default_refresh_interval_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_scan_timeout_ms() -> u64 {
    30_000
}
fn default_duplicate_window_ms() -> u64 {
    3 * 60 * 1000
}
fn default_cooldown_minutes() -> u64 {
    25
}
fn default_min_fingerprint_len() -> usize {
    DEFAULT_MIN_FINGERPRINT_LEN
}
fn default_target_phrase() -> String {
    DEFAULT_TARGET_PHRASE.to_string()
}
fn default_amount_keyword() -> String {
    DEFAULT_AMOUNT_KEYWORD.to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_fetch_failures() -> u32 {
    10
}
fn default_channel_capacity() -> usize {
    64
}
fn default_site_name() -> String {
    "BANDIT CAMP".to_string()
}
fn default_unit() -> String {
    "SCRAP".to_string()
}

/// Everything the watcher reads at start-up. File values are optional; env wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default = "default_min_fingerprint_len")]
    pub min_fingerprint_len: usize,
    #[serde(default = "default_target_phrase")]
    pub target_phrase: String,
    #[serde(default = "default_amount_keyword")]
    pub amount_keyword: String,
    #[serde(default = "default_true")]
    pub require_positive_amount: bool,
    #[serde(default = "default_max_fetch_failures")]
    pub max_fetch_failures: u32,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            poll_interval_ms: default_poll_interval_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
            duplicate_window_ms: default_duplicate_window_ms(),
            cooldown_minutes: default_cooldown_minutes(),
            min_fingerprint_len: default_min_fingerprint_len(),
            target_phrase: default_target_phrase(),
            amount_keyword: default_amount_keyword(),
            require_positive_amount: true,
            max_fetch_failures: default_max_fetch_failures(),
            channel_capacity: default_channel_capacity(),
            discord_webhook_url: None,
            site_name: default_site_name(),
            unit: default_unit(),
            metrics_addr: None,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env_str(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl WatchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: WatchConfig = toml::from_str(s).context("parsing watcher config toml")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading watcher config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// Load using file + env:
    /// 1) $RAIN_WATCH_CONFIG (must exist when set)
    /// 2) config/rain_watch.toml
    /// 3) built-in defaults
    ///
    /// Environment variables then override individual values.
    pub fn load() -> Result<Self> {
        let base = if let Some(p) = env_str(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides().sanitized())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_str("BANDIT_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env_str("BANDIT_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = env_parse("POLL_INTERVAL_MS") {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("REFRESH_INTERVAL_MS") {
            self.refresh_interval_ms = v;
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = v;
        }
        if let Some(v) = env_parse("SCAN_TIMEOUT_MS") {
            self.scan_timeout_ms = v;
        }
        if let Some(v) = env_parse("DUPLICATE_RESET_MS") {
            self.duplicate_window_ms = v;
        }
        if let Some(v) = env_parse("COOLDOWN_MINUTES") {
            self.cooldown_minutes = v;
        }
        if let Some(v) = env_parse("MIN_FINGERPRINT_LEN") {
            self.min_fingerprint_len = v;
        }
        if let Some(v) = env_str("TARGET_PHRASE") {
            self.target_phrase = v;
        }
        if let Some(v) = env_str("AMOUNT_KEYWORD") {
            self.amount_keyword = v;
        }
        if let Some(v) = env_flag("REQUIRE_POSITIVE_AMOUNT") {
            self.require_positive_amount = v;
        }
        if let Some(v) = env_parse("MAX_FETCH_FAILURES") {
            self.max_fetch_failures = v;
        }
        if let Some(v) = env_str("DISCORD_WEBHOOK_URL") {
            self.discord_webhook_url = Some(v);
        }
        if let Some(v) = env_str("ALERT_SITE_NAME") {
            self.site_name = v;
        }
        if let Some(v) = env_str("ALERT_UNIT") {
            self.unit = v;
        }
        if let Some(v) = env_str("METRICS_ADDR") {
            self.metrics_addr = Some(v);
        }
        self
    }

    /// Replace zero/blank values with defaults so a bad file cannot stall the loops.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if self.base_url.trim().is_empty() {
            self.base_url = d.base_url;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = d.poll_interval_ms;
        }
        if self.refresh_interval_ms == 0 {
            self.refresh_interval_ms = d.refresh_interval_ms;
        }
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = d.request_timeout_ms;
        }
        if self.scan_timeout_ms == 0 {
            self.scan_timeout_ms = d.scan_timeout_ms;
        }
        if self.duplicate_window_ms == 0 {
            self.duplicate_window_ms = d.duplicate_window_ms;
        }
        if self.target_phrase.trim().is_empty() {
            self.target_phrase = d.target_phrase;
        }
        if self.amount_keyword.trim().is_empty() {
            self.amount_keyword = d.amount_keyword;
        }
        if self.max_fetch_failures == 0 {
            self.max_fetch_failures = d.max_fetch_failures;
        }
        if self.channel_capacity == 0 {
            self.channel_capacity = d.channel_capacity;
        }
        self.discord_webhook_url = self
            .discord_webhook_url
            .filter(|u| !u.trim().is_empty());
        self
    }

    pub fn observer(&self) -> ObserverConfig {
        ObserverConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            scan_timeout: Duration::from_millis(self.scan_timeout_ms),
            scan_on_start: true,
        }
    }

    pub fn matcher(&self) -> PhraseMatcher {
        PhraseMatcher::new(&self.target_phrase)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            duplicate_window: Duration::from_millis(self.duplicate_window_ms),
            cooldown: Duration::from_secs(self.cooldown_minutes.saturating_mul(60)),
            min_fingerprint_len: self.min_fingerprint_len,
            amount_keyword: self.amount_keyword.clone(),
            require_positive_amount: self.require_positive_amount,
        }
    }

    pub fn http_session(&self) -> HttpSessionConfig {
        HttpSessionConfig {
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            max_failures: self.max_fetch_failures,
        }
    }

    pub fn metrics_socket(&self) -> Result<Option<SocketAddr>> {
        self.metrics_addr
            .as_deref()
            .map(|a| {
                a.parse::<SocketAddr>()
                    .with_context(|| format!("invalid METRICS_ADDR {a}"))
            })
            .transpose()
    }
}
