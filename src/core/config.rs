use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::name::NameStrategySelection;

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (onetool-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "ONETOOL_SCOUT_CONFIG";
pub const ENV_BASE_URL: &str = "ONETOOL_CRM_BASE_URL";
pub const ENV_AUTH_HEADER: &str = "ONETOOL_AUTH_HEADER";
pub const ENV_TENANT_HEADER: &str = "ONETOOL_TENANT_HEADER";
pub const ENV_STORAGE_PATH: &str = "ONETOOL_STORAGE_PATH";
pub const ENV_HTTP_TIMEOUT: &str = "HTTP_TIMEOUT_SECS";
pub const ENV_POLL_INTERVAL: &str = "ONETOOL_POLL_INTERVAL_MS";
pub const ENV_CONTAINER_BUDGET: &str = "ONETOOL_CONTAINER_BUDGET_MS";
pub const ENV_SETTLE_DELAY: &str = "ONETOOL_SETTLE_DELAY_MS";
pub const ENV_NAME_STRATEGY: &str = "ONETOOL_NAME_STRATEGY";
pub const ENV_BROWSER_PROFILE: &str = "ONETOOL_BROWSER_PROFILE";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

pub const DEFAULT_BASE_URL: &str = "https://api.1tool.com/api";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_CONTAINER_BUDGET_MS: u64 = 10_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2_500;

/// 16px brand mark used for the injected button, label and spinner.
pub const DEFAULT_ICON_URL: &str = "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' width='16' height='16'><circle cx='8' cy='8' r='7' fill='%230a66c2'/><text x='8' y='12' font-size='10' text-anchor='middle' fill='white'>1</text></svg>";

/// Top-level config loaded from `onetool-scout.json`.
///
/// Every field is optional in the file; the `resolve_*` accessors fall back
/// to an env var and then to a built-in default.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutConfig {
    /// CRM API root, e.g. `https://acme.1tool.com/api`.
    pub base_url: Option<String>,
    /// Header carrying `Bearer <token>`.
    pub authorization_header: Option<String>,
    /// Header carrying the tenant identifier.
    pub tenant_header: Option<String>,
    /// Key-value store file holding the cached credential.
    pub storage_path: Option<PathBuf>,
    pub http_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    /// Budget for discovering the action-button container.
    pub container_budget_ms: Option<u64>,
    /// Delay before re-running a cycle after a `replace` navigation.
    pub settle_delay_ms: Option<u64>,
    /// `auto`, `contact-info` or `notification-label`.
    pub name_strategy: Option<String>,
    pub icon_url: Option<String>,
    /// Chromium user-data dir; keeps the LinkedIn session between runs.
    pub browser_profile_dir: Option<PathBuf>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.parse().ok())
}

fn state_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".onetool-scout"))
}

impl ScoutConfig {
    /// Base URL: JSON field → `ONETOOL_CRM_BASE_URL` → built-in default.
    /// Trailing slashes are dropped so paths can be appended with `/`.
    pub fn resolve_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| env_nonempty(ENV_BASE_URL))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn resolve_authorization_header(&self) -> String {
        self.authorization_header
            .clone()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| env_nonempty(ENV_AUTH_HEADER))
            .unwrap_or_else(|| "Authorization".to_string())
    }

    pub fn resolve_tenant_header(&self) -> String {
        self.tenant_header
            .clone()
            .filter(|h| !h.trim().is_empty())
            .or_else(|| env_nonempty(ENV_TENANT_HEADER))
            .unwrap_or_else(|| "X-Tenant".to_string())
    }

    /// Storage file: JSON field → `ONETOOL_STORAGE_PATH` → `~/.onetool-scout/storage.json`.
    pub fn resolve_storage_path(&self) -> Option<PathBuf> {
        if let Some(p) = &self.storage_path {
            return Some(p.clone());
        }
        if let Some(p) = env_nonempty(ENV_STORAGE_PATH) {
            return Some(PathBuf::from(p));
        }
        state_dir().map(|d| d.join("storage.json"))
    }

    pub fn resolve_http_timeout(&self) -> Duration {
        Duration::from_secs(
            self.http_timeout_secs
                .or_else(|| env_parsed(ENV_HTTP_TIMEOUT))
                .unwrap_or(30),
        )
    }

    pub fn resolve_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .or_else(|| env_parsed(ENV_POLL_INTERVAL))
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn resolve_container_budget(&self) -> Duration {
        Duration::from_millis(
            self.container_budget_ms
                .or_else(|| env_parsed(ENV_CONTAINER_BUDGET))
                .unwrap_or(DEFAULT_CONTAINER_BUDGET_MS),
        )
    }

    pub fn resolve_settle_delay(&self) -> Duration {
        Duration::from_millis(
            self.settle_delay_ms
                .or_else(|| env_parsed(ENV_SETTLE_DELAY))
                .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
        )
    }

    /// Unknown values log a warning and fall back to `auto`.
    pub fn resolve_name_strategy(&self) -> NameStrategySelection {
        let raw = self
            .name_strategy
            .clone()
            .or_else(|| env_nonempty(ENV_NAME_STRATEGY));
        match raw {
            None => NameStrategySelection::Auto,
            Some(v) => NameStrategySelection::parse_str(&v).unwrap_or_else(|| {
                tracing::warn!("unknown name_strategy '{}', falling back to auto", v);
                NameStrategySelection::Auto
            }),
        }
    }

    pub fn resolve_icon_url(&self) -> String {
        self.icon_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ICON_URL.to_string())
    }

    pub fn resolve_browser_profile_dir(&self) -> Option<PathBuf> {
        if let Some(p) = &self.browser_profile_dir {
            return Some(p.clone());
        }
        if let Some(p) = env_nonempty(ENV_BROWSER_PROFILE) {
            return Some(PathBuf::from(p));
        }
        state_dir().map(|d| d.join("chromium"))
    }
}

/// Load `onetool-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `ONETOOL_SCOUT_CONFIG` env var path
/// 2. `./onetool-scout.json`
/// 3. `~/.onetool-scout/config.json`
///
/// Missing file → `ScoutConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config() -> ScoutConfig {
    let mut candidates = vec![PathBuf::from("onetool-scout.json")];
    if let Some(dir) = state_dir() {
        candidates.push(dir.join("config.json"));
    }
    if let Some(env_path) = env_nonempty(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        if let Some(cfg) = load_from(path) {
            return cfg;
        }
    }

    ScoutConfig::default()
}

/// `None` when the file is absent; defaults when it exists but is malformed.
fn load_from(path: &Path) -> Option<ScoutConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ScoutConfig>(&contents) {
        Ok(cfg) => {
            tracing::info!("onetool-scout config loaded from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!(
                "onetool-scout config parse error at {}: {}; using defaults",
                path.display(),
                e
            );
            Some(ScoutConfig::default())
        }
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path;
/// otherwise `scraping::browser_manager::find_chrome_executable()` auto-discovers.
pub fn chrome_executable_override() -> Option<String> {
    let p = env_nonempty(ENV_CHROME_EXECUTABLE)?;
    if Path::new(&p).exists() {
        Some(p)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_win() {
        let cfg: ScoutConfig = serde_json::from_str(
            r#"{
                "base_url": "https://acme.1tool.com/api/",
                "poll_interval_ms": 20,
                "container_budget_ms": 500,
                "name_strategy": "notification-label"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.resolve_base_url(), "https://acme.1tool.com/api");
        assert_eq!(cfg.resolve_poll_interval(), Duration::from_millis(20));
        assert_eq!(cfg.resolve_container_budget(), Duration::from_millis(500));
        assert_eq!(
            cfg.resolve_name_strategy(),
            NameStrategySelection::NotificationLabel
        );
    }

    #[test]
    fn zero_poll_interval_is_ignored() {
        let cfg = ScoutConfig {
            poll_interval_ms: Some(0),
            ..Default::default()
        };
        assert!(cfg.resolve_poll_interval() > Duration::ZERO);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onetool-scout.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cfg = load_from(&path).expect("existing file is reported");
        assert!(cfg.base_url.is_none());
        assert!(load_from(&dir.path().join("missing.json")).is_none());
    }
}
