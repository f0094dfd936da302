//! Configuration and settings management
//!
//! Loads settings from environment variables and defines tunable defaults.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Policy applied when the membership lookup itself fails.
///
/// The lookup is an opaque oracle: when it errors (bot not admin in the
/// channel, private channel, network trouble) we cannot tell whether the user
/// joined. `Open` admits the user on lookup errors so a misconfigured gate
/// does not lock everyone out; `Closed` rejects until the lookup succeeds.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipFailPolicy {
    /// Admit the user when the lookup fails
    #[default]
    Open,
    /// Reject the user when the lookup fails
    Closed,
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Channel users must join before the bot serves them
    /// (`@username` or a numeric chat id)
    pub force_join_channel: Option<String>,

    /// Chat that receives a copy of every served request
    #[serde(rename = "admin_group_id")]
    pub admin_group_id_str: Option<String>,

    /// Comma-separated list of administrator user IDs
    #[serde(rename = "admin_ids")]
    pub admin_ids_str: Option<String>,

    /// What to do when the membership lookup errors out
    #[serde(default)]
    pub membership_fail_policy: MembershipFailPolicy,

    /// Base URL of the link-resolution API
    #[serde(default = "default_resolver_api_base")]
    pub resolver_api_base: String,
}

fn default_resolver_api_base() -> String {
    "https://teraboxapi.alphaapi.workers.dev/".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Returns the set of Telegram IDs allowed to use admin commands
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<i64> {
        self.admin_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the given user may run admin commands
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids().contains(&user_id)
    }

    /// Moderation chat id, if one is configured and parseable.
    ///
    /// An invalid value disables mirroring rather than failing startup.
    #[must_use]
    pub fn admin_group_id(&self) -> Option<i64> {
        self.admin_group_id_str
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Timeout for a single resolver metadata call
const RESOLVER_TIMEOUT_SECS: u64 = 15;
/// Timeout for a proxy download of file bytes
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;
/// One served request per user per this many seconds
const THROTTLE_INTERVAL_SECS: u64 = 15;
/// Maximum entries in the throttle cache
const THROTTLE_CACHE_MAX_SIZE: u64 = 10_000;
/// Maximum entries in the seen-user registry
const USER_REGISTRY_MAX_SIZE: u64 = 100_000;
/// Largest file sent to Telegram by remote URL reference (Bot API limit is 20 MB)
const STREAM_CEILING_BYTES: u64 = 20 * 1024 * 1024;
/// Largest file downloaded and re-uploaded as bytes (Bot API upload limit is 50 MB)
const PROXY_CEILING_BYTES: u64 = 48 * 1024 * 1024;

/// Get resolver call timeout from env or default.
///
/// Environment variable: `RESOLVER_TIMEOUT_SECS`.
#[must_use]
pub fn get_resolver_timeout_secs() -> u64 {
    std::env::var("RESOLVER_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(RESOLVER_TIMEOUT_SECS)
}

/// Get proxy download timeout from env or default.
///
/// Environment variable: `DOWNLOAD_TIMEOUT_SECS`.
#[must_use]
pub fn get_download_timeout_secs() -> u64 {
    std::env::var("DOWNLOAD_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DOWNLOAD_TIMEOUT_SECS)
}

/// Get per-user serve interval from env or default.
///
/// Environment variable: `THROTTLE_INTERVAL_SECS`.
#[must_use]
pub fn get_throttle_interval_secs() -> u64 {
    std::env::var("THROTTLE_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(THROTTLE_INTERVAL_SECS)
}

/// Get throttle cache capacity from env or default.
///
/// Environment variable: `THROTTLE_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_throttle_cache_max_size() -> u64 {
    std::env::var("THROTTLE_CACHE_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(THROTTLE_CACHE_MAX_SIZE)
}

/// Get seen-user registry capacity from env or default.
///
/// Environment variable: `USER_REGISTRY_MAX_SIZE`.
#[must_use]
pub fn get_user_registry_max_size() -> u64 {
    std::env::var("USER_REGISTRY_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(USER_REGISTRY_MAX_SIZE)
}

/// Get the URL-reference send ceiling from env or default.
///
/// Environment variable: `STREAM_CEILING_BYTES`.
#[must_use]
pub fn get_stream_ceiling_bytes() -> u64 {
    std::env::var("STREAM_CEILING_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(STREAM_CEILING_BYTES)
}

/// Get the download-and-reupload ceiling from env or default.
///
/// Environment variable: `PROXY_CEILING_BYTES`.
#[must_use]
pub fn get_proxy_ceiling_bytes() -> u64 {
    std::env::var("PROXY_CEILING_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(PROXY_CEILING_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            force_join_channel: None,
            admin_group_id_str: None,
            admin_ids_str: None,
            membership_fail_policy: MembershipFailPolicy::default(),
            resolver_api_base: default_resolver_api_base(),
        }
    }

    #[test]
    fn test_admin_list_parsing() {
        let mut settings = bare_settings();

        // Comma separated
        settings.admin_ids_str = Some("123,456".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&123));
        assert!(admins.contains(&456));
        assert_eq!(admins.len(), 2);

        // Space separated
        settings.admin_ids_str = Some("111 222".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&111));
        assert!(admins.contains(&222));
        assert_eq!(admins.len(), 2);

        // Semicolon and mixed
        settings.admin_ids_str = Some("333; 444, 555".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&333));
        assert!(admins.contains(&444));
        assert!(admins.contains(&555));
        assert_eq!(admins.len(), 3);

        // Invalid entries are skipped, not fatal
        settings.admin_ids_str = Some("abc, 777".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains(&777));
        assert_eq!(admins.len(), 1);

        // Unset list means no admins at all
        settings.admin_ids_str = None;
        assert!(settings.admin_ids().is_empty());
        assert!(!settings.is_admin(777));
    }

    #[test]
    fn test_admin_group_id_parsing() {
        let mut settings = bare_settings();

        settings.admin_group_id_str = Some("-1001234567890".to_string());
        assert_eq!(settings.admin_group_id(), Some(-1_001_234_567_890));

        // Invalid value disables mirroring instead of failing
        settings.admin_group_id_str = Some("not-a-chat-id".to_string());
        assert_eq!(settings.admin_group_id(), None);

        settings.admin_group_id_str = None;
        assert_eq!(settings.admin_group_id(), None);
    }

    #[test]
    fn test_fail_policy_default_is_open() {
        assert_eq!(MembershipFailPolicy::default(), MembershipFailPolicy::Open);

        let parsed: MembershipFailPolicy =
            serde_json::from_str("\"closed\"").expect("policy should parse");
        assert_eq!(parsed, MembershipFailPolicy::Closed);
    }

    // Runs in its own test fn to avoid env var races with other tests
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        std::env::set_var("TELEGRAM_TOKEN", "dummy_token");
        std::env::set_var("MEMBERSHIP_FAIL_POLICY", "closed");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(
            settings.membership_fail_policy,
            MembershipFailPolicy::Closed
        );
        assert_eq!(settings.resolver_api_base, default_resolver_api_base());

        std::env::remove_var("TELEGRAM_TOKEN");
        std::env::remove_var("MEMBERSHIP_FAIL_POLICY");
        Ok(())
    }
}
