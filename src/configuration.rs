use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde;

use crate::helpers::{host_of, normalize_url};
use crate::labels::ProxyDefaults;

const DEFAULT_MIRROR_INTERVAL_SECS: u64 = 300;
const MIN_MIRROR_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_app_host")]
    pub app_host: String,
    #[serde(default = "Settings::default_app_port")]
    pub app_port: u16,
    #[serde(default)]
    pub npm: NpmSettings,
    #[serde(default)]
    pub docker: DockerSettings,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub host_address: Option<String>,
    #[serde(default)]
    pub proxy_defaults: ProxyDefaultSettings,
    /// Mirror slots come from the environment only (numbered variables),
    /// see `parse_mirror_env`.
    #[serde(skip)]
    pub mirrors: MirrorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_host: Self::default_app_host(),
            app_port: Self::default_app_port(),
            npm: NpmSettings::default(),
            docker: DockerSettings::default(),
            instance_id: None,
            host_address: None,
            proxy_defaults: ProxyDefaultSettings::default(),
            mirrors: MirrorSettings::default(),
        }
    }
}

impl Settings {
    fn default_app_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_app_port() -> u16 {
        8080
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.npm.url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "NPM_URL is required".to_string(),
            ));
        }
        if self.npm.email.trim().is_empty() || self.npm.password.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "NPM_EMAIL and NPM_PASSWORD are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NpmSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Name (or id prefix) of the proxy-manager container; enables
    /// shared-network forward-host inference.
    #[serde(default)]
    pub container_name: Option<String>,
}

impl Default for NpmSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            email: String::new(),
            password: String::new(),
            container_name: None,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DockerSettings {
    #[serde(default = "DockerSettings::default_endpoint")]
    pub endpoint: String,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
        }
    }
}

impl DockerSettings {
    fn default_endpoint() -> String {
        "unix:///var/run/docker.sock".to_string()
    }
}

/// Process-wide defaults for the proxy flag labels.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProxyDefaultSettings {
    #[serde(default)]
    pub ssl_forced: bool,
    #[serde(default)]
    pub caching_enabled: bool,
    #[serde(default = "ProxyDefaultSettings::default_block_exploits")]
    pub block_exploits: bool,
    #[serde(default)]
    pub websocket_upgrade: bool,
    #[serde(default)]
    pub http2: bool,
    #[serde(default)]
    pub hsts: bool,
    #[serde(default)]
    pub hsts_subdomains: bool,
}

impl Default for ProxyDefaultSettings {
    fn default() -> Self {
        Self {
            ssl_forced: false,
            caching_enabled: false,
            block_exploits: Self::default_block_exploits(),
            websocket_upgrade: false,
            http2: false,
            hsts: false,
            hsts_subdomains: false,
        }
    }
}

impl ProxyDefaultSettings {
    const fn default_block_exploits() -> bool {
        true
    }
}

impl From<ProxyDefaultSettings> for ProxyDefaults {
    fn from(settings: ProxyDefaultSettings) -> Self {
        Self {
            ssl_forced: settings.ssl_forced,
            caching_enabled: settings.caching_enabled,
            block_exploits: settings.block_exploits,
            websocket_upgrade: settings.websocket_upgrade,
            http2: settings.http2,
            hsts: settings.hsts,
            hsts_subdomains: settings.hsts_subdomains,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MirrorSlot {
    pub url: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct MirrorSettings {
    pub slots: Vec<MirrorSlot>,
    pub sync_interval_secs: u64,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            sync_interval_secs: DEFAULT_MIRROR_INTERVAL_SECS,
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Start with defaults
    let mut settings = Settings::default();

    // Optional file config; environment always wins below
    let file = config::Config::builder()
        .add_source(config::File::with_name("configuration.yaml").required(false))
        .add_source(config::File::with_name("configuration").required(false))
        .build()?;
    if let Ok(loaded) = file.try_deserialize::<Settings>() {
        settings = loaded;
    }

    if let Ok(url) = std::env::var("NPM_URL") {
        settings.npm.url = url;
    }
    if let Ok(email) = std::env::var("NPM_EMAIL") {
        settings.npm.email = email;
    }
    if let Ok(password) = std::env::var("NPM_PASSWORD") {
        settings.npm.password = password;
    }
    if let Ok(name) = std::env::var("NPM_CONTAINER_NAME") {
        if !name.trim().is_empty() {
            settings.npm.container_name = Some(name);
        }
    }
    if let Ok(endpoint) = std::env::var("DOCKER_ENDPOINT") {
        settings.docker.endpoint = endpoint;
    }
    if let Ok(instance_id) = std::env::var("SYNC_INSTANCE_ID") {
        if !instance_id.trim().is_empty() {
            settings.instance_id = Some(instance_id);
        }
    }
    if let Ok(address) = std::env::var("HOST_ADDRESS") {
        if !address.trim().is_empty() {
            settings.host_address = Some(address);
        }
    }
    if let Ok(host) = std::env::var("APP_HOST") {
        settings.app_host = host;
    }
    if let Ok(port) = std::env::var("APP_PORT") {
        if let Ok(parsed) = port.parse::<u16>() {
            settings.app_port = parsed;
        }
    }

    overlay_flag(&mut settings.proxy_defaults.ssl_forced, "SSL_FORCED_DEFAULT");
    overlay_flag(
        &mut settings.proxy_defaults.caching_enabled,
        "CACHING_ENABLED_DEFAULT",
    );
    overlay_flag(
        &mut settings.proxy_defaults.block_exploits,
        "BLOCK_EXPLOITS_DEFAULT",
    );
    overlay_flag(
        &mut settings.proxy_defaults.websocket_upgrade,
        "WEBSOCKET_UPGRADE_DEFAULT",
    );
    overlay_flag(&mut settings.proxy_defaults.http2, "HTTP2_DEFAULT");
    overlay_flag(&mut settings.proxy_defaults.hsts, "HSTS_DEFAULT");
    overlay_flag(
        &mut settings.proxy_defaults.hsts_subdomains,
        "HSTS_SUBDOMAINS_DEFAULT",
    );

    let vars: HashMap<String, String> = std::env::vars().collect();
    settings.mirrors = parse_mirror_env(&vars);

    settings.validate()?;
    Ok(settings)
}

fn overlay_flag(target: &mut bool, name: &str) {
    if let Ok(value) = std::env::var(name) {
        *target = matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
}

lazy_static! {
    static ref MIRROR_SLOT_URL: Regex =
        Regex::new(r"^MIRROR([0-9]+)_URL$").expect("mirror slot pattern");
}

/// Mirror configuration out of the environment.
///
/// Numbered slots `MIRROR{n}_{URL,EMAIL,PASSWORD,SYNC_INTERVAL}` with
/// global credential/interval fallbacks, plus the legacy comma-separated
/// `MIRROR_URLS` whose per-host credentials derive from the uppercased
/// hostname (`NPM2_EMAIL` for `http://npm2:81`). Slots without URL or
/// credentials are dropped with a warning. The effective interval is the
/// minimum of everything configured and the five-minute default, never
/// under one minute.
pub fn parse_mirror_env(vars: &HashMap<String, String>) -> MirrorSettings {
    let global_email = vars.get("MIRROR_EMAIL").filter(|v| !v.trim().is_empty());
    let global_password = vars.get("MIRROR_PASSWORD").filter(|v| !v.trim().is_empty());

    let mut intervals: Vec<u64> = Vec::new();
    if let Some(interval) = vars
        .get("MIRROR_SYNC_INTERVAL")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
    {
        intervals.push(interval);
    }

    let mut slot_numbers: Vec<u32> = vars
        .keys()
        .filter_map(|key| MIRROR_SLOT_URL.captures(key))
        .filter_map(|caps| caps[1].parse().ok())
        .collect();
    slot_numbers.sort_unstable();

    let mut slots: Vec<MirrorSlot> = Vec::new();
    for n in slot_numbers {
        let url = vars
            .get(&format!("MIRROR{}_URL", n))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        let Some(url) = url else {
            tracing::warn!(slot = n, "mirror slot without url; dropped");
            continue;
        };
        let email = vars
            .get(&format!("MIRROR{}_EMAIL", n))
            .filter(|v| !v.trim().is_empty())
            .or(global_email);
        let password = vars
            .get(&format!("MIRROR{}_PASSWORD", n))
            .filter(|v| !v.trim().is_empty())
            .or(global_password);
        let (Some(email), Some(password)) = (email, password) else {
            tracing::warn!(slot = n, url = %url, "mirror slot without credentials; dropped");
            continue;
        };
        if let Some(interval) = vars
            .get(&format!("MIRROR{}_SYNC_INTERVAL", n))
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            intervals.push(interval);
        }
        slots.push(MirrorSlot {
            url: normalize_url(url),
            email: email.clone(),
            password: password.clone(),
        });
    }

    // legacy list form with per-host credential overrides
    if let Some(list) = vars.get("MIRROR_URLS") {
        for raw in list.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            let url = normalize_url(raw);
            if slots.iter().any(|slot| slot.url == url) {
                continue;
            }
            let host_key = host_of(raw).map(credential_key);
            let email = host_key
                .as_ref()
                .and_then(|key| vars.get(&format!("{}_EMAIL", key)))
                .filter(|v| !v.trim().is_empty())
                .or(global_email);
            let password = host_key
                .as_ref()
                .and_then(|key| vars.get(&format!("{}_PASSWORD", key)))
                .filter(|v| !v.trim().is_empty())
                .or(global_password);
            let (Some(email), Some(password)) = (email, password) else {
                tracing::warn!(url = %url, "legacy mirror url without credentials; dropped");
                continue;
            };
            slots.push(MirrorSlot {
                url,
                email: email.clone(),
                password: password.clone(),
            });
        }
    }

    intervals.push(DEFAULT_MIRROR_INTERVAL_SECS);
    let sync_interval_secs = intervals
        .into_iter()
        .min()
        .unwrap_or(DEFAULT_MIRROR_INTERVAL_SECS)
        .max(MIN_MIRROR_INTERVAL_SECS);

    MirrorSettings {
        slots,
        sync_interval_secs,
    }
}

/// `http://Npm-2.local:81` → `NPM_2_LOCAL`
fn credential_key(host: String) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_numbered_slots_with_own_credentials() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR1_URL", "http://npm2:81/"),
            ("MIRROR1_EMAIL", "a@example.com"),
            ("MIRROR1_PASSWORD", "pw"),
        ]));
        assert_eq!(mirrors.slots.len(), 1);
        assert_eq!(mirrors.slots[0].url, "http://npm2:81");
        assert_eq!(mirrors.slots[0].email, "a@example.com");
    }

    #[test]
    fn test_global_credential_fallback() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR1_URL", "http://npm2:81"),
            ("MIRROR2_URL", "http://npm3:81"),
            ("MIRROR2_PASSWORD", "own-pw"),
            ("MIRROR_EMAIL", "global@example.com"),
            ("MIRROR_PASSWORD", "global-pw"),
        ]));
        assert_eq!(mirrors.slots.len(), 2);
        assert_eq!(mirrors.slots[0].password, "global-pw");
        assert_eq!(mirrors.slots[1].password, "own-pw");
        assert_eq!(mirrors.slots[1].email, "global@example.com");
    }

    #[test]
    fn test_slot_without_credentials_is_dropped() {
        let mirrors = parse_mirror_env(&vars(&[("MIRROR1_URL", "http://npm2:81")]));
        assert!(mirrors.slots.is_empty());
    }

    #[test]
    fn test_slots_keep_numeric_order() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR2_URL", "http://second:81"),
            ("MIRROR1_URL", "http://first:81"),
            ("MIRROR_EMAIL", "a@example.com"),
            ("MIRROR_PASSWORD", "pw"),
        ]));
        assert_eq!(mirrors.slots[0].url, "http://first:81");
        assert_eq!(mirrors.slots[1].url, "http://second:81");
    }

    #[test]
    fn test_legacy_urls_with_host_derived_credentials() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR_URLS", "http://npm2:81, http://backup.local:81"),
            ("NPM2_EMAIL", "npm2@example.com"),
            ("NPM2_PASSWORD", "npm2-pw"),
            ("MIRROR_EMAIL", "global@example.com"),
            ("MIRROR_PASSWORD", "global-pw"),
        ]));
        assert_eq!(mirrors.slots.len(), 2);
        assert_eq!(mirrors.slots[0].email, "npm2@example.com");
        assert_eq!(mirrors.slots[1].email, "global@example.com");
    }

    #[test]
    fn test_legacy_url_duplicate_of_slot_is_ignored() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR1_URL", "http://npm2:81"),
            ("MIRROR_URLS", "http://npm2:81"),
            ("MIRROR_EMAIL", "a@example.com"),
            ("MIRROR_PASSWORD", "pw"),
        ]));
        assert_eq!(mirrors.slots.len(), 1);
    }

    #[test]
    fn test_interval_is_minimum_of_configured_and_default() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR1_URL", "http://npm2:81"),
            ("MIRROR1_SYNC_INTERVAL", "120"),
            ("MIRROR_SYNC_INTERVAL", "600"),
            ("MIRROR_EMAIL", "a@example.com"),
            ("MIRROR_PASSWORD", "pw"),
        ]));
        assert_eq!(mirrors.sync_interval_secs, 120);
    }

    #[test]
    fn test_interval_defaults_to_five_minutes() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR1_URL", "http://npm2:81"),
            ("MIRROR_EMAIL", "a@example.com"),
            ("MIRROR_PASSWORD", "pw"),
        ]));
        assert_eq!(mirrors.sync_interval_secs, 300);
    }

    #[test]
    fn test_interval_is_clamped_to_one_minute() {
        let mirrors = parse_mirror_env(&vars(&[
            ("MIRROR1_URL", "http://npm2:81"),
            ("MIRROR1_SYNC_INTERVAL", "5"),
            ("MIRROR_EMAIL", "a@example.com"),
            ("MIRROR_PASSWORD", "pw"),
        ]));
        assert_eq!(mirrors.sync_interval_secs, 60);
    }

    #[test]
    fn test_credential_key_uppercases_and_substitutes() {
        assert_eq!(credential_key("npm-2.local".to_string()), "NPM_2_LOCAL");
    }

    #[test]
    fn test_validate_rejects_missing_npm_settings() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.npm.url = "http://npm:81".to_string();
        settings.npm.email = "admin@example.com".to_string();
        settings.npm.password = "secret".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_proxy_defaults_table() {
        let defaults: ProxyDefaults = ProxyDefaultSettings::default().into();
        assert!(defaults.block_exploits);
        assert!(!defaults.ssl_forced);
        assert!(!defaults.websocket_upgrade);
    }
}
