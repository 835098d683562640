use serde::{Deserialize, Serialize};

use super::meta::Meta;
use super::serde_ext::{bool_int, default_true};

/// A proxy host as read back from `/api/nginx/proxy-hosts`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyHost {
    pub id: i64,
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub forward_scheme: String,
    #[serde(default)]
    pub forward_host: String,
    #[serde(default)]
    pub forward_port: u16,
    #[serde(default, with = "bool_int")]
    pub ssl_forced: bool,
    #[serde(default, with = "bool_int")]
    pub caching_enabled: bool,
    #[serde(default, with = "bool_int")]
    pub block_exploits: bool,
    #[serde(default, with = "bool_int")]
    pub allow_websocket_upgrade: bool,
    #[serde(default, with = "bool_int")]
    pub http2_support: bool,
    #[serde(default, with = "bool_int")]
    pub hsts_enabled: bool,
    #[serde(default, with = "bool_int")]
    pub hsts_subdomains: bool,
    #[serde(default)]
    pub certificate_id: Option<i64>,
    #[serde(default)]
    pub access_list_id: Option<i64>,
    #[serde(default)]
    pub advanced_config: Option<String>,
    #[serde(default = "default_true", with = "bool_int")]
    pub enabled: bool,
    #[serde(default)]
    pub meta: Option<Meta>,
}

impl ProxyHost {
    /// Case-insensitive overlap with a requested domain list.
    pub fn overlaps_domains(&self, domains: &[String]) -> bool {
        self.domain_names.iter().any(|have| {
            domains
                .iter()
                .any(|want| have.eq_ignore_ascii_case(want))
        })
    }
}

/// Create payload for a proxy host. The proxy manager assigns the id;
/// flags transit as 0/1.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyHostPayload {
    pub domain_names: Vec<String>,
    pub forward_scheme: String,
    pub forward_host: String,
    pub forward_port: u16,
    #[serde(with = "bool_int")]
    pub ssl_forced: bool,
    #[serde(with = "bool_int")]
    pub caching_enabled: bool,
    #[serde(with = "bool_int")]
    pub block_exploits: bool,
    #[serde(with = "bool_int")]
    pub allow_websocket_upgrade: bool,
    #[serde(with = "bool_int")]
    pub http2_support: bool,
    #[serde(with = "bool_int")]
    pub hsts_enabled: bool,
    #[serde(with = "bool_int")]
    pub hsts_subdomains: bool,
    pub certificate_id: i64,
    pub access_list_id: i64,
    pub advanced_config: String,
    #[serde(with = "bool_int")]
    pub enabled: bool,
    pub meta: Meta,
}
