use serde::{Deserialize, Serialize};

use super::meta::Meta;
use super::serde_ext::{bool_int, default_true};

/// A layer-4 stream as read back from `/api/nginx/streams`.
#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    pub id: i64,
    pub incoming_port: u16,
    #[serde(default)]
    pub forwarding_host: String,
    #[serde(default)]
    pub forwarding_port: u16,
    #[serde(default, with = "bool_int")]
    pub tcp_forwarding: bool,
    #[serde(default, with = "bool_int")]
    pub udp_forwarding: bool,
    #[serde(default)]
    pub certificate_id: Option<i64>,
    #[serde(default = "default_true", with = "bool_int")]
    pub enabled: bool,
    #[serde(default)]
    pub meta: Option<Meta>,
}

/// Create payload for a stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamPayload {
    pub incoming_port: u16,
    pub forwarding_host: String,
    pub forwarding_port: u16,
    #[serde(with = "bool_int")]
    pub tcp_forwarding: bool,
    #[serde(with = "bool_int")]
    pub udp_forwarding: bool,
    pub certificate_id: i64,
    #[serde(with = "bool_int")]
    pub enabled: bool,
    pub meta: Meta,
}
