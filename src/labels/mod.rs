//! Label grammar
//!
//! Containers opt in through labels under the reserved `docksync.` prefix
//! (`docksync-` is accepted as a synonym). Two groups exist: `proxy.*` for
//! HTTP proxy hosts and `stream.*` for TCP/UDP streams. A numeric segment
//! after the group selects an index in 0..=99 (`docksync.proxy.7.domains`);
//! without it the index is 0. Where both the bare and the `.0.` form name
//! the same key, the explicit form wins.

mod proxy;
mod stream;

pub use proxy::{parse_proxy_configs, ForwardScheme, ProxyConfig, ProxyDefaults};
pub use stream::{parse_stream_configs, StreamConfig};

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

use crate::helpers::sha256_hex;

pub const LABEL_PREFIX_DOT: &str = "docksync.";
pub const LABEL_PREFIX_DASH: &str = "docksync-";

pub const MAX_INDEX: u8 = 99;

lazy_static! {
    static ref INDEXED_KEY: Regex =
        Regex::new(r"^(proxy|stream)(?:\.([0-9]+))?\.(.+)$").expect("indexed key pattern");
}

/// Strip the reserved prefix from a label key, if present.
pub fn strip_prefix(key: &str) -> Option<&str> {
    key.strip_prefix(LABEL_PREFIX_DOT)
        .or_else(|| key.strip_prefix(LABEL_PREFIX_DASH))
}

/// Whether any label key carries the reserved prefix.
pub fn has_reserved_labels(labels: &HashMap<String, String>) -> bool {
    labels.keys().any(|k| strip_prefix(k).is_some())
}

/// Change-detection hash over the reserved label subset: `k=v` lines,
/// keys sorted, joined with newlines. An optimisation, not a contract;
/// clearing it merely forces a full reconcile.
pub fn label_hash(labels: &HashMap<String, String>) -> String {
    let mut lines: Vec<String> = labels
        .iter()
        .filter(|(k, _)| strip_prefix(k).is_some())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    lines.sort();
    sha256_hex(&lines.join("\n"))
}

/// Truthy label values. Everything else reads as false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Group the reserved labels of one container by index for `group`
/// (`proxy` or `stream`), mapping the remaining dot-path to its value.
/// Explicitly indexed entries shadow the bare index-0 form.
pub(crate) fn group_indexed<'a>(
    labels: &'a HashMap<String, String>,
    group: &str,
) -> BTreeMap<u8, HashMap<&'a str, &'a str>> {
    let mut explicit: BTreeMap<u8, HashMap<&str, &str>> = BTreeMap::new();
    let mut implicit: HashMap<&str, &str> = HashMap::new();

    for (key, value) in labels {
        let Some(rest) = strip_prefix(key) else {
            continue;
        };
        let Some(caps) = INDEXED_KEY.captures(rest) else {
            continue;
        };
        if &caps[1] != group {
            continue;
        }
        let field = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        match caps.get(2) {
            Some(idx) => match idx.as_str().parse::<u8>() {
                Ok(idx) if idx <= MAX_INDEX => {
                    explicit.entry(idx).or_default().insert(field, value);
                }
                _ => {
                    tracing::warn!(label = %key, "label index out of range (0..=99); ignored");
                }
            },
            None => {
                implicit.insert(field, value);
            }
        }
    }

    if !implicit.is_empty() {
        let slot = explicit.entry(0).or_default();
        for (field, value) in implicit {
            slot.entry(field).or_insert(value);
        }
    }

    explicit
}
