//! Resource metadata as the ownership ledger.
//!
//! `meta` is an arbitrary JSON object the proxy manager echoes back on
//! reads. Everything this controller creates is stamped with the fields
//! below; on every subsequent read they are the sole source of truth for
//! deciding whether a resource is ours, which container it belongs to and
//! at which label index.

use chrono::Utc;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed token identifying this controller kind in `meta.managed_by`.
pub const MANAGED_BY: &str = "docksync";

pub const META_MANAGED_BY: &str = "managed_by";
pub const META_SYNC_INSTANCE_ID: &str = "sync_instance_id";
pub const META_NPM_URL: &str = "npm_url";
pub const META_CONTAINER_ID: &str = "container_id";
pub const META_PROXY_INDEX: &str = "proxy_index";
pub const META_STREAM_INDEX: &str = "stream_index";
pub const META_CREATED_AT: &str = "created_at";
pub const META_MIRRORED_FROM: &str = "mirrored_from";
pub const META_MIRRORED_AT: &str = "mirrored_at";

/// The value types this core ever inspects are strings and numeric
/// strings. Ints and bools are carried so our own metadata round-trips;
/// `Other` absorbs whatever else foreign tools or the proxy manager put
/// there (nulls, floats, nested objects) so a single odd value cannot
/// fail an entire list call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    String(String),
    Other(serde_json::Value),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, accepting numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

pub type Meta = HashMap<String, MetaValue>;

/// The meta object stamped on every resource this controller creates.
/// `index_key` is `proxy_index` or `stream_index` depending on the kind.
pub fn ownership_meta(
    instance_id: &str,
    npm_url: &str,
    container_id: &str,
    index_key: &str,
    index: u8,
) -> Meta {
    let mut meta = Meta::new();
    meta.insert(META_MANAGED_BY.into(), MetaValue::from(MANAGED_BY));
    meta.insert(META_SYNC_INSTANCE_ID.into(), MetaValue::from(instance_id));
    meta.insert(META_NPM_URL.into(), MetaValue::from(npm_url));
    meta.insert(META_CONTAINER_ID.into(), MetaValue::from(container_id));
    meta.insert(index_key.into(), MetaValue::String(index.to_string()));
    meta.insert(
        META_CREATED_AT.into(),
        MetaValue::String(Utc::now().to_rfc3339()),
    );
    meta
}

/// A resource is ours for this instance iff `managed_by` carries our token
/// and `sync_instance_id` is absent (resources written before instance ids
/// existed) or equal to the local id.
pub fn is_ours_for_instance(meta: Option<&Meta>, instance_id: &str) -> bool {
    let Some(meta) = meta else {
        return false;
    };
    if meta.get(META_MANAGED_BY).and_then(MetaValue::as_str) != Some(MANAGED_BY) {
        return false;
    }
    match meta.get(META_SYNC_INSTANCE_ID) {
        None => true,
        Some(value) => value.as_str() == Some(instance_id),
    }
}

pub fn container_id(meta: Option<&Meta>) -> Option<&str> {
    meta?.get(META_CONTAINER_ID)?.as_str()
}

pub fn sync_instance_id(meta: Option<&Meta>) -> Option<&str> {
    meta?.get(META_SYNC_INSTANCE_ID)?.as_str()
}

pub fn npm_url(meta: Option<&Meta>) -> Option<&str> {
    meta?.get(META_NPM_URL)?.as_str()
}

pub fn proxy_index(meta: Option<&Meta>) -> Option<u8> {
    index(meta, META_PROXY_INDEX)
}

pub fn stream_index(meta: Option<&Meta>) -> Option<u8> {
    index(meta, META_STREAM_INDEX)
}

fn index(meta: Option<&Meta>, key: &str) -> Option<u8> {
    let value = meta?.get(key)?.as_i64()?;
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ours() -> Meta {
        ownership_meta("inst-a", "http://npm:81", "abc123", META_PROXY_INDEX, 2)
    }

    #[test]
    fn test_ownership_meta_fields() {
        let meta = ours();
        assert_eq!(
            meta.get(META_MANAGED_BY).and_then(MetaValue::as_str),
            Some(MANAGED_BY)
        );
        assert_eq!(container_id(Some(&meta)), Some("abc123"));
        assert_eq!(proxy_index(Some(&meta)), Some(2));
        assert_eq!(stream_index(Some(&meta)), None);
        assert!(meta.contains_key(META_CREATED_AT));
    }

    #[test]
    fn test_is_ours_matches_instance() {
        let meta = ours();
        assert!(is_ours_for_instance(Some(&meta), "inst-a"));
        assert!(!is_ours_for_instance(Some(&meta), "inst-b"));
    }

    #[test]
    fn test_absent_instance_id_is_backward_compatible() {
        let mut meta = ours();
        meta.remove(META_SYNC_INSTANCE_ID);
        assert!(is_ours_for_instance(Some(&meta), "anyone"));
    }

    #[test]
    fn test_foreign_and_missing_meta_are_not_ours() {
        assert!(!is_ours_for_instance(None, "inst-a"));
        let mut meta = ours();
        meta.insert(META_MANAGED_BY.into(), MetaValue::from("other-tool"));
        assert!(!is_ours_for_instance(Some(&meta), "inst-a"));
    }

    #[test]
    fn test_index_accepts_numeric_string_and_int() {
        let mut meta = ours();
        meta.insert(META_PROXY_INDEX.into(), MetaValue::Int(7));
        assert_eq!(proxy_index(Some(&meta)), Some(7));
        meta.insert(META_PROXY_INDEX.into(), MetaValue::from("9"));
        assert_eq!(proxy_index(Some(&meta)), Some(9));
    }

    #[test]
    fn test_meta_value_round_trips_untyped_json() {
        let raw = r#"{"managed_by":"docksync","proxy_index":"0","legacy_flag":true,"count":4}"#;
        let meta: Meta = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.get("count").and_then(MetaValue::as_i64), Some(4));
        assert_eq!(meta.get("legacy_flag"), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn test_meta_tolerates_nulls_and_nested_values() {
        let raw = r#"{"nginx_online":true,"nginx_err":null,"dns_challenge":{"provider":"x"}}"#;
        let meta: Meta = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.get("nginx_err"), Some(&MetaValue::Other(serde_json::Value::Null)));
        assert!(meta.get("dns_challenge").and_then(MetaValue::as_str).is_none());
        assert!(!is_ours_for_instance(Some(&meta), "inst-a"));
    }
}
