//! Per-resource-kind sync between the primary proxy manager and one
//! secondary.
//!
//! Resources are compared by a hash over their canonical JSON: volatile
//! server-side bookkeeping stripped, flags normalised to 0/1, object keys
//! in sorted order. Certificate and access-list ids differ between
//! instances, so the primary side is hashed *after* remapping through the
//! id maps built earlier in the pass; once a secondary is in sync the two
//! hashes are equal and the pass performs zero writes.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::connectors::npm::ProxyManager;
use crate::helpers::sha256_hex;
use crate::models::meta::{META_MIRRORED_AT, META_MIRRORED_FROM};
use crate::models::ResourceKind;

/// Server-assigned or instance-local fields that never participate in
/// equality, at any nesting level.
const VOLATILE_KEYS: &[&str] = &[
    "id",
    "created_on",
    "modified_on",
    "owner",
    "owner_user_id",
    "meta",
    "certificate",
    "access_list",
    "nginx_online",
    "nginx_err",
    "is_deleted",
    "expires_on",
];

/// Foreign keys that only make sense within one instance when nested
/// (access-list clients/items point back at their parent).
const NESTED_VOLATILE_KEYS: &[&str] = &["access_list_id", "user_id"];

#[derive(Debug, Clone)]
pub struct KindReport {
    pub kind: ResourceKind,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl KindReport {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            synced: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub kinds: Vec<KindReport>,
}

impl SyncReport {
    pub fn totals(&self) -> (usize, usize, usize) {
        self.kinds.iter().fold((0, 0, 0), |(s, k, f), report| {
            (s + report.synced, k + report.skipped, f + report.failed)
        })
    }
}

/// Sync every resource kind from `primary` to `secondary`, dependencies
/// first so certificate and access-list ids can be remapped on the hosts
/// that reference them. Failures are contained: a resource failure does
/// not abort its kind, a kind failure does not abort the pass.
pub async fn sync_instance(primary: &dyn ProxyManager, secondary: &dyn ProxyManager) -> SyncReport {
    let mut cert_map: HashMap<i64, i64> = HashMap::new();
    let mut acl_map: HashMap<i64, i64> = HashMap::new();
    let mut report = SyncReport::default();

    for kind in ResourceKind::mirror_order() {
        match sync_kind(primary, secondary, kind, &mut cert_map, &mut acl_map).await {
            Ok(kind_report) => {
                tracing::debug!(
                    kind = %kind,
                    synced = kind_report.synced,
                    skipped = kind_report.skipped,
                    failed = kind_report.failed,
                    "mirror kind finished"
                );
                report.kinds.push(kind_report);
            }
            Err(err) => {
                tracing::error!(kind = %kind, error = %err, "mirror kind failed");
                let mut kind_report = KindReport::new(kind);
                kind_report.failed = 1;
                report.kinds.push(kind_report);
            }
        }
    }

    report
}

async fn sync_kind(
    primary: &dyn ProxyManager,
    secondary: &dyn ProxyManager,
    kind: ResourceKind,
    cert_map: &mut HashMap<i64, i64>,
    acl_map: &mut HashMap<i64, i64>,
) -> Result<KindReport, crate::connectors::errors::ConnectorError> {
    let primaries = primary.list_resources(kind).await?;
    let secondaries = secondary.list_resources(kind).await?;
    let mut report = KindReport::new(kind);

    for resource in &primaries {
        if is_deleted(resource) {
            continue;
        }
        let Some(primary_id) = id_of(resource) else {
            tracing::warn!(kind = %kind, "primary resource without id; skipped");
            report.failed += 1;
            continue;
        };

        let desired = mirror_payload(kind, resource, cert_map, acl_map);
        let desired_hash = hash_value(&desired);
        let candidate = find_candidate(kind, resource, &secondaries);

        match candidate {
            Some(existing) => {
                let Some(existing_id) = id_of(existing) else {
                    report.failed += 1;
                    continue;
                };
                let existing_hash = hash_value(&canonical(existing));

                if existing_hash == desired_hash {
                    record_mapping(kind, primary_id, existing_id, cert_map, acl_map);
                    report.skipped += 1;
                    continue;
                }

                if kind == ResourceKind::Certificate {
                    // in-place certificate updates are known to break the
                    // secondary's nginx config; leave it and map the id
                    record_mapping(kind, primary_id, existing_id, cert_map, acl_map);
                    report.skipped += 1;
                    tracing::debug!(
                        kind = %kind,
                        id = primary_id,
                        "certificate diverged on secondary; updates are not performed"
                    );
                    continue;
                }

                let payload = with_mirror_meta(desired.clone(), primary.base_url());
                match secondary.update_resource(kind, existing_id, &payload).await {
                    Ok(_) => {
                        record_mapping(kind, primary_id, existing_id, cert_map, acl_map);
                        report.synced += 1;
                    }
                    Err(err) => {
                        tracing::error!(
                            kind = %kind,
                            id = existing_id,
                            error = %err,
                            "failed to update mirrored resource"
                        );
                        report.failed += 1;
                    }
                }
            }
            None => {
                if kind == ResourceKind::Certificate {
                    tracing::info!(
                        id = primary_id,
                        "certificate absent on secondary; creation requires a file upload, \
                         dependents fall back to no ssl"
                    );
                    report.skipped += 1;
                    continue;
                }

                let payload = with_mirror_meta(desired.clone(), primary.base_url());
                match secondary.create_resource(kind, &payload).await {
                    Ok(created) => {
                        if let Some(new_id) = id_of(&created) {
                            record_mapping(kind, primary_id, new_id, cert_map, acl_map);
                        }
                        report.synced += 1;
                    }
                    Err(err) => {
                        tracing::error!(
                            kind = %kind,
                            id = primary_id,
                            error = %err,
                            "failed to create mirrored resource"
                        );
                        report.failed += 1;
                    }
                }
            }
        }
    }

    Ok(report)
}

fn record_mapping(
    kind: ResourceKind,
    primary_id: i64,
    secondary_id: i64,
    cert_map: &mut HashMap<i64, i64>,
    acl_map: &mut HashMap<i64, i64>,
) {
    match kind {
        ResourceKind::Certificate => {
            cert_map.insert(primary_id, secondary_id);
        }
        ResourceKind::AccessList => {
            acl_map.insert(primary_id, secondary_id);
        }
        _ => {}
    }
}

/// Payload derived from a primary resource: canonicalised, with
/// `certificate_id` / `access_list_id` substituted through the id maps.
/// A reference with no mapping falls back to 0 (no ssl / no access list).
fn mirror_payload(
    kind: ResourceKind,
    resource: &Value,
    cert_map: &HashMap<i64, i64>,
    acl_map: &HashMap<i64, i64>,
) -> Value {
    let mut desired = canonical(resource);
    if kind != ResourceKind::Certificate {
        remap_reference(&mut desired, "certificate_id", cert_map);
    }
    if kind == ResourceKind::ProxyHost {
        remap_reference(&mut desired, "access_list_id", acl_map);
    }
    desired
}

fn remap_reference(value: &mut Value, field: &str, map: &HashMap<i64, i64>) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    let Some(reference) = object.get(field).and_then(Value::as_i64) else {
        return;
    };
    if reference == 0 {
        return;
    }
    let mapped = map.get(&reference).copied().unwrap_or(0);
    object.insert(field.to_string(), Value::from(mapped));
}

fn with_mirror_meta(mut payload: Value, primary_url: &str) -> Value {
    if let Some(object) = payload.as_object_mut() {
        let mut meta = Map::new();
        meta.insert(META_MIRRORED_FROM.to_string(), Value::from(primary_url));
        meta.insert(
            META_MIRRORED_AT.to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );
        object.insert("meta".to_string(), Value::Object(meta));
    }
    payload
}

/// Canonical form for hashing: volatile keys stripped at every level,
/// booleans normalised to 0/1. serde_json keeps object keys sorted, so
/// serialisation is already order-stable.
fn canonical(resource: &Value) -> Value {
    let mut value = resource.clone();
    strip_volatile(&mut value, 0);
    normalize_bools(&mut value);
    value
}

fn hash_value(value: &Value) -> String {
    sha256_hex(&value.to_string())
}

fn strip_volatile(value: &mut Value, depth: usize) {
    match value {
        Value::Object(object) => {
            object.retain(|key, _| {
                !VOLATILE_KEYS.contains(&key.as_str())
                    && (depth == 0 || !NESTED_VOLATILE_KEYS.contains(&key.as_str()))
            });
            for nested in object.values_mut() {
                strip_volatile(nested, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_volatile(item, depth + 1);
            }
        }
        _ => {}
    }
}

fn normalize_bools(value: &mut Value) {
    match value {
        Value::Bool(b) => *value = Value::from(u8::from(*b)),
        Value::Object(object) => {
            for nested in object.values_mut() {
                normalize_bools(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_bools(item);
            }
        }
        _ => {}
    }
}

fn is_deleted(resource: &Value) -> bool {
    match resource.get("is_deleted") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

fn id_of(resource: &Value) -> Option<i64> {
    resource.get("id").and_then(Value::as_i64)
}

fn domain_names(resource: &Value) -> Vec<String> {
    resource
        .get("domain_names")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(|name| name.to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

/// Secondary candidate by the natural key of the kind: certificates by
/// nice name or equal domain set, access lists by name, hosts by primary
/// domain presence, streams by incoming port.
fn find_candidate<'a>(
    kind: ResourceKind,
    resource: &Value,
    secondaries: &'a [Value],
) -> Option<&'a Value> {
    match kind {
        ResourceKind::Certificate => {
            let nice_name = resource.get("nice_name").and_then(Value::as_str);
            let mut domains = domain_names(resource);
            domains.sort();
            secondaries.iter().find(|candidate| {
                if let (Some(want), Some(have)) =
                    (nice_name, candidate.get("nice_name").and_then(Value::as_str))
                {
                    if !want.is_empty() && want == have {
                        return true;
                    }
                }
                let mut candidate_domains = domain_names(candidate);
                candidate_domains.sort();
                !domains.is_empty() && candidate_domains == domains
            })
        }
        ResourceKind::AccessList => {
            let name = resource.get("name").and_then(Value::as_str)?;
            secondaries
                .iter()
                .find(|candidate| candidate.get("name").and_then(Value::as_str) == Some(name))
        }
        ResourceKind::ProxyHost | ResourceKind::RedirectionHost | ResourceKind::DeadHost => {
            let domains = domain_names(resource);
            let primary_domain = domains.first()?;
            secondaries
                .iter()
                .find(|candidate| domain_names(candidate).contains(primary_domain))
        }
        ResourceKind::Stream => {
            let port = resource.get("incoming_port").and_then(Value::as_i64)?;
            secondaries.iter().find(|candidate| {
                candidate.get("incoming_port").and_then(Value::as_i64) == Some(port)
            })
        }
    }
}
