use std::collections::HashMap;

use super::{group_indexed, parse_bool};

/// Upstream scheme for a proxy host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardScheme {
    #[default]
    Http,
    Https,
}

impl ForwardScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Process-wide default values for the proxy flag labels, overridable
/// through the `*_DEFAULT` configuration switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDefaults {
    pub ssl_forced: bool,
    pub caching_enabled: bool,
    pub block_exploits: bool,
    pub websocket_upgrade: bool,
    pub http2: bool,
    pub hsts: bool,
    pub hsts_subdomains: bool,
}

impl Default for ProxyDefaults {
    fn default() -> Self {
        Self {
            ssl_forced: false,
            caching_enabled: false,
            block_exploits: true,
            websocket_upgrade: false,
            http2: false,
            hsts: false,
            hsts_subdomains: false,
        }
    }
}

/// One desired proxy host, parsed from the labels of a single container
/// index. Ephemeral: constructed and consumed within one reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub index: u8,
    pub domains: Vec<String>,
    pub forward_scheme: ForwardScheme,
    pub forward_host: Option<String>,
    pub forward_port: Option<u16>,
    pub ssl_forced: bool,
    pub caching_enabled: bool,
    pub block_exploits: bool,
    pub websocket_upgrade: bool,
    pub http2: bool,
    pub hsts: bool,
    pub hsts_subdomains: bool,
    pub certificate_id: Option<i64>,
    pub access_list_id: Option<i64>,
    pub advanced_config: String,
}

/// Parse every `proxy` index present in the labels. A malformed index is
/// skipped with a warning and never aborts the remaining indices.
pub fn parse_proxy_configs(
    labels: &HashMap<String, String>,
    defaults: &ProxyDefaults,
) -> Vec<ProxyConfig> {
    let mut configs = Vec::new();

    for (index, fields) in group_indexed(labels, "proxy") {
        match parse_one(index, &fields, defaults) {
            Some(config) => configs.push(config),
            None => continue,
        }
    }

    configs
}

fn parse_one(
    index: u8,
    fields: &HashMap<&str, &str>,
    defaults: &ProxyDefaults,
) -> Option<ProxyConfig> {
    // `domains` wins over the singular `domain` when both are present
    let raw_domains = fields.get("domains").or_else(|| fields.get("domain"));
    let domains: Vec<String> = raw_domains
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if domains.is_empty() {
        tracing::warn!(index, "proxy labels without any domain; index skipped");
        return None;
    }

    let forward_port = match fields.get("port") {
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(port) if port > 0 => Some(port),
            _ => {
                tracing::warn!(index, port = %raw, "malformed proxy port label; index skipped");
                return None;
            }
        },
        None => None,
    };

    let forward_host = fields
        .get("host")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let forward_scheme = match fields.get("scheme").map(|v| v.trim().to_ascii_lowercase()) {
        None => ForwardScheme::Http,
        Some(s) if s == "http" => ForwardScheme::Http,
        Some(s) if s == "https" => ForwardScheme::Https,
        Some(other) => {
            tracing::warn!(index, scheme = %other, "unknown forward scheme; using http");
            ForwardScheme::Http
        }
    };

    let certificate_id = match parse_optional_id(fields.get("ssl.certificate.id"), index, "ssl.certificate.id") {
        Ok(id) => id,
        Err(()) => return None,
    };
    let access_list_id = match parse_optional_id(fields.get("accesslist.id"), index, "accesslist.id") {
        Ok(id) => id,
        Err(()) => return None,
    };

    let flag = |key: &str, default: bool| -> bool {
        fields.get(key).map(|v| parse_bool(v)).unwrap_or(default)
    };

    Some(ProxyConfig {
        index,
        domains,
        forward_scheme,
        forward_host,
        forward_port,
        ssl_forced: flag("ssl.force", defaults.ssl_forced),
        caching_enabled: flag("caching", defaults.caching_enabled),
        block_exploits: flag("block_common_exploits", defaults.block_exploits),
        websocket_upgrade: flag("websockets", defaults.websocket_upgrade),
        http2: flag("ssl.http2", defaults.http2),
        hsts: flag("ssl.hsts", defaults.hsts),
        hsts_subdomains: flag("ssl.hsts.subdomains", defaults.hsts_subdomains),
        certificate_id,
        access_list_id,
        advanced_config: fields
            .get("advanced.config")
            .map(|v| v.to_string())
            .unwrap_or_default(),
    })
}

fn parse_optional_id(
    raw: Option<&&str>,
    index: u8,
    label: &str,
) -> Result<Option<i64>, ()> {
    match raw {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                tracing::warn!(index, label, value = %raw, "malformed numeric label; index skipped");
                Err(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_minimal_proxy_labels() {
        let configs = parse_proxy_configs(
            &labels(&[("docksync.proxy.domains", "e.test"), ("docksync.proxy.port", "5678")]),
            &ProxyDefaults::default(),
        );
        assert_eq!(configs.len(), 1);
        let cfg = &configs[0];
        assert_eq!(cfg.index, 0);
        assert_eq!(cfg.domains, vec!["e.test"]);
        assert_eq!(cfg.forward_port, Some(5678));
        assert_eq!(cfg.forward_host, None);
        assert_eq!(cfg.forward_scheme, ForwardScheme::Http);
        assert!(cfg.block_exploits, "block_exploits defaults to true");
        assert!(!cfg.ssl_forced);
    }

    #[test]
    fn test_singular_domain_alias() {
        let configs = parse_proxy_configs(
            &labels(&[("docksync.proxy.domain", "x.test")]),
            &ProxyDefaults::default(),
        );
        assert_eq!(configs[0].domains, vec!["x.test"]);
        assert_eq!(configs[0].forward_port, None);
    }

    #[test]
    fn test_domain_list_is_trimmed_and_ordered() {
        let configs = parse_proxy_configs(
            &labels(&[("docksync.proxy.domains", " a.test , b.test ,, c.test ")]),
            &ProxyDefaults::default(),
        );
        assert_eq!(configs[0].domains, vec!["a.test", "b.test", "c.test"]);
    }

    #[test]
    fn test_multi_index() {
        let configs = parse_proxy_configs(
            &labels(&[
                ("docksync.proxy.0.domains", "a"),
                ("docksync.proxy.0.port", "80"),
                ("docksync.proxy.1.domains", "b"),
                ("docksync.proxy.1.port", "90"),
            ]),
            &ProxyDefaults::default(),
        );
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].index, 0);
        assert_eq!(configs[1].index, 1);
        assert_eq!(configs[1].forward_port, Some(90));
    }

    #[test]
    fn test_malformed_port_skips_only_that_index() {
        let configs = parse_proxy_configs(
            &labels(&[
                ("docksync.proxy.0.domains", "a"),
                ("docksync.proxy.0.port", "eighty"),
                ("docksync.proxy.1.domains", "b"),
                ("docksync.proxy.1.port", "90"),
            ]),
            &ProxyDefaults::default(),
        );
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].index, 1);
    }

    #[test]
    fn test_missing_domains_skips_index() {
        let configs = parse_proxy_configs(
            &labels(&[("docksync.proxy.port", "80")]),
            &ProxyDefaults::default(),
        );
        assert!(configs.is_empty());
    }

    #[test]
    fn test_flags_and_ids() {
        let configs = parse_proxy_configs(
            &labels(&[
                ("docksync.proxy.domains", "a.test"),
                ("docksync.proxy.scheme", "https"),
                ("docksync.proxy.ssl.force", "yes"),
                ("docksync.proxy.ssl.http2", "1"),
                ("docksync.proxy.ssl.hsts", "on"),
                ("docksync.proxy.ssl.hsts.subdomains", "true"),
                ("docksync.proxy.caching", "TRUE"),
                ("docksync.proxy.websockets", "true"),
                ("docksync.proxy.block_common_exploits", "false"),
                ("docksync.proxy.ssl.certificate.id", "12"),
                ("docksync.proxy.accesslist.id", "3"),
                ("docksync.proxy.advanced.config", "client_max_body_size 0;"),
            ]),
            &ProxyDefaults::default(),
        );
        let cfg = &configs[0];
        assert_eq!(cfg.forward_scheme, ForwardScheme::Https);
        assert!(cfg.ssl_forced && cfg.http2 && cfg.hsts && cfg.hsts_subdomains);
        assert!(cfg.caching_enabled && cfg.websocket_upgrade);
        assert!(!cfg.block_exploits);
        assert_eq!(cfg.certificate_id, Some(12));
        assert_eq!(cfg.access_list_id, Some(3));
        assert_eq!(cfg.advanced_config, "client_max_body_size 0;");
    }

    #[test]
    fn test_process_defaults_apply_when_label_absent() {
        let defaults = ProxyDefaults {
            websocket_upgrade: true,
            ..ProxyDefaults::default()
        };
        let configs =
            parse_proxy_configs(&labels(&[("docksync.proxy.domains", "a.test")]), &defaults);
        assert!(configs[0].websocket_upgrade);
    }

    #[test]
    fn test_dash_prefix_parses_identically() {
        let dot = parse_proxy_configs(
            &labels(&[("docksync.proxy.domains", "a.test")]),
            &ProxyDefaults::default(),
        );
        let dash = parse_proxy_configs(
            &labels(&[("docksync-proxy.domains", "a.test")]),
            &ProxyDefaults::default(),
        );
        assert_eq!(dot, dash);
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let map = labels(&[
            ("docksync.proxy.0.domains", "a"),
            ("docksync.proxy.1.domains", "b"),
            ("docksync.proxy.1.port", "90"),
        ]);
        let first = parse_proxy_configs(&map, &ProxyDefaults::default());
        let second = parse_proxy_configs(&map, &ProxyDefaults::default());
        assert_eq!(first, second);
    }
}
