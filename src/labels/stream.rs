use std::collections::HashMap;

use super::{group_indexed, parse_bool};

/// One desired TCP/UDP stream, parsed from the labels of a single
/// container index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub index: u8,
    pub incoming_port: u16,
    pub forward_host: Option<String>,
    pub forward_port: Option<u16>,
    pub tcp_forwarding: bool,
    pub udp_forwarding: bool,
    /// Raw `ssl` label: a numeric certificate id or a domain to resolve.
    pub ssl: Option<String>,
}

/// Parse every `stream` index present in the labels. Invariant per index:
/// `incoming.port` in 1..=65535 and at least one of tcp/udp forwarding.
pub fn parse_stream_configs(labels: &HashMap<String, String>) -> Vec<StreamConfig> {
    let mut configs = Vec::new();

    for (index, fields) in group_indexed(labels, "stream") {
        let incoming_port = match fields.get("incoming.port") {
            None => {
                tracing::warn!(index, "stream labels without incoming.port; index skipped");
                continue;
            }
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    tracing::warn!(index, port = %raw, "malformed stream incoming.port; index skipped");
                    continue;
                }
            },
        };

        let forward_port = match fields.get("forward.port") {
            None => None,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => Some(port),
                _ => {
                    tracing::warn!(index, port = %raw, "malformed stream forward.port; index skipped");
                    continue;
                }
            },
        };

        let tcp_forwarding = fields
            .get("forward.tcp")
            .map(|v| parse_bool(v))
            .unwrap_or(true);
        let udp_forwarding = fields
            .get("forward.udp")
            .map(|v| parse_bool(v))
            .unwrap_or(false);
        if !tcp_forwarding && !udp_forwarding {
            tracing::warn!(index, "stream with neither tcp nor udp forwarding; index skipped");
            continue;
        }

        configs.push(StreamConfig {
            index,
            incoming_port,
            forward_host: fields
                .get("forward.host")
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            forward_port,
            tcp_forwarding,
            udp_forwarding,
            ssl: fields
                .get("ssl")
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
        });
    }

    configs
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
    fn test_minimal_stream() {
        let configs = parse_stream_configs(&labels(&[("docksync.stream.incoming.port", "2222")]));
        assert_eq!(configs.len(), 1);
        let cfg = &configs[0];
        assert_eq!(cfg.incoming_port, 2222);
        assert!(cfg.tcp_forwarding, "tcp defaults to true");
        assert!(!cfg.udp_forwarding);
        assert_eq!(cfg.forward_host, None);
        assert_eq!(cfg.forward_port, None);
    }

    #[test]
    fn test_full_stream() {
        let configs = parse_stream_configs(&labels(&[
            ("docksync.stream.incoming.port", "5353"),
            ("docksync.stream.forward.host", "dns"),
            ("docksync.stream.forward.port", "53"),
            ("docksync.stream.forward.tcp", "false"),
            ("docksync.stream.forward.udp", "true"),
            ("docksync.stream.ssl", "npm.test"),
        ]));
        let cfg = &configs[0];
        assert_eq!(cfg.forward_host.as_deref(), Some("dns"));
        assert_eq!(cfg.forward_port, Some(53));
        assert!(!cfg.tcp_forwarding);
        assert!(cfg.udp_forwarding);
        assert_eq!(cfg.ssl.as_deref(), Some("npm.test"));
    }

    #[test]
    fn test_missing_incoming_port_skips_index() {
        let configs = parse_stream_configs(&labels(&[("docksync.stream.forward.port", "53")]));
        assert!(configs.is_empty());
    }

    #[test]
    fn test_neither_tcp_nor_udp_skips_index() {
        let configs = parse_stream_configs(&labels(&[
            ("docksync.stream.incoming.port", "2222"),
            ("docksync.stream.forward.tcp", "false"),
        ]));
        assert!(configs.is_empty());
    }

    #[test]
    fn test_malformed_incoming_port_skips_only_that_index() {
        let configs = parse_stream_configs(&labels(&[
            ("docksync.stream.0.incoming.port", "nope"),
            ("docksync.stream.1.incoming.port", "2223"),
        ]));
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].index, 1);
        assert_eq!(configs[0].incoming_port, 2223);
    }
}
