/// Canonical form for proxy-manager URLs so that equality checks on
/// `meta.npm_url` survive cosmetic differences in how operators write them.
///
/// Scheme and host are lowercased, the default port for the scheme is
/// elided, and trailing slashes are trimmed. A missing scheme is read as
/// `http`.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();

    let (scheme, rest) = match raw.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("http".to_string(), raw),
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let (host, port) = split_host_port(authority);
    let host = host.to_ascii_lowercase();

    let default_port = match scheme.as_str() {
        "https" => "443",
        _ => "80",
    };

    let mut out = format!("{}://{}", scheme, host);
    if let Some(port) = port {
        if port != default_port {
            out.push(':');
            out.push_str(port);
        }
    }

    let path = path.trim_end_matches('/');
    if !path.is_empty() {
        out.push_str(path);
    }

    out
}

/// Host part of a URL, lowercased. Used to derive legacy per-mirror
/// credential variable names.
pub fn host_of(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let rest = match raw.split_once("://") {
        Some((_, rest)) => rest,
        None => raw,
    };
    let authority = rest.split('/').next().unwrap_or("");
    let (host, _) = split_host_port(authority);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            (host, Some(port))
        }
        _ => (authority, None),
    }
}
