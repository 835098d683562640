use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::connectors::errors::ConnectorError;
use crate::connectors::npm::ProxyManager;
use crate::models::Certificate;

/// Certificate listings change rarely; five minutes keeps reconcile
/// bursts from hammering the endpoint.
const CERTIFICATE_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedCertificates {
    fetched_at: Instant,
    certificates: Vec<Certificate>,
}

/// Selects a certificate id for a requested domain list, against a
/// briefly cached copy of the proxy manager's certificate list.
pub struct CertificateMatcher {
    npm: Arc<dyn ProxyManager>,
    cache: Mutex<Option<CachedCertificates>>,
}

impl CertificateMatcher {
    pub fn new(npm: Arc<dyn ProxyManager>) -> Self {
        Self {
            npm,
            cache: Mutex::new(None),
        }
    }

    pub async fn find_certificate_id(
        &self,
        domains: &[String],
    ) -> Result<Option<i64>, ConnectorError> {
        let mut cache = self.cache.lock().await;
        let fresh = cache
            .as_ref()
            .map(|cached| cached.fetched_at.elapsed() < CERTIFICATE_CACHE_TTL)
            .unwrap_or(false);
        if !fresh {
            let certificates: Vec<Certificate> = self
                .npm
                .list_certificates()
                .await?
                .into_iter()
                .filter(|cert| !cert.is_deleted)
                .collect();
            tracing::debug!(count = certificates.len(), "refreshed certificate cache");
            *cache = Some(CachedCertificates {
                fetched_at: Instant::now(),
                certificates,
            });
        }

        let certificates = cache
            .as_ref()
            .map(|cached| cached.certificates.as_slice())
            .unwrap_or(&[]);
        Ok(match_certificate(certificates, domains))
    }
}

/// Matching strategies in order, first hit wins: every requested domain on
/// the certificate (exact), the primary domain on the certificate, then a
/// wildcard entry covering the primary domain.
pub fn match_certificate(certificates: &[Certificate], domains: &[String]) -> Option<i64> {
    let Some(primary) = domains.first() else {
        return None;
    };

    if let Some(cert) = certificates
        .iter()
        .find(|cert| domains.iter().all(|domain| cert.contains_domain(domain)))
    {
        return Some(cert.id);
    }

    if let Some(cert) = certificates
        .iter()
        .find(|cert| cert.contains_domain(primary))
    {
        return Some(cert.id);
    }

    let primary = primary.to_ascii_lowercase();
    certificates
        .iter()
        .find(|cert| {
            cert.domain_names.iter().any(|name| {
                name.to_ascii_lowercase()
                    .strip_prefix("*.")
                    .map(|root| {
                        primary.len() > root.len() + 1 && primary.ends_with(&format!(".{}", root))
                    })
                    .unwrap_or(false)
            })
        })
        .map(|cert| cert.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(id: i64, domains: &[&str]) -> Certificate {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "nice_name": format!("cert-{id}"),
            "domain_names": domains,
        }))
        .unwrap()
    }

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_exact_match_wins_over_primary() {
        let certs = vec![
            cert(1, &["a.test"]),
            cert(2, &["a.test", "b.test"]),
        ];
        assert_eq!(
            match_certificate(&certs, &domains(&["a.test", "b.test"])),
            Some(2)
        );
    }

    #[test]
    fn test_primary_match_when_no_exact() {
        let certs = vec![cert(1, &["a.test"])];
        assert_eq!(
            match_certificate(&certs, &domains(&["a.test", "other.test"])),
            Some(1)
        );
    }

    #[test]
    fn test_wildcard_matches_primary_domain() {
        let certs = vec![cert(9, &["*.test"])];
        assert_eq!(match_certificate(&certs, &domains(&["svc.test"])), Some(9));
    }

    #[test]
    fn test_wildcard_requires_label_to_the_left() {
        let certs = vec![cert(9, &["*.example.com"])];
        assert_eq!(
            match_certificate(&certs, &domains(&["example.com"])),
            None
        );
        assert_eq!(
            match_certificate(&certs, &domains(&["api.example.com"])),
            Some(9)
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let certs = vec![cert(4, &["Svc.Test"])];
        assert_eq!(match_certificate(&certs, &domains(&["svc.test"])), Some(4));
    }

    #[test]
    fn test_no_match_returns_none() {
        let certs = vec![cert(1, &["a.test"])];
        assert_eq!(match_certificate(&certs, &domains(&["b.test"])), None);
        assert_eq!(match_certificate(&certs, &domains(&[])), None);
    }
}
