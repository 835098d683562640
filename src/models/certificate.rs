use serde::Deserialize;

use super::meta::Meta;
use super::serde_ext::bool_int;

/// A certificate as read from `/api/nginx/certificates`. Certificates are
/// never created or updated by this controller (issuance and file upload
/// are out of scope); they are only matched against requested domains.
#[derive(Debug, Clone, Deserialize)]
pub struct Certificate {
    pub id: i64,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub nice_name: String,
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default)]
    pub expires_on: Option<String>,
    #[serde(default, with = "bool_int")]
    pub is_deleted: bool,
    #[serde(default)]
    pub meta: Option<Meta>,
}

impl Certificate {
    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domain_names
            .iter()
            .any(|have| have.eq_ignore_ascii_case(domain))
    }
}
