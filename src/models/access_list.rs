use serde::Deserialize;

use super::meta::Meta;

/// An access list as read from `/api/nginx/access-lists`. Only referenced
/// by id from proxy hosts; mirrored through the generic resource surface.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessList {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta: Option<Meta>,
}
