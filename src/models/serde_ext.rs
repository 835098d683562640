//! Wire-format helpers for the proxy-manager API.
//!
//! The API stores its flags as 0/1 integers but various endpoints echo
//! them back as booleans, integers or numeric strings depending on
//! version. Reads accept all three; writes always emit 0/1.

pub mod bool_int {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tolerant {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Tolerant::deserialize(deserializer)? {
            Tolerant::Bool(b) => b,
            Tolerant::Int(i) => i != 0,
            Tolerant::Str(s) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s.parse::<i64>().map(|i| i != 0).unwrap_or(false)
            }
        })
    }
}

/// `enabled` defaults to on when the field is missing from a read.
pub fn default_true() -> bool {
    true
}
