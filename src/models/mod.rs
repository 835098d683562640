pub mod access_list;
pub mod certificate;
pub mod meta;
pub mod proxy_host;
pub mod serde_ext;
pub mod stream;

pub use access_list::AccessList;
pub use certificate::Certificate;
pub use meta::{Meta, MetaValue};
pub use proxy_host::{ProxyHost, ProxyHostPayload};
pub use stream::{Stream, StreamPayload};

use std::fmt;

/// The proxy-manager resource kinds this controller reads or writes.
/// `mirror_order` lists them dependencies-first, so id remaps for
/// certificates and access lists exist before the hosts that reference
/// them are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Certificate,
    AccessList,
    ProxyHost,
    RedirectionHost,
    Stream,
    DeadHost,
}

impl ResourceKind {
    pub fn api_path(&self) -> &'static str {
        match self {
            Self::Certificate => "certificates",
            Self::AccessList => "access-lists",
            Self::ProxyHost => "proxy-hosts",
            Self::RedirectionHost => "redirection-hosts",
            Self::Stream => "streams",
            Self::DeadHost => "dead-hosts",
        }
    }

    pub fn mirror_order() -> [ResourceKind; 6] {
        [
            Self::Certificate,
            Self::AccessList,
            Self::ProxyHost,
            Self::RedirectionHost,
            Self::Stream,
            Self::DeadHost,
        ]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_path())
    }
}
