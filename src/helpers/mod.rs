pub mod hashing;
pub mod instance;
pub mod url;

pub use hashing::sha256_hex;
pub use instance::resolve_instance_id;
pub use url::{host_of, normalize_url};
