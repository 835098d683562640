/// Stable identifier for this controller process, written into
/// `meta.sync_instance_id` on every resource we create.
///
/// Resolution order: explicit override, then the HOSTNAME the container
/// runtime assigns, then a random id. A random id still arbitrates between
/// concurrently running instances but cannot re-claim resources after a
/// restart, hence the warning.
pub fn resolve_instance_id(overridden: Option<&str>) -> String {
    if let Some(id) = overridden {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        let hostname = hostname.trim().to_string();
        if !hostname.is_empty() {
            return hostname;
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    tracing::warn!(
        instance_id = %id,
        "no instance id configured and no HOSTNAME set; using a random id \
         (ownership will not survive a restart)"
    );
    id
}
