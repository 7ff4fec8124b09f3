use std::path::Path;

use tracing::debug;

use crate::utils::constants::{DEFAULT_MANAGEMENT_NAMESPACE, SERVICE_ACCOUNT_NAMESPACE_FILE};

/// Namespace identity requests live in: the pod's own namespace, or `azure-arc` outside a pod.
pub fn management_namespace() -> String {
    namespace_from_file(Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE))
}

pub fn namespace_from_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => content.trim().to_owned(),
        Ok(_) => DEFAULT_MANAGEMENT_NAMESPACE.to_owned(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "service account namespace unavailable");
            DEFAULT_MANAGEMENT_NAMESPACE.to_owned()
        }
    }
}
