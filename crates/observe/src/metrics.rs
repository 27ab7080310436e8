use std::sync::OnceLock;

use prometheus::Registry;
use prometheus_metric_storage::StorageRegistry;

fn storage_registry() -> &'static StorageRegistry {
    static REGISTRY: OnceLock<StorageRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| StorageRegistry::new(Registry::new()))
}

/// The global registry metric storage structs register against, via
/// `Metrics::instance(observe::metrics::get_storage_registry())`.
pub fn get_storage_registry() -> &'static StorageRegistry {
    storage_registry()
}

/// The underlying prometheus registry, for the exposition endpoint.
pub fn get_registry() -> &'static Registry {
    storage_registry().registry()
}
