//! Driver registry
//!
//! Maps each [`BackendType`] to the [`Driver`] that opens its connections.
//! Registering a driver for [`BackendType::Custom`] is how new stores are
//! plugged into the manager.

use super::{BackendType, Driver};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Registry of drivers keyed by backend type
///
/// # Example
///
/// ```
/// use tessera::backend::{BackendType, DriverRegistry, MemoryKeyValueDriver};
/// use std::sync::Arc;
///
/// let registry = DriverRegistry::new();
/// registry.register(Arc::new(MemoryKeyValueDriver::new()));
///
/// assert!(registry.get(&BackendType::KeyValue).is_some());
/// assert!(registry.get(&BackendType::Document).is_none());
/// ```
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<BackendType, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under the backend type it reports
    ///
    /// Replaces any driver previously registered for that type.
    pub fn register(&self, driver: Arc<dyn Driver>) {
        let backend = driver.backend_type();
        let mut drivers = self.drivers.write().unwrap_or_else(|e| e.into_inner());
        drivers.insert(backend, driver);
    }

    /// Look up the driver for a backend type
    pub fn get(&self, backend: &BackendType) -> Option<Arc<dyn Driver>> {
        let drivers = self.drivers.read().unwrap_or_else(|e| e.into_inner());
        drivers.get(backend).cloned()
    }

    /// Remove a driver
    pub fn unregister(&self, backend: &BackendType) -> bool {
        let mut drivers = self.drivers.write().unwrap_or_else(|e| e.into_inner());
        drivers.remove(backend).is_some()
    }

    /// Backend types with a registered driver, sorted
    pub fn backends(&self) -> Vec<BackendType> {
        let drivers = self.drivers.read().unwrap_or_else(|e| e.into_inner());
        let mut backends: Vec<_> = drivers.keys().cloned().collect();
        backends.sort();
        backends
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryDocumentDriver, MemoryKeyValueDriver};

    #[test]
    fn test_register_and_lookup() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(MemoryKeyValueDriver::new()));
        registry.register(Arc::new(MemoryDocumentDriver::new()));

        assert_eq!(
            registry.backends(),
            vec![BackendType::KeyValue, BackendType::Document]
        );
    }

    #[test]
    fn test_unregister() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(MemoryKeyValueDriver::new()));

        assert!(registry.unregister(&BackendType::KeyValue));
        assert!(!registry.unregister(&BackendType::KeyValue));
        assert!(registry.get(&BackendType::KeyValue).is_none());
    }
}
