// src/registry.rs

//! The Service Registry: the immutable set of known service definitions.
//!
//! Read-mostly. Reconfiguration never mutates individual entries; the whole
//! set is replaced atomically, so readers observe either the old set or the
//! new one, never a mix.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::ServiceConfig;

#[derive(Debug)]
pub struct ServiceRegistry {
    inner: RwLock<RegistrySet>,
}

#[derive(Debug)]
struct RegistrySet {
    /// Insertion order of the loaded config file.
    ordered: Vec<ServiceConfig>,
    /// id -> index into `ordered`.
    index: HashMap<String, usize>,
}

impl RegistrySet {
    fn build(services: Vec<ServiceConfig>) -> Self {
        let index = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self {
            ordered: services,
            index,
        }
    }
}

impl ServiceRegistry {
    /// Build a registry from an already-validated service list (the config
    /// loader guarantees unique, non-empty ids).
    pub fn new(services: Vec<ServiceConfig>) -> Self {
        Self {
            inner: RwLock::new(RegistrySet::build(services)),
        }
    }

    /// Atomically replace the whole set.
    pub fn replace(&self, services: Vec<ServiceConfig>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        *inner = RegistrySet::build(services);
    }

    /// Look up one service definition by id.
    pub fn lookup(&self, id: &str) -> Option<ServiceConfig> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.index.get(id).map(|&i| inner.ordered[i].clone())
    }

    /// All service definitions, in config-file order.
    pub fn list(&self) -> Vec<ServiceConfig> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.ordered.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.index.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(id: &str) -> ServiceConfig {
        ServiceConfig {
            id: id.to_string(),
            name: None,
            command: format!("echo {id}"),
            dir: None,
            env: Default::default(),
            autostart: false,
        }
    }

    #[test]
    fn lookup_and_order() {
        let reg = ServiceRegistry::new(vec![svc("b"), svc("a"), svc("c")]);

        assert!(reg.lookup("a").is_some());
        assert!(reg.lookup("missing").is_none());

        let ids: Vec<String> = reg.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn replace_swaps_whole_set() {
        let reg = ServiceRegistry::new(vec![svc("a")]);
        reg.replace(vec![svc("x"), svc("y")]);

        assert!(reg.lookup("a").is_none());
        assert!(reg.contains("x"));
        assert_eq!(reg.list().len(), 2);
    }
}
