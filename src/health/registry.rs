// src/health/registry.rs
use super::probe::Probe;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable view of the registry taken at the start of a run.
pub type ProbeSnapshot = Arc<HashMap<String, Arc<dyn Probe>>>;

/// Named set of probes shared by every aggregation run.
///
/// Writers publish a fresh copy of the map, readers grab the current `Arc`.
/// A run therefore iterates a map no registration can touch.
pub struct ProbeRegistry {
    probes: ArcSwap<HashMap<String, Arc<dyn Probe>>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self {
            probes: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Insert `probe` under `name`, replacing any probe already there.
    pub fn register<P>(&self, name: impl Into<String>, probe: P)
    where
        P: Probe + 'static,
    {
        self.register_arc(name, Arc::new(probe));
    }

    pub fn register_arc(&self, name: impl Into<String>, probe: Arc<dyn Probe>) {
        let name = name.into();
        let previous = self.probes.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(name.clone(), probe.clone());
            next
        });

        if previous.contains_key(&name) {
            tracing::debug!(probe = %name, "replaced health probe");
        } else {
            tracing::debug!(probe = %name, "registered health probe");
        }
    }

    /// Remove the probe registered under `name`. Returns whether one existed.
    pub fn deregister(&self, name: &str) -> bool {
        let previous = self.probes.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(name);
            next
        });

        let removed = previous.contains_key(name);
        if removed {
            tracing::debug!(probe = %name, "deregistered health probe");
        }
        removed
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        self.probes.load_full()
    }

    pub fn len(&self) -> usize {
        self.probes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.load().is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.probes.load().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
