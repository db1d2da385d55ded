//! Worker discovery.
//!
//! The dispatcher only needs a point-in-time view of which transform workers
//! are live, exposed through [`ServiceDirectory`]. [`WorkerRegistry`] is the
//! in-memory implementation used by the gateway: workers register under a
//! transform name with a lease that must be renewed.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use transformations::Transform;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(90);

/// Read-only view of the currently registered worker names.
pub trait ServiceDirectory: Send + Sync {
    /// Snapshot of live worker names, lowercased.
    fn list_registered_names(&self) -> HashSet<String>;
}

/// Where a registered worker can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerLocation {
    /// Served by the gateway process itself.
    Local,
    /// Base URL of a remote worker, e.g. `http://10.0.0.4:8081`.
    Remote(String),
}

#[derive(Debug, Clone)]
struct WorkerRegistration {
    name: String,
    location: WorkerLocation,
    expires_at: Option<Instant>,
}

impl WorkerRegistration {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Body of `POST /registry/workers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorker {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Default)]
struct Entries {
    /// In-process and statically configured workers. Never expire.
    pinned: HashMap<String, WorkerRegistration>,
    /// Remote registrations. Shadow a pinned entry of the same name while live.
    leased: HashMap<String, WorkerRegistration>,
}

impl Entries {
    fn live(&self, key: &str, now: Instant) -> Option<&WorkerRegistration> {
        self.leased
            .get(key)
            .filter(|entry| entry.is_live(now))
            .or_else(|| self.pinned.get(key))
    }
}

#[derive(Debug)]
pub struct WorkerRegistry {
    entries: RwLock<Entries>,
    lease_ttl: Duration,
}

impl WorkerRegistry {
    pub fn new(lease_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            lease_ttl,
        }
    }

    /// Registry with every supported transform served in-process.
    pub fn local() -> Self {
        let registry = Self::default();
        for transform in Transform::ALL {
            registry.pin(transform.name(), WorkerLocation::Local);
        }
        registry
    }

    /// Registry with fixed remote workers that never expire.
    pub fn with_static<I, N, U>(workers: I, lease_ttl: Duration) -> Self
    where
        I: IntoIterator<Item = (N, U)>,
        N: AsRef<str>,
        U: Into<String>,
    {
        let registry = Self::new(lease_ttl);
        for (name, url) in workers {
            registry.pin(name.as_ref(), WorkerLocation::Remote(url.into()));
        }
        registry
    }

    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Registers or renews a leased remote worker.
    ///
    /// While the lease is live it takes precedence over a pinned entry of
    /// the same name; once it is removed or expires the pinned entry is
    /// served again.
    pub fn register(&self, name: &str, url: impl Into<String>) {
        let key = registry_key(name);
        let location = WorkerLocation::Remote(url.into());
        log::debug!("Leasing worker {} at {:?} for {:?}", key, location, self.lease_ttl);
        self.write().leased.insert(
            key,
            WorkerRegistration {
                name: name.trim().to_string(),
                location,
                expires_at: Some(Instant::now() + self.lease_ttl),
            },
        );
    }

    /// Removes the lease for `name` if there is one, otherwise its pinned
    /// entry. Returns true if an entry was removed.
    pub fn deregister(&self, name: &str) -> bool {
        let key = registry_key(name);
        let mut entries = self.write();
        let removed =
            entries.leased.remove(&key).is_some() || entries.pinned.remove(&key).is_some();
        if removed {
            log::info!("Deregistered worker {}", name);
        }
        removed
    }

    pub fn location(&self, name: &str) -> Option<WorkerLocation> {
        self.read()
            .live(&registry_key(name), Instant::now())
            .map(|entry| entry.location.clone())
    }

    /// Drops expired leases, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let before = entries.leased.len();
        entries.leased.retain(|_, entry| entry.is_live(now));
        let evicted = before - entries.leased.len();
        if evicted > 0 {
            log::info!("Evicted {} expired worker registrations", evicted);
        }
        evicted
    }

    fn pin(&self, name: &str, location: WorkerLocation) {
        let key = registry_key(name);
        log::debug!("Pinning worker {} at {:?}", key, location);
        self.write().pinned.insert(
            key,
            WorkerRegistration {
                name: name.trim().to_string(),
                location,
                expires_at: None,
            },
        );
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL)
    }
}

impl ServiceDirectory for WorkerRegistry {
    fn list_registered_names(&self) -> HashSet<String> {
        let now = Instant::now();
        let entries = self.read();
        entries
            .pinned
            .keys()
            .chain(entries.leased.keys())
            .filter_map(|key| entries.live(key, now).map(|entry| (key, entry)))
            .map(|(key, entry)| {
                log::trace!("Live worker {} ({:?})", entry.name, entry.location);
                key.clone()
            })
            .collect()
    }
}

/// Names are matched case-insensitively everywhere.
pub fn registry_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_registers_all_transforms() {
        let names = WorkerRegistry::local().list_registered_names();
        assert_eq!(names.len(), Transform::ALL.len());
        assert!(names.contains("grayscale"));
        assert!(names.contains("sepia"));
        assert!(names.contains("tint"));
    }

    #[test]
    fn test_names_case_insensitive() {
        let registry = WorkerRegistry::default();
        registry.register("SEPIA", "http://worker:8081");

        assert!(registry.list_registered_names().contains("sepia"));
        assert_eq!(
            registry.location("Sepia"),
            Some(WorkerLocation::Remote("http://worker:8081".to_string()))
        );
    }

    #[test]
    fn test_deregister() {
        let registry = WorkerRegistry::with_static([("tint", "http://w")], DEFAULT_LEASE_TTL);
        assert!(registry.deregister("TINT"));
        assert!(!registry.deregister("tint"));
        assert!(registry.list_registered_names().is_empty());
    }

    #[test]
    fn test_expired_lease_not_listed() {
        let registry = WorkerRegistry::new(Duration::ZERO);
        registry.register("grayscale", "http://w");

        assert!(registry.list_registered_names().is_empty());
        assert_eq!(registry.location("grayscale"), None);
        assert_eq!(registry.evict_expired(), 1);
    }

    #[test]
    fn test_static_entries_never_expire() {
        let registry = WorkerRegistry::with_static([("sepia", "http://w")], Duration::ZERO);
        assert_eq!(registry.evict_expired(), 0);
        assert!(registry.list_registered_names().contains("sepia"));
    }

    #[test]
    fn test_reregister_renews_location() {
        let registry = WorkerRegistry::default();
        registry.register("sepia", "http://old");
        registry.register("sepia", "http://new");
        assert_eq!(
            registry.location("sepia"),
            Some(WorkerLocation::Remote("http://new".to_string()))
        );
        assert_eq!(registry.list_registered_names().len(), 1);
    }

    #[test]
    fn test_lease_shadows_local_worker() {
        let registry = WorkerRegistry::local();
        registry.register("sepia", "http://worker:8081");
        assert_eq!(
            registry.location("sepia"),
            Some(WorkerLocation::Remote("http://worker:8081".to_string()))
        );

        assert!(registry.deregister("sepia"));
        assert_eq!(registry.location("sepia"), Some(WorkerLocation::Local));
        assert!(registry.list_registered_names().contains("sepia"));
    }

    #[test]
    fn test_expired_lease_falls_back_to_local_worker() {
        let registry = WorkerRegistry::local().with_lease_ttl(Duration::ZERO);
        registry.register("tint", "http://worker:8081");

        assert_eq!(registry.location("tint"), Some(WorkerLocation::Local));
        assert_eq!(registry.evict_expired(), 1);
        assert_eq!(registry.location("tint"), Some(WorkerLocation::Local));
        assert_eq!(registry.list_registered_names().len(), Transform::ALL.len());
    }
}
