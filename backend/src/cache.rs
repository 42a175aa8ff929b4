use std::{
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use lru::LruCache;

use crate::models::{GeoPoint, Waypoint};

const KEY_SCALE: f64 = 1e5;

/// Leg endpoints rounded to 1e-5 degrees (about a meter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegKey([i64; 4]);

impl LegKey {
    pub fn new(from: GeoPoint, to: GeoPoint) -> Self {
        let q = |v: f64| (v * KEY_SCALE).round() as i64;
        Self([q(from.lat), q(from.lng), q(to.lat), q(to.lng)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedRoute {
    pub waypoints: Vec<Waypoint>,
    pub length_m: f64,
}

#[derive(Debug)]
struct Entry {
    route: CachedRoute,
    fetched_at: Instant,
}

/// Bounded LRU of successfully routed legs with a fixed time-to-live.
#[derive(Debug)]
pub struct RouteCache {
    entries: Mutex<LruCache<LegKey, Entry>>,
    ttl: Duration,
}

impl RouteCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// `None` when `capacity` is zero.
    pub fn with_capacity(capacity: usize, ttl: Duration) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self::new(capacity, ttl))
    }

    pub fn get(&self, key: &LegKey) -> Option<CachedRoute> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if entry.fetched_at.elapsed() <= self.ttl => {
                return Some(entry.route.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: LegKey, route: CachedRoute) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(
            key,
            Entry {
                route,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
