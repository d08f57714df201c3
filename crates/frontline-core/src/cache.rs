//! Read-mostly reference data cache.
//!
//! Facility metadata and lattice links change rarely and are expensive to
//! fetch from upstream. [`ReferenceCache`] is the narrow capability the
//! startup populator needs: get a value, or put one with a TTL. Values are
//! stored as JSON text so any backend that stores strings will do.
//!
//! [`MemoryCache`] is the in-process backend with sliding expiration: every
//! hit pushes the entry's expiry out by its TTL again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::clock::Clock;
use crate::error::CacheError;

/// Key under which facility metadata is cached.
pub const FACILITIES_KEY: &str = "frontline:reference:facilities";
/// Key under which lattice links are cached.
pub const LINKS_KEY: &str = "frontline:reference:links";

/// Get/put-with-TTL capability over string values.
pub trait ReferenceCache: Send + Sync {
    /// Fetch a value, `None` on miss or expiry.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// Store a value for `ttl`.
    fn put(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// Fetch and decode a JSON value.
pub async fn get_json<T, C>(cache: &C, key: &str) -> Result<Option<T>, CacheError>
where
    T: DeserializeOwned,
    C: ReferenceCache,
{
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON value.
pub async fn put_json<T, C>(cache: &C, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
where
    T: Serialize + Sync,
    C: ReferenceCache,
{
    let raw = serde_json::to_string(value)?;
    cache.put(key, raw, ttl).await
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: TimeDelta,
    expires_at: DateTime<Utc>,
}

/// In-process cache with sliding expiration.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache").finish_non_exhaustive()
    }
}

impl MemoryCache {
    /// Create an empty cache reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn get_sync(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let live = entries.get(key).is_some_and(|e| e.expires_at > now);
        if !live {
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.expires_at = now
            .checked_add_signed(entry.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(entry.value.clone())
    }

    fn put_sync(&self, key: &str, value: String, ttl: Duration) {
        let now = self.clock.now();
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_owned(),
            Entry {
                value,
                ttl,
                expires_at,
            },
        );
    }
}

impl ReferenceCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.get_sync(key))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.put_sync(key, value, ttl);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use frontline_types::{FacilityId, FacilityLink, ZoneId};

    use super::*;
    use crate::clock::ManualClock;

    fn setup() -> (Arc<ManualClock>, MemoryCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        ));
        let cache = MemoryCache::new(Arc::clone(&clock) as Arc<dyn Clock>);
        (clock, cache)
    }

    #[tokio::test]
    async fn hits_slide_the_expiry() {
        let (clock, cache) = setup();
        cache
            .put("k", String::from("v"), Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(TimeDelta::seconds(50));
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        // 100s after the put, but only 50s after the last hit.
        clock.advance(TimeDelta::seconds(50));
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(TimeDelta::seconds(61));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_helpers_roundtrip_reference_data() {
        let (_clock, cache) = setup();
        let links = vec![FacilityLink {
            zone_id: ZoneId::new(2),
            facility_a: FacilityId::new(1),
            facility_b: FacilityId::new(2),
        }];
        put_json(&cache, LINKS_KEY, &links, Duration::from_secs(60))
            .await
            .unwrap();
        let back: Option<Vec<FacilityLink>> = get_json(&cache, LINKS_KEY).await.unwrap();
        assert_eq!(back, Some(links));

        let missing: Option<Vec<FacilityLink>> = get_json(&cache, FACILITIES_KEY).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn corrupt_values_are_codec_errors() {
        let (_clock, cache) = setup();
        cache
            .put(LINKS_KEY, String::from("{not json"), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Result<Option<Vec<FacilityLink>>, _> = get_json(&cache, LINKS_KEY).await;
        assert!(matches!(result, Err(CacheError::Codec { .. })));
    }
}
