//! Startup facility populator.
//!
//! Reference data is looked up in the cache first, then upstream, then in
//! the database. Whatever is found is written back to the tiers above it:
//! upstream data is cached, and cache or upstream data is upserted into the
//! `facility` tables. Every failure is logged and skipped; with no source
//! available the engine starts with an empty catalog.

use std::future::Future;
use std::time::Duration;

use frontline_core::cache::{self, FACILITIES_KEY, LINKS_KEY};
use frontline_core::{ReferenceCache, SourceError};
use frontline_db::PostgresPool;
use frontline_types::{FacilityLink, FacilityMetadata};
use frontline_world::FacilityCatalog;
use tracing::{info, warn};

use crate::http_snapshot::ReferenceData;

/// Upstream provider of facility reference data.
pub trait ReferenceSource: Send + Sync {
    /// Fetch all facilities and links.
    fn fetch_reference(&self) -> impl Future<Output = Result<ReferenceData, SourceError>> + Send;
}

/// Where the reference data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceOrigin {
    /// The reference cache.
    Cache,
    /// The upstream API.
    Upstream,
    /// The database.
    Database,
    /// Nothing was available.
    Empty,
}

/// Load reference data through the tiers and build the catalog.
pub async fn load_catalog<C, R>(
    cache: &C,
    upstream: &R,
    db: Option<&PostgresPool>,
    ttl: Duration,
) -> (FacilityCatalog, ReferenceOrigin)
where
    C: ReferenceCache,
    R: ReferenceSource,
{
    let (reference, origin) = load_reference(cache, upstream, db, ttl).await;

    if let (Some(pool), ReferenceOrigin::Cache | ReferenceOrigin::Upstream) = (db, origin) {
        store_reference(pool, &reference).await;
    }

    let catalog = FacilityCatalog::from_parts(reference.facilities, &reference.links);
    info!(
        facilities = catalog.len(),
        links = reference.links.len(),
        origin = ?origin,
        "facility catalog loaded"
    );
    (catalog, origin)
}

async fn load_reference<C, R>(
    cache: &C,
    upstream: &R,
    db: Option<&PostgresPool>,
    ttl: Duration,
) -> (ReferenceData, ReferenceOrigin)
where
    C: ReferenceCache,
    R: ReferenceSource,
{
    if let Some(reference) = from_cache(cache).await {
        return (reference, ReferenceOrigin::Cache);
    }

    match upstream.fetch_reference().await {
        Ok(reference) if !reference.is_empty() => {
            to_cache(cache, &reference, ttl).await;
            return (reference, ReferenceOrigin::Upstream);
        }
        Ok(_) => warn!("upstream returned no facilities"),
        Err(e) => warn!(error = %e, "upstream reference fetch failed"),
    }

    if let Some(pool) = db {
        match from_database(pool).await {
            Ok(reference) if !reference.is_empty() => {
                return (reference, ReferenceOrigin::Database);
            }
            Ok(_) => warn!("no facilities stored in the database"),
            Err(e) => warn!(error = %e, "database reference load failed"),
        }
    }

    warn!("no facility reference data available, starting with an empty catalog");
    (ReferenceData::default(), ReferenceOrigin::Empty)
}

async fn from_cache<C: ReferenceCache>(cache: &C) -> Option<ReferenceData> {
    let facilities: Vec<FacilityMetadata> = match cache::get_json(cache, FACILITIES_KEY).await {
        Ok(Some(facilities)) => facilities,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "reference cache read failed");
            return None;
        }
    };
    if facilities.is_empty() {
        return None;
    }
    let links: Vec<FacilityLink> = match cache::get_json(cache, LINKS_KEY).await {
        Ok(links) => links.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "reference cache read failed");
            return None;
        }
    };
    Some(ReferenceData { facilities, links })
}

async fn to_cache<C: ReferenceCache>(cache: &C, reference: &ReferenceData, ttl: Duration) {
    if let Err(e) = cache::put_json(cache, FACILITIES_KEY, &reference.facilities, ttl).await {
        warn!(error = %e, "failed to cache facilities");
    }
    if let Err(e) = cache::put_json(cache, LINKS_KEY, &reference.links, ttl).await {
        warn!(error = %e, "failed to cache facility links");
    }
}

async fn from_database(pool: &PostgresPool) -> Result<ReferenceData, frontline_db::DbError> {
    let facilities = pool.facilities().get_all().await?;
    let links = pool.facilities().get_links().await?;
    Ok(ReferenceData { facilities, links })
}

async fn store_reference(pool: &PostgresPool, reference: &ReferenceData) {
    if let Err(e) = pool.facilities().upsert_all(&reference.facilities).await {
        warn!(error = %e, "failed to store facilities");
        return;
    }
    if let Err(e) = pool.facilities().upsert_links(&reference.links).await {
        warn!(error = %e, "failed to store facility links");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use frontline_core::{ManualClock, MemoryCache};
    use frontline_types::{FacilityId, ZoneId};

    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    struct FakeUpstream {
        reference: Option<ReferenceData>,
        calls: AtomicUsize,
    }

    impl FakeUpstream {
        fn serving(reference: ReferenceData) -> Self {
            Self {
                reference: Some(reference),
                calls: AtomicUsize::new(0),
            }
        }

        fn down() -> Self {
            Self {
                reference: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ReferenceSource for FakeUpstream {
        async fn fetch_reference(&self) -> Result<ReferenceData, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reference
                .clone()
                .ok_or_else(|| SourceError::Unavailable("connection refused".to_owned()))
        }
    }

    fn cache() -> MemoryCache {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap());
        MemoryCache::new(Arc::new(clock))
    }

    fn reference() -> ReferenceData {
        let zone = ZoneId::new(2);
        ReferenceData {
            facilities: [100, 101]
                .into_iter()
                .map(|id| FacilityMetadata {
                    facility_id: FacilityId::new(id),
                    zone_id: zone,
                    name: format!("Outpost {id}"),
                    type_id: 5,
                    type_name: "Large Outpost".to_owned(),
                })
                .collect(),
            links: vec![FacilityLink {
                zone_id: zone,
                facility_a: FacilityId::new(100),
                facility_b: FacilityId::new(101),
            }],
        }
    }

    #[tokio::test]
    async fn upstream_data_is_cached() {
        let cache = cache();
        let upstream = FakeUpstream::serving(reference());

        let (catalog, origin) = load_catalog(&cache, &upstream, None, TTL).await;
        assert_eq!(origin, ReferenceOrigin::Upstream);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.neighbors(FacilityId::new(100)), &[FacilityId::new(101)]);

        let cached: Option<Vec<FacilityMetadata>> =
            cache::get_json(&cache, FACILITIES_KEY).await.unwrap();
        assert_eq!(cached.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cache_hit_skips_upstream() {
        let cache = cache();
        let data = reference();
        cache::put_json(&cache, FACILITIES_KEY, &data.facilities, TTL)
            .await
            .unwrap();
        cache::put_json(&cache, LINKS_KEY, &data.links, TTL).await.unwrap();
        let upstream = FakeUpstream::down();

        let (catalog, origin) = load_catalog(&cache, &upstream, None, TTL).await;
        assert_eq!(origin, ReferenceOrigin::Cache);
        assert_eq!(catalog.len(), 2);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_cache_entry_falls_through() {
        let cache = cache();
        cache
            .put(FACILITIES_KEY, "not json".to_owned(), TTL)
            .await
            .unwrap();
        let upstream = FakeUpstream::serving(reference());

        let (_, origin) = load_catalog(&cache, &upstream, None, TTL).await;
        assert_eq!(origin, ReferenceOrigin::Upstream);
    }

    #[tokio::test]
    async fn nothing_available_yields_empty_catalog() {
        let cache = cache();
        let upstream = FakeUpstream::down();

        let (catalog, origin) = load_catalog(&cache, &upstream, None, TTL).await;
        assert_eq!(origin, ReferenceOrigin::Empty);
        assert!(catalog.is_empty());
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }
}
