//! The process-wide ownership store: worlds → zones → facilities.
//!
//! [`MapStore`] replaces implicit global dictionaries with an explicit store
//! injected into every tracker. Worlds and zones are created lazily on first
//! write and live for the process lifetime. Each zone sits behind its own
//! `RwLock`, so events for different zones (and different worlds) never
//! contend, while live events and reconciliation corrections for the same
//! zone are serialized through that zone's writer lock.
//!
//! Locks are `std::sync` locks and are never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use frontline_types::{FacilityId, FactionId, WorldId, ZoneId};
use tracing::warn;

use crate::catalog::FacilityCatalog;
use crate::error::WorldError;
use crate::zone::Zone;

type ZoneHandle = Arc<RwLock<Zone>>;

/// All zones of one world.
#[derive(Debug)]
pub struct WorldMap {
    world_id: WorldId,
    zones: RwLock<BTreeMap<ZoneId, ZoneHandle>>,
}

impl WorldMap {
    fn new(world_id: WorldId) -> Self {
        Self {
            world_id,
            zones: RwLock::new(BTreeMap::new()),
        }
    }

    /// World ID.
    pub const fn world_id(&self) -> WorldId {
        self.world_id
    }

    fn existing(&self, zone: ZoneId) -> Result<Option<ZoneHandle>, WorldError> {
        let zones = self
            .zones
            .read()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        Ok(zones.get(&zone).cloned())
    }

    fn get_or_create(
        &self,
        zone: ZoneId,
        catalog: &FacilityCatalog,
    ) -> Result<ZoneHandle, WorldError> {
        if let Some(handle) = self.existing(zone)? {
            return Ok(handle);
        }
        let mut zones = self
            .zones
            .write()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        let handle = zones.entry(zone).or_insert_with(|| {
            Arc::new(RwLock::new(Zone::new(
                self.world_id,
                zone,
                catalog.facilities_in(zone),
            )))
        });
        Ok(Arc::clone(handle))
    }

    fn zone_ids(&self) -> Result<Vec<ZoneId>, WorldError> {
        let zones = self
            .zones
            .read()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        Ok(zones.keys().copied().collect())
    }
}

/// Thread-safe ownership store for every world.
#[derive(Debug)]
pub struct MapStore {
    catalog: Arc<FacilityCatalog>,
    worlds: RwLock<BTreeMap<WorldId, Arc<WorldMap>>>,
}

impl MapStore {
    /// Create an empty store backed by `catalog`.
    pub fn new(catalog: Arc<FacilityCatalog>) -> Self {
        Self {
            catalog,
            worlds: RwLock::new(BTreeMap::new()),
        }
    }

    /// The static facility catalog.
    pub fn catalog(&self) -> &FacilityCatalog {
        &self.catalog
    }

    // -------------------------------------------------------------------
    // Index
    // -------------------------------------------------------------------

    fn existing_world(&self, world: WorldId) -> Result<Option<Arc<WorldMap>>, WorldError> {
        let worlds = self
            .worlds
            .read()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        Ok(worlds.get(&world).cloned())
    }

    fn world(&self, world: WorldId) -> Result<Arc<WorldMap>, WorldError> {
        if let Some(map) = self.existing_world(world)? {
            return Ok(map);
        }
        let mut worlds = self
            .worlds
            .write()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        let map = worlds
            .entry(world)
            .or_insert_with(|| Arc::new(WorldMap::new(world)));
        Ok(Arc::clone(map))
    }

    fn existing_zone(&self, world: WorldId, zone: ZoneId) -> Result<Option<ZoneHandle>, WorldError> {
        match self.existing_world(world)? {
            Some(map) => map.existing(zone),
            None => Ok(None),
        }
    }

    /// Worlds that have seen at least one write.
    pub fn worlds(&self) -> Result<Vec<WorldId>, WorldError> {
        let worlds = self
            .worlds
            .read()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        Ok(worlds.keys().copied().collect())
    }

    /// Zones of `world` that have seen at least one write.
    pub fn zones(&self, world: WorldId) -> Result<Vec<ZoneId>, WorldError> {
        match self.existing_world(world)? {
            Some(map) => map.zone_ids(),
            None => Ok(Vec::new()),
        }
    }

    // -------------------------------------------------------------------
    // Zone access
    // -------------------------------------------------------------------

    /// Run `f` with exclusive access to a zone, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ZonePoisoned`] if a previous writer panicked
    /// while holding the zone. Call [`MapStore::rebuild_zone`] to recover.
    pub fn with_zone_mut<R>(
        &self,
        world: WorldId,
        zone: ZoneId,
        f: impl FnOnce(&mut Zone) -> R,
    ) -> Result<R, WorldError> {
        let handle = self.world(world)?.get_or_create(zone, &self.catalog)?;
        let mut guard = handle
            .write()
            .map_err(|_poisoned| WorldError::ZonePoisoned { world, zone })?;
        Ok(f(&mut guard))
    }

    /// Run `f` with shared access to a zone if it exists.
    pub fn with_zone<R>(
        &self,
        world: WorldId,
        zone: ZoneId,
        f: impl FnOnce(&Zone) -> R,
    ) -> Result<Option<R>, WorldError> {
        let Some(handle) = self.existing_zone(world, zone)? else {
            return Ok(None);
        };
        let guard = handle
            .read()
            .map_err(|_poisoned| WorldError::ZonePoisoned { world, zone })?;
        Ok(Some(f(&guard)))
    }

    /// Replace a zone with a clean, all-neutral copy seeded from the catalog.
    ///
    /// Used after a writer panicked inside the zone. The next reconciliation
    /// pass restores the real owners.
    pub fn rebuild_zone(&self, world: WorldId, zone: ZoneId) -> Result<(), WorldError> {
        let map = self.world(world)?;
        let fresh = Zone::new(world, zone, self.catalog.facilities_in(zone));
        let mut zones = map
            .zones
            .write()
            .map_err(|e| WorldError::IndexPoisoned(e.to_string()))?;
        zones.insert(zone, Arc::new(RwLock::new(fresh)));
        warn!(world = %world, zone = %zone, "zone rebuilt from neutral state");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Current owner of a facility.
    ///
    /// Zones that have never been written answer from the catalog: known
    /// facilities are neutral, unknown ones are `None`.
    pub fn owner(
        &self,
        world: WorldId,
        zone: ZoneId,
        facility: FacilityId,
    ) -> Result<Option<FactionId>, WorldError> {
        if let Some(owner) = self.with_zone(world, zone, |z| z.owner(facility))? {
            return Ok(owner);
        }
        let known = self.catalog.facilities_in(zone).contains(&facility);
        Ok(known.then_some(FactionId::NEUTRAL))
    }

    /// Point-in-time copy of a zone's ownership table.
    pub fn zone_snapshot(
        &self,
        world: WorldId,
        zone: ZoneId,
    ) -> Result<BTreeMap<FacilityId, FactionId>, WorldError> {
        if let Some(snapshot) = self.with_zone(world, zone, Zone::snapshot)? {
            return Ok(snapshot);
        }
        Ok(self
            .catalog
            .facilities_in(zone)
            .iter()
            .map(|id| (*id, FactionId::NEUTRAL))
            .collect())
    }
}
