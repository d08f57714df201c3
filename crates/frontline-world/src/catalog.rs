//! Static facility reference data: metadata and lattice links.
//!
//! The [`FacilityCatalog`] is read-only once built. It tells each zone which
//! facilities exist (so unseen facilities can start out neutral) and gives
//! the tracker the lattice adjacency used to sanity-check captures.
//!
//! Internally, an adjacency map indexes links per facility:
//! `BTreeMap<FacilityId, Vec<FacilityId>>`. Links are undirected.

use std::collections::BTreeMap;

use frontline_types::{FacilityId, FacilityLink, FacilityMetadata, ZoneId};
use tracing::warn;

use crate::error::WorldError;

/// Facility metadata and lattice adjacency for every zone.
#[derive(Debug, Clone, Default)]
pub struct FacilityCatalog {
    /// All facilities indexed by ID.
    facilities: BTreeMap<FacilityId, FacilityMetadata>,
    /// Facility IDs grouped by zone.
    by_zone: BTreeMap<ZoneId, Vec<FacilityId>>,
    /// Undirected adjacency built from lattice links.
    adjacency: BTreeMap<FacilityId, Vec<FacilityId>>,
}

impl FacilityCatalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            facilities: BTreeMap::new(),
            by_zone: BTreeMap::new(),
            adjacency: BTreeMap::new(),
        }
    }

    /// Build a catalog from upstream reference data.
    ///
    /// Links whose endpoints are not in `facilities` are skipped with a
    /// warning; reference data is external and may be slightly out of date.
    pub fn from_parts(facilities: Vec<FacilityMetadata>, links: &[FacilityLink]) -> Self {
        let mut catalog = Self::new();
        for facility in facilities {
            catalog.add_facility(facility);
        }
        for link in links {
            if let Err(e) = catalog.add_link(*link) {
                warn!(error = %e, zone = %link.zone_id, "skipping lattice link");
            }
        }
        catalog
    }

    /// Add or replace a facility.
    pub fn add_facility(&mut self, facility: FacilityMetadata) {
        let id = facility.facility_id;
        let zone = facility.zone_id;
        if let Some(previous) = self.facilities.insert(id, facility)
            && previous.zone_id != zone
            && let Some(ids) = self.by_zone.get_mut(&previous.zone_id)
        {
            ids.retain(|f| *f != id);
        }
        let ids = self.by_zone.entry(zone).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Add an undirected lattice link.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DanglingLink`] if either endpoint is unknown.
    pub fn add_link(&mut self, link: FacilityLink) -> Result<(), WorldError> {
        for end in [link.facility_a, link.facility_b] {
            if !self.facilities.contains_key(&end) {
                return Err(WorldError::DanglingLink(end));
            }
        }
        let a = self.adjacency.entry(link.facility_a).or_default();
        if !a.contains(&link.facility_b) {
            a.push(link.facility_b);
        }
        let b = self.adjacency.entry(link.facility_b).or_default();
        if !b.contains(&link.facility_a) {
            b.push(link.facility_a);
        }
        Ok(())
    }

    /// Look up a facility's metadata.
    pub fn get(&self, facility: FacilityId) -> Option<&FacilityMetadata> {
        self.facilities.get(&facility)
    }

    /// All facility IDs in a zone.
    pub fn facilities_in(&self, zone: ZoneId) -> &[FacilityId] {
        self.by_zone.get(&zone).map_or(&[], Vec::as_slice)
    }

    /// Facilities directly linked to `facility` on the lattice.
    pub fn neighbors(&self, facility: FacilityId) -> &[FacilityId] {
        self.adjacency.get(&facility).map_or(&[], Vec::as_slice)
    }

    /// Number of facilities in the catalog.
    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    /// Whether the catalog has no facilities.
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}
