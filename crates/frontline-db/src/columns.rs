//! Conversions between domain identifiers and `PostgreSQL` column types.
//!
//! `PostgreSQL` has no unsigned integers, so every ID is stored in the
//! next wider signed type and checked on the way back out.

use frontline_types::{CharacterId, FacilityId, FactionId, WorldId, ZoneId};

use crate::error::DbError;

pub(crate) fn world(id: WorldId) -> i32 {
    i32::from(id.into_inner())
}

pub(crate) fn zone(id: ZoneId) -> i64 {
    i64::from(id.into_inner())
}

pub(crate) fn facility(id: FacilityId) -> i64 {
    i64::from(id.into_inner())
}

pub(crate) fn faction(id: FactionId) -> i16 {
    i16::from(id.into_inner())
}

/// Character IDs above `i64::MAX` do not occur upstream; they saturate.
pub(crate) fn character(id: CharacterId) -> i64 {
    i64::try_from(id.into_inner()).unwrap_or(i64::MAX)
}

pub(crate) fn to_world(raw: i32) -> Result<WorldId, DbError> {
    DbError::checked::<_, u16>("world_id", raw).map(WorldId::new)
}

pub(crate) fn to_zone(raw: i64) -> Result<ZoneId, DbError> {
    DbError::checked::<_, u32>("zone_id", raw).map(ZoneId::new)
}

pub(crate) fn to_facility(raw: i64) -> Result<FacilityId, DbError> {
    DbError::checked::<_, u32>("facility_id", raw).map(FacilityId::new)
}

pub(crate) fn to_faction(raw: i16) -> Result<FactionId, DbError> {
    DbError::checked::<_, u8>("faction_id", raw).map(FactionId::new)
}

pub(crate) fn to_character(raw: i64) -> Result<CharacterId, DbError> {
    DbError::checked::<_, u64>("character_id", raw).map(CharacterId::new)
}
