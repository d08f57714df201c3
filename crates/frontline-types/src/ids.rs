//! Type-safe identifier wrappers around the upstream integer IDs.
//!
//! The upstream game API identifies worlds, zones, facilities, factions and
//! characters with plain integers. Wrapping each one in its own newtype
//! prevents accidentally passing a zone ID where a facility ID is expected.
//! All wrappers serialize as the bare integer.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around an integer with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub $inner);

        impl $name {
            /// Wrap a raw upstream identifier.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// Return the raw identifier value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// One independent game server instance.
    WorldId(u16)
}

define_id! {
    /// One contestable continent within a world.
    ZoneId(u32)
}

define_id! {
    /// A capturable point of interest within a zone.
    FacilityId(u32)
}

define_id! {
    /// A faction that can own facilities. `0` is the neutral/no owner.
    FactionId(u8)
}

define_id! {
    /// A player character.
    CharacterId(u64)
}

define_id! {
    /// Durable identifier of an alert, assigned by the database on insert.
    AlertId(i64)
}

impl FactionId {
    /// The "nobody owns this" faction.
    pub const NEUTRAL: Self = Self(0);

    /// Whether this is the neutral faction.
    pub const fn is_neutral(self) -> bool {
        self.0 == 0
    }
}

impl Default for FactionId {
    fn default() -> Self {
        Self::NEUTRAL
    }
}
