//! Typed entity identities.
//!
//! Relationships between agencies, apps and their location rows are held as
//! keys only, never as embedded copies of the related entity.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_key {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the raw identifier.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "-{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

entity_key!(
    /// Identity of an [`Agency`](crate::Agency).
    AgencyKey,
    "agency"
);
entity_key!(
    /// Identity of a [`TransitApp`](crate::TransitApp).
    AppKey,
    "app"
);
entity_key!(
    /// Identity of a [`TransitAppLocation`](crate::TransitAppLocation) row.
    LocationKey,
    "location"
);

/// Entities that expose a stable identity for first-seen deduplication.
pub trait Keyed {
    /// Identity type compared by the seen-set.
    type Key: Copy + Eq + std::hash::Hash;

    /// Return the entity's identity.
    fn key(&self) -> Self::Key;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        assert_eq!(AgencyKey(7).to_string(), "agency-7");
        assert_eq!(AppKey(3).to_string(), "app-3");
    }

    #[test]
    fn keys_serialise_as_bare_integers() {
        let json = serde_json::to_string(&LocationKey(42)).expect("serialise key");
        assert_eq!(json, "42");
    }
}
