//! Identity types for catalog entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behavior of the strongly-typed catalog identifiers.
///
/// Catalog rows use `SERIAL` primary keys. Wrapping the raw integer keeps an
/// album id from being passed where a song id is expected.
pub trait CatalogId: Copy + Eq + std::hash::Hash + fmt::Display + Send + Sync + 'static {
    /// Entity name used in messages and cache keys.
    const ENTITY: &'static str;

    /// Wrap a raw database key.
    fn new(raw: i32) -> Self;

    /// Get the raw database key.
    fn as_i32(&self) -> i32;
}

macro_rules! catalog_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i32);

        impl CatalogId for $name {
            const ENTITY: &'static str = $entity;

            fn new(raw: i32) -> Self {
                Self(raw)
            }

            fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i32>().map(Self)
            }
        }

        impl From<i32> for $name {
            fn from(raw: i32) -> Self {
                Self(raw)
            }
        }
    };
}

catalog_id!(
    /// Album primary key.
    AlbumId,
    "album"
);

catalog_id!(
    /// Song primary key.
    SongId,
    "song"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_and_display() {
        let id: AlbumId = "42".parse().expect("valid id");
        assert_eq!(id.as_i32(), 42);
        assert_eq!(id.to_string(), "42");
        assert!("forty-two".parse::<SongId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_integer() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&SongId::new(7))?;
        assert_eq!(json, "7");
        let back: SongId = serde_json::from_str(&json)?;
        assert_eq!(back, SongId::new(7));
        Ok(())
    }

    #[test]
    fn test_entity_names() {
        assert_eq!(AlbumId::ENTITY, "album");
        assert_eq!(SongId::ENTITY, "song");
    }
}
