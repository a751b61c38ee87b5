//! ENCORE Core - Catalog Entity Types
//!
//! Pure data structures with no I/O. All other crates depend on this.
//! Albums and songs, their typed identifiers, the `Lookup` result used by
//! id-keyed reads, the error taxonomy, and env-driven cache settings.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::CacheSettings;
pub use entities::{Album, AlbumWithSongs, Lookup, NewAlbum, NewSong, Song};
pub use error::{CacheError, CatalogError, CatalogResult, StorageError, ValidationError};
pub use identity::{AlbumId, CatalogId, SongId, Timestamp};
