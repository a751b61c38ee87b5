//! Cache keys derived from catalog query shapes.
//!
//! A `CacheKey` can only be built through the per-query constructors, so
//! every key in the cache maps back to exactly one store query. Write paths
//! use the `for_*` helpers to find every key a mutation can affect.

use std::collections::HashSet;
use std::fmt;

use encore_core::{AlbumId, CatalogId, SongId};

/// A cache key for one catalog query shape and its parameters.
///
/// # Text Format
///
/// Keys encode to colon-separated text, which reads well in `redis-cli`:
/// - `album:list`
/// - `song:list`
/// - `album:detail:{id}`
/// - `song:detail:{id}`
///
/// The namespace prefix is applied by the cache, not stored in the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Private shape - keys cannot be assembled from arbitrary strings.
    shape: KeyShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyShape {
    AlbumList,
    SongList,
    AlbumDetail(AlbumId),
    SongDetail(SongId),
}

impl CacheKey {
    /// Key for `SELECT * FROM album`.
    pub fn album_list() -> Self {
        Self {
            shape: KeyShape::AlbumList,
        }
    }

    /// Key for `SELECT * FROM songs`.
    pub fn song_list() -> Self {
        Self {
            shape: KeyShape::SongList,
        }
    }

    /// Key for one album and the songs that reference it.
    pub fn album_detail(id: AlbumId) -> Self {
        Self {
            shape: KeyShape::AlbumDetail(id),
        }
    }

    /// Key for one song.
    pub fn song_detail(id: SongId) -> Self {
        Self {
            shape: KeyShape::SongDetail(id),
        }
    }

    /// Name of the read operation this key caches, used as a metric label.
    pub fn operation(&self) -> &'static str {
        match self.shape {
            KeyShape::AlbumList => "album_list",
            KeyShape::SongList => "song_list",
            KeyShape::AlbumDetail(_) => "album_detail",
            KeyShape::SongDetail(_) => "song_detail",
        }
    }

    /// Returns true for id-keyed lookups, which may legitimately miss.
    pub fn is_detail(&self) -> bool {
        matches!(
            self.shape,
            KeyShape::AlbumDetail(_) | KeyShape::SongDetail(_)
        )
    }

    /// Encode to the text form stored in the cache (without namespace).
    pub fn encode(&self) -> String {
        match self.shape {
            KeyShape::AlbumList => "album:list".to_string(),
            KeyShape::SongList => "song:list".to_string(),
            KeyShape::AlbumDetail(id) => format!("{}:detail:{}", AlbumId::ENTITY, id),
            KeyShape::SongDetail(id) => format!("{}:detail:{}", SongId::ENTITY, id),
        }
    }

    /// Decode the text form produced by [`CacheKey::encode`].
    ///
    /// Returns `None` for anything that is not a well-formed key.
    pub fn decode(text: &str) -> Option<Self> {
        let mut parts = text.split(':');
        let entity = parts.next()?;
        let kind = parts.next()?;
        let id = parts.next();
        if parts.next().is_some() {
            return None;
        }

        let shape = match (entity, kind, id) {
            ("album", "list", None) => KeyShape::AlbumList,
            ("song", "list", None) => KeyShape::SongList,
            ("album", "detail", Some(id)) => KeyShape::AlbumDetail(parse_id(id)?),
            ("song", "detail", Some(id)) => KeyShape::SongDetail(parse_id(id)?),
            _ => return None,
        };
        Some(Self { shape })
    }

    /// Keys affected by creating an album.
    ///
    /// The detail key is included so a cached "not found" for a reused id
    /// cannot outlive the insert.
    pub fn for_album_created(album_id: AlbumId) -> HashSet<CacheKey> {
        HashSet::from([Self::album_list(), Self::album_detail(album_id)])
    }

    /// Keys affected by creating a song.
    pub fn for_song_created(song_id: SongId, album_id: Option<AlbumId>) -> HashSet<CacheKey> {
        let mut keys = HashSet::from([Self::song_list(), Self::song_detail(song_id)]);
        if let Some(album_id) = album_id {
            keys.insert(Self::album_detail(album_id));
        }
        keys
    }
}

fn parse_id<I: CatalogId>(text: &str) -> Option<I> {
    // Only the canonical form `encode` emits: no sign, padding or leading zeros.
    let raw = text.parse::<i32>().ok()?;
    (raw.to_string() == text).then(|| I::new(raw))
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encoded_forms() {
        assert_eq!(CacheKey::album_list().encode(), "album:list");
        assert_eq!(CacheKey::song_list().encode(), "song:list");
        assert_eq!(CacheKey::album_detail(AlbumId::new(1)).encode(), "album:detail:1");
        assert_eq!(CacheKey::song_detail(SongId::new(42)).encode(), "song:detail:42");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        for bad in [
            "",
            "album",
            "album:list:1",
            "album:detail",
            "album:detail:x",
            "album:detail:+1",
            "album:detail: 1",
            "song:detail:1:extra",
            "playlist:list",
        ] {
            assert_eq!(CacheKey::decode(bad), None, "{bad:?} should not decode");
        }
    }

    #[test]
    fn test_album_created_invalidates_list_and_detail() {
        let keys = CacheKey::for_album_created(AlbumId::new(3));
        assert!(keys.contains(&CacheKey::album_list()));
        assert!(keys.contains(&CacheKey::album_detail(AlbumId::new(3))));
        assert!(!keys.contains(&CacheKey::song_list()));
    }

    #[test]
    fn test_song_created_invalidates_parent_album() {
        let keys = CacheKey::for_song_created(SongId::new(10), Some(AlbumId::new(1)));
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&CacheKey::album_detail(AlbumId::new(1))));

        let orphan = CacheKey::for_song_created(SongId::new(11), None);
        assert_eq!(orphan.len(), 2);
        assert!(!orphan.contains(&CacheKey::album_list()));
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(CacheKey::album_list().operation(), "album_list");
        assert!(CacheKey::song_detail(SongId::new(1)).is_detail());
        assert!(!CacheKey::song_list().is_detail());
    }

    fn key_strategy() -> impl Strategy<Value = CacheKey> {
        prop_oneof![
            Just(CacheKey::album_list()),
            Just(CacheKey::song_list()),
            any::<i32>().prop_map(|id| CacheKey::album_detail(AlbumId::new(id))),
            any::<i32>().prop_map(|id| CacheKey::song_detail(SongId::new(id))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: distinct query shapes never share a cache entry.
        #[test]
        fn prop_distinct_keys_encode_distinctly(a in key_strategy(), b in key_strategy()) {
            prop_assert_eq!(a == b, a.encode() == b.encode());
        }

        /// Property: every encoded key decodes back to the key that produced it.
        #[test]
        fn prop_decode_inverts_encode(key in key_strategy()) {
            prop_assert_eq!(CacheKey::decode(&key.encode()), Some(key));
        }

        /// Property: arbitrary text never decodes to a key with a different encoding.
        #[test]
        fn prop_decode_is_canonical(text in "[a-z:0-9-]{0,24}") {
            if let Some(key) = CacheKey::decode(&text) {
                prop_assert_eq!(key.encode(), text);
            }
        }
    }
}
