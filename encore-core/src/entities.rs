//! Core entity structures

use crate::error::ValidationError;
use crate::identity::{AlbumId, SongId, Timestamp};
use serde::{Deserialize, Serialize};

/// Column width shared by every `VARCHAR(255)` field in the catalog schema.
pub const MAX_FIELD_LEN: usize = 255;

/// Album - a titled collection of songs.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub description: String,
    /// URI of the album artwork.
    pub thumbnail: String,
    pub created_at: Timestamp,
}

/// Song - a playable track, optionally attached to an album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    /// URI of the audio file.
    pub audio: String,
    /// Weak reference. Cleared (not cascaded) when the album is deleted.
    pub album_id: Option<AlbumId>,
    pub created_at: Timestamp,
}

/// Album detail projection: the album plus every song that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumWithSongs {
    pub songs: Vec<Song>,
    pub album: Album,
}

/// Result of an id-keyed catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "lookup", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Returns true if the lookup matched a row.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns true if no row matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Convert into an `Option`, dropping the distinction from other absences.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    /// Map the found value.
    pub fn map<U, F>(self, f: F) -> Lookup<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::NotFound => Lookup::NotFound,
        }
    }

    /// Get a reference to the found value.
    pub fn as_ref(&self) -> Lookup<&T> {
        match self {
            Self::Found(value) => Lookup::Found(value),
            Self::NotFound => Lookup::NotFound,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Found(v),
            None => Self::NotFound,
        }
    }
}

/// Payload for creating an album. Media is already hosted; only URIs travel here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlbum {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
}

/// Payload for creating a song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub audio: String,
    /// Album the song belongs to. Must exist at insert time.
    #[serde(alias = "album")]
    pub album_id: AlbumId,
}

impl NewAlbum {
    /// Check the payload against the column constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("thumbnail", &self.thumbnail)?;
        Ok(())
    }
}

impl NewSong {
    /// Check the payload against the column constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("audio", &self.audio)?;
        if let Some(thumbnail) = &self.thumbnail {
            check_len("thumbnail", thumbnail)?;
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    check_len(field, value)
}

fn check_len(field: &str, value: &str) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > MAX_FIELD_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_FIELD_LEN,
            actual: len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CatalogId;
    use chrono::Utc;

    fn new_song() -> NewSong {
        NewSong {
            title: "Intro".to_string(),
            description: "Opening track".to_string(),
            thumbnail: None,
            audio: "https://cdn.example.com/intro.mp3".to_string(),
            album_id: AlbumId::new(1),
        }
    }

    #[test]
    fn test_lookup_conversions() {
        let found: Lookup<i32> = Some(3).into();
        assert!(found.is_found());
        assert_eq!(found.clone().map(|v| v * 2), Lookup::Found(6));
        assert_eq!(found.into_option(), Some(3));

        let missing: Lookup<i32> = None.into();
        assert!(missing.is_not_found());
        assert_eq!(missing.into_option(), None);
    }

    #[test]
    fn test_new_album_requires_title() {
        let album = NewAlbum {
            title: "  ".to_string(),
            description: "d".to_string(),
            thumbnail: "t".to_string(),
        };
        assert!(matches!(
            album.validate(),
            Err(ValidationError::RequiredFieldMissing { field }) if field == "title"
        ));
    }

    #[test]
    fn test_new_song_rejects_overlong_fields() {
        let mut song = new_song();
        assert!(song.validate().is_ok());

        song.thumbnail = Some("x".repeat(MAX_FIELD_LEN + 1));
        assert!(matches!(
            song.validate(),
            Err(ValidationError::TooLong { max: MAX_FIELD_LEN, .. })
        ));
    }

    #[test]
    fn test_new_song_accepts_legacy_album_field() -> Result<(), serde_json::Error> {
        let song: NewSong = serde_json::from_str(
            r#"{"title":"a","description":"b","audio":"c","album":5}"#,
        )?;
        assert_eq!(song.album_id, AlbumId::new(5));
        assert_eq!(song.thumbnail, None);
        Ok(())
    }

    #[test]
    fn test_album_with_songs_json_shape() -> Result<(), serde_json::Error> {
        let detail = AlbumWithSongs {
            songs: vec![],
            album: Album {
                id: AlbumId::new(1),
                title: "A".to_string(),
                description: "d".to_string(),
                thumbnail: "t".to_string(),
                created_at: Utc::now(),
            },
        };
        let value = serde_json::to_value(&detail)?;
        assert!(value["songs"].as_array().is_some_and(|s| s.is_empty()));
        assert_eq!(value["album"]["id"], 1);
        Ok(())
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_title_validation_tracks_column_width(title in "\\PC{0,300}") {
                let album = NewAlbum {
                    title: title.clone(),
                    description: "d".to_string(),
                    thumbnail: "t".to_string(),
                };
                let expected_ok =
                    !title.trim().is_empty() && title.chars().count() <= MAX_FIELD_LEN;
                prop_assert_eq!(album.validate().is_ok(), expected_ok);
            }
        }
    }
}
