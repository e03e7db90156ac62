//! Track records as returned by the search backend.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "id": 1440857781,
//!     "title": "So What",
//!     "artist": "Miles Davis",
//!     "albumArt": "https://example.com/art/100x100.jpg",
//!     "previewUrl": "https://example.com/preview.m4a"
//! }
//! ```
//!
//! Identifiers are opaque. Backends send them either as strings or as
//! integers; both are normalised to their string form so that comparison
//! is always by exact value.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use url::Url;

/// Opaque track identifier.
///
/// Two identifiers are equal only when their string values are equal.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrackId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl de::Visitor<'_> for IdVisitor {
            type Value = TrackId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer track id")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TrackId::from(value))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TrackId(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TrackId(value.to_string()))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TrackId(value.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// A playable search result.
///
/// Immutable once produced by the backend, except that the catalog may
/// re-key a colliding identifier when configured to do so.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub album_art: Url,
    pub preview_url: Url,
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.id, self.artist, self.title)
    }
}
