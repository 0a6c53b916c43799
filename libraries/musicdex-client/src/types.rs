//! Types for Musicdex API requests and responses.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Default path prefix of the Musicdex API on the server.
pub const DEFAULT_API_PREFIX: &str = "/musicdex";

/// Configuration for connecting to a Musicdex server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g., "https://holodex.net/api/v2")
    pub url: String,
    /// Path prefix of the Musicdex endpoints
    pub api_prefix: String,
    /// Current access token (if logged in)
    pub access_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    /// Create a new config with just the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            access_token: None,
            timeout_secs: 30,
        }
    }

    /// Create a config for a logged-in session.
    pub fn with_token(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::new(url)
        }
    }

    /// Override the API path prefix.
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }
}

// =============================================================================
// Playlist Types
// =============================================================================

/// A reference to a song inside a playlist.
///
/// Only `id` is interpreted; every other field the server sends is kept as-is.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SongRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SongRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

/// A full playlist, as returned by `GET /playlist/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaylistFull {
    pub id: String,
    pub title: String,
    /// Playlist kind, e.g. `"ugp"` for user playlists or `"radio/..."`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: Vec<SongRef>,
    /// Last modification time exactly as the server rendered it
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlaylistFull {
    pub fn is_radio(&self) -> bool {
        self.kind.starts_with("radio")
    }

    /// Song ids in playlist order.
    pub fn song_ids(&self) -> Vec<String> {
        self.content.iter().map(|song| song.id.clone()).collect()
    }

    /// Token sent as `If-Modified-Since` when revalidating this snapshot.
    ///
    /// The server compares it against its own column, so it is echoed verbatim.
    pub fn freshness_token(&self) -> &str {
        &self.updated_at
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }
}

/// Lightweight playlist projection used by the index and the starred list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaylistStub {
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub updated_at: String,
}

impl PlaylistStub {
    pub fn is_radio(&self) -> bool {
        self.kind.as_deref().is_some_and(|k| k.starts_with("radio"))
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.updated_at)
    }
}

/// Sort playlists newest-updated first.
///
/// Ties keep their server order; unreadable timestamps sort last.
pub fn sort_by_recency(playlists: &mut [PlaylistStub]) {
    playlists.sort_by_cached_key(|p| Reverse(p.last_updated()));
}

/// Parse a server timestamp: RFC 3339, or SQL style with a space separator
/// and a possibly hour-only offset (`2024-01-01 00:00:00.123+00`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

/// Mutation payload for `POST /playlist`.
///
/// A missing `id` creates a new playlist; otherwise the playlist is replaced.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WriteablePlaylist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
}

impl WriteablePlaylist {
    /// Payload for a brand new, empty playlist.
    pub fn new_titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(Vec::new()),
            ..Self::default()
        }
    }

    /// Payload carrying all of an existing playlist's metadata and content.
    pub fn from_playlist(playlist: &PlaylistFull) -> Self {
        Self {
            id: Some(playlist.id.clone()),
            title: Some(playlist.title.clone()),
            kind: (!playlist.kind.is_empty()).then(|| playlist.kind.clone()),
            description: playlist.description.clone(),
            content: Some(playlist.song_ids()),
        }
    }

    pub fn with_content(mut self, content: Vec<String>) -> Self {
        self.content = Some(content);
        self
    }
}

/// Add or remove a song from a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Add,
    Delete,
}

/// Star or unstar a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarAction {
    Add,
    Delete,
}

/// Request body for the star endpoints.
#[derive(Debug, Serialize)]
pub struct StarRequest<'a> {
    pub playlist_id: &'a str,
}

// =============================================================================
// Serde helpers
// =============================================================================

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<SongRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SongRef>>::deserialize(deserializer)?.unwrap_or_default())
}
