//! Keyed query cache shared by all services.
//!
//! Every cached value lives under a [`QueryKey`] together with its freshness
//! state and the fetches currently running for it. Invalidation keeps the value
//! (so it can still seed a conditional fetch) but marks it stale.

use crate::types::{PlaylistFull, PlaylistStub};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Address of one cached value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// A full playlist snapshot
    Playlist(String),
    /// Like-status vector of a playlist, aligned with its content
    PlaylistLike(String),
    /// Whether the current user likes a song
    SongLike(String),
    /// The caller's playlist index
    AllPlaylists,
    /// The caller's starred playlists
    StarredPlaylists,
}

impl QueryKey {
    pub fn playlist(id: impl Into<String>) -> Self {
        QueryKey::Playlist(id.into())
    }

    pub fn playlist_like(id: impl Into<String>) -> Self {
        QueryKey::PlaylistLike(id.into())
    }

    pub fn song_like(id: impl Into<String>) -> Self {
        QueryKey::SongLike(id.into())
    }

    /// Keys whose values derive from one playlist's content.
    pub fn playlist_group(id: &str) -> [QueryKey; 2] {
        [QueryKey::playlist(id), QueryKey::playlist_like(id)]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Playlist(id) => write!(f, "playlist:{}", id),
            QueryKey::PlaylistLike(id) => write!(f, "playlist-like:{}", id),
            QueryKey::SongLike(id) => write!(f, "song-like:{}", id),
            QueryKey::AllPlaylists => f.write_str("allPlaylists"),
            QueryKey::StarredPlaylists => f.write_str("starredPlaylists"),
        }
    }
}

/// A cached value.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Playlist(Arc<PlaylistFull>),
    Playlists(Arc<Vec<PlaylistStub>>),
    LikeStatus(Arc<Vec<bool>>),
    Liked(bool),
}

impl CachedValue {
    pub fn as_playlist(&self) -> Option<Arc<PlaylistFull>> {
        match self {
            CachedValue::Playlist(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    pub fn as_playlists(&self) -> Option<Arc<Vec<PlaylistStub>>> {
        match self {
            CachedValue::Playlists(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    pub fn as_like_status(&self) -> Option<Arc<Vec<bool>>> {
        match self {
            CachedValue::LikeStatus(v) => Some(Arc::clone(v)),
            _ => None,
        }
    }

    pub fn as_liked(&self) -> Option<bool> {
        match self {
            CachedValue::Liked(liked) => Some(*liked),
            _ => None,
        }
    }
}

/// A cached value with its freshness state.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CachedValue,
    /// When the value was last written
    pub updated_at: Instant,
    /// Set by invalidation; cleared by the next write
    pub stale: bool,
}

impl CacheEntry {
    /// Whether the entry may be served without refetching.
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.stale && self.updated_at.elapsed() < stale_time
    }
}

/// Registration of one running fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    id: u64,
    token: CancellationToken,
}

impl FetchTicket {
    /// Token cancelled when the fetch is superseded.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Process-wide keyed store for query results.
///
/// Implementations must be safe to share between tasks. The services only
/// depend on this trait, so any store can be injected.
pub trait QueryCache: Send + Sync {
    /// Current entry for `key`, stale or not. Expired entries are absent.
    fn get(&self, key: &QueryKey) -> Option<CacheEntry>;

    /// Write a fresh value, kept for `retention` after this write.
    fn set(&self, key: QueryKey, value: CachedValue, retention: Duration);

    /// Mark the entry stale so the next read refetches.
    fn invalidate(&self, key: &QueryKey);

    /// Cancel every fetch running for `key`. Their results will be discarded.
    fn cancel_inflight(&self, key: &QueryKey);

    /// Register a fetch for `key`.
    fn begin_fetch(&self, key: &QueryKey) -> FetchTicket;

    /// Store a fetch result. Returns `false` (and stores nothing) when the
    /// fetch was cancelled after it started.
    fn complete_fetch(
        &self,
        key: &QueryKey,
        ticket: &FetchTicket,
        value: CachedValue,
        retention: Duration,
    ) -> bool;

    /// Unregister a fetch that produced no value.
    fn abandon_fetch(&self, key: &QueryKey, ticket: &FetchTicket);

    /// Drop the entry and cancel its fetches.
    fn remove(&self, key: &QueryKey);

    /// Drop everything.
    fn clear(&self);
}

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Instant,
}

#[derive(Default)]
struct Slot {
    stored: Option<StoredEntry>,
    inflight: HashMap<u64, CancellationToken>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.stored.is_none() && self.inflight.is_empty()
    }

    fn cancel_all(&mut self) {
        for (_, token) in self.inflight.drain() {
            token.cancel();
        }
    }
}

/// In-memory [`QueryCache`].
#[derive(Default)]
pub struct MemoryQueryCache {
    slots: Mutex<HashMap<QueryKey, Slot>>,
    next_ticket: AtomicU64,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.stored.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(slot: &mut Slot, value: CachedValue, retention: Duration) {
        let now = Instant::now();
        slot.stored = Some(StoredEntry {
            entry: CacheEntry {
                value,
                updated_at: now,
                stale: false,
            },
            expires_at: now + retention,
        });
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        let mut slots = self.slots();
        let slot = slots.get_mut(key)?;

        if slot
            .stored
            .as_ref()
            .is_some_and(|s| s.expires_at <= Instant::now())
        {
            debug!(key = %key, "Cache entry expired");
            slot.stored = None;
        }

        let entry = slot.stored.as_ref().map(|s| s.entry.clone());
        if slot.is_empty() {
            slots.remove(key);
        }
        entry
    }

    fn set(&self, key: QueryKey, value: CachedValue, retention: Duration) {
        let mut slots = self.slots();
        Self::store(slots.entry(key).or_default(), value, retention);
    }

    fn invalidate(&self, key: &QueryKey) {
        if let Some(stored) = self
            .slots()
            .get_mut(key)
            .and_then(|slot| slot.stored.as_mut())
        {
            stored.entry.stale = true;
            debug!(key = %key, "Cache entry invalidated");
        }
    }

    fn cancel_inflight(&self, key: &QueryKey) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(key) {
            if !slot.inflight.is_empty() {
                debug!(key = %key, fetches = slot.inflight.len(), "Cancelling in-flight fetches");
            }
            slot.cancel_all();
            if slot.is_empty() {
                slots.remove(key);
            }
        }
    }

    fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
        let ticket = FetchTicket {
            id: self.next_ticket.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        self.slots()
            .entry(key.clone())
            .or_default()
            .inflight
            .insert(ticket.id, ticket.token.clone());
        ticket
    }

    fn complete_fetch(
        &self,
        key: &QueryKey,
        ticket: &FetchTicket,
        value: CachedValue,
        retention: Duration,
    ) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(key) else {
            return false;
        };
        if slot.inflight.remove(&ticket.id).is_none() {
            return false;
        }
        Self::store(slot, value, retention);
        true
    }

    fn abandon_fetch(&self, key: &QueryKey, ticket: &FetchTicket) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(key) {
            slot.inflight.remove(&ticket.id);
            if slot.is_empty() {
                slots.remove(key);
            }
        }
    }

    fn remove(&self, key: &QueryKey) {
        if let Some(mut slot) = self.slots().remove(key) {
            slot.cancel_all();
        }
    }

    fn clear(&self) {
        let mut slots = self.slots();
        for slot in slots.values_mut() {
            slot.cancel_all();
        }
        slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_key_display() {
        assert_eq!(QueryKey::playlist("p1").to_string(), "playlist:p1");
        assert_eq!(QueryKey::playlist_like("p1").to_string(), "playlist-like:p1");
        assert_eq!(QueryKey::AllPlaylists.to_string(), "allPlaylists");
    }

    #[tokio::test]
    async fn test_set_get_and_invalidate_keeps_value() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::song_like("s1");

        cache.set(key.clone(), CachedValue::Liked(true), HOUR);
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.value.as_liked(), Some(true));
        assert!(!entry.stale);
        assert!(entry.is_fresh(HOUR));
        assert!(!entry.is_fresh(Duration::ZERO));

        cache.invalidate(&key);
        let entry = cache.get(&key).unwrap();
        assert!(entry.stale);
        assert!(!entry.is_fresh(HOUR));
        assert_eq!(entry.value.as_liked(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_retention() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::AllPlaylists;

        cache.set(
            key.clone(),
            CachedValue::Playlists(Arc::new(Vec::new())),
            Duration::from_secs(60),
        );
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(&key).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_not_stored() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::playlist_like("p1");

        let ticket = cache.begin_fetch(&key);
        cache.cancel_inflight(&key);
        assert!(ticket.token().is_cancelled());

        let stored = cache.complete_fetch(
            &key,
            &ticket,
            CachedValue::LikeStatus(Arc::new(vec![true])),
            HOUR,
        );
        assert!(!stored);
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_completed_fetch_is_stored_once() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::playlist_like("p1");

        let ticket = cache.begin_fetch(&key);
        let value = CachedValue::LikeStatus(Arc::new(vec![true, false]));
        assert!(cache.complete_fetch(&key, &ticket, value.clone(), HOUR));
        assert!(!cache.complete_fetch(&key, &ticket, value, HOUR));

        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.value.as_like_status().unwrap().as_slice(), [true, false]);
    }

    #[tokio::test]
    async fn test_clear_cancels_everything() {
        let cache = MemoryQueryCache::new();
        cache.set(QueryKey::song_like("s1"), CachedValue::Liked(false), HOUR);
        let ticket = cache.begin_fetch(&QueryKey::StarredPlaylists);

        cache.clear();

        assert!(ticket.token().is_cancelled());
        assert!(cache.is_empty());
    }
}
