//! Playlist reads: single playlists with conditional revalidation, the
//! caller's playlist index, and the per-song like-status side cache.

use crate::cache::{CachedValue, QueryKey};
use crate::client::MusicdexClient;
use crate::error::{MusicdexError, Result};
use crate::query::{FetchConfig, DEFAULT_FETCH_CONFIG};
use crate::transport::{segment, ApiRequest};
use crate::types::{sort_by_recency, PlaylistFull, PlaylistStub};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Playlist operations of a [`MusicdexClient`].
pub struct PlaylistService<'a> {
    pub(crate) client: &'a MusicdexClient,
}

impl<'a> PlaylistService<'a> {
    pub(crate) fn new(client: &'a MusicdexClient) -> Self {
        Self { client }
    }

    /// Get a playlist with the default fetch configuration.
    pub async fn playlist(&self, playlist_id: &str) -> Result<Arc<PlaylistFull>> {
        self.playlist_with(playlist_id, DEFAULT_FETCH_CONFIG).await
    }

    /// Get a playlist.
    ///
    /// A cached snapshot is revalidated with `If-Modified-Since`; when the
    /// server reports no change the cached `Arc` itself is returned. Logged-in
    /// reads also refresh the like status of every song in the playlist.
    pub async fn playlist_with(
        &self,
        playlist_id: &str,
        config: FetchConfig,
    ) -> Result<Arc<PlaylistFull>> {
        let mut like_status = None;
        let fetched_likes = &mut like_status;

        let value = self
            .client
            .queries()
            .fetch(QueryKey::playlist(playlist_id), config, |cached| async move {
                let cached = cached.and_then(|value| value.as_playlist());
                let (playlist, likes) = self.read_playlist(playlist_id, cached).await?;
                *fetched_likes = likes;
                Ok(CachedValue::Playlist(playlist))
            })
            .await?;

        let playlist = value.as_playlist().ok_or_else(|| {
            MusicdexError::ParseError(format!("cache holds no playlist for {}", playlist_id))
        })?;

        // Only once the snapshot itself has been accepted into the cache.
        if let Some(likes) = like_status {
            self.merge_like_status(&playlist, likes, config.cache_time);
        }
        Ok(playlist)
    }

    /// Fetch or revalidate a playlist, plus its like flags when logged in.
    async fn read_playlist(
        &self,
        playlist_id: &str,
        cached: Option<Arc<PlaylistFull>>,
    ) -> Result<(Arc<PlaylistFull>, Option<Vec<bool>>)> {
        let logged_in = self.client.is_logged_in().await;

        let Some(cached) = cached else {
            if !logged_in {
                let playlist = self.fetch_playlist(playlist_id).await?;
                return Ok((Arc::new(playlist), None));
            }

            let (playlist, like_status) = tokio::try_join!(
                self.fetch_playlist(playlist_id),
                self.fetch_like_status(playlist_id)
            )?;
            return Ok((Arc::new(playlist), Some(like_status)));
        };

        let token = cached.freshness_token().to_owned();
        if !logged_in {
            let fresh = self.fetch_playlist_if_modified(playlist_id, &token).await?;
            return Ok((fresh.map_or(cached, Arc::new), None));
        }

        let (fresh, like_status) = tokio::try_join!(
            self.fetch_playlist_if_modified(playlist_id, &token),
            self.fetch_like_status(playlist_id)
        )?;
        Ok((fresh.map_or(cached, Arc::new), Some(like_status)))
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> Result<PlaylistFull> {
        let path = format!("/playlist/{}", segment(playlist_id));
        debug!(playlist_id = %playlist_id, "Fetching playlist");

        self.client
            .send(ApiRequest::get(path))
            .await?
            .json_if_modified("playlist")?
            .ok_or_else(|| {
                MusicdexError::ParseError(format!("empty playlist body for {}", playlist_id))
            })
    }

    async fn fetch_playlist_if_modified(
        &self,
        playlist_id: &str,
        since: &str,
    ) -> Result<Option<PlaylistFull>> {
        let path = format!("/playlist/{}", segment(playlist_id));
        debug!(playlist_id = %playlist_id, since = %since, "Revalidating playlist");

        let fresh = self
            .client
            .send(ApiRequest::get(path).if_modified_since(since))
            .await?
            .json_if_modified("playlist")?;

        if fresh.is_none() {
            debug!(playlist_id = %playlist_id, "Playlist not modified");
        }
        Ok(fresh)
    }

    async fn fetch_like_status(&self, playlist_id: &str) -> Result<Vec<bool>> {
        let path = format!("/playlist/{}/likeCheck", segment(playlist_id));
        self.client
            .send_json(ApiRequest::get(path), "like status")
            .await
    }

    /// Spread a like-status vector over the playlist's songs by position.
    ///
    /// A vector whose length differs from the content is dropped entirely, and
    /// so is one whose playlist snapshot is no longer the current cache entry.
    fn merge_like_status(
        &self,
        playlist: &Arc<PlaylistFull>,
        like_status: Vec<bool>,
        retention: Duration,
    ) {
        let cache = self.client.queries().cache();

        let current = cache.get(&QueryKey::playlist(&playlist.id)).is_some_and(|entry| {
            !entry.stale
                && entry
                    .value
                    .as_playlist()
                    .is_some_and(|cached| Arc::ptr_eq(&cached, playlist))
        });
        if !current {
            debug!(playlist_id = %playlist.id, "Playlist invalidated during read, skipping like merge");
            return;
        }

        if like_status.len() != playlist.content.len() {
            debug!(
                playlist_id = %playlist.id,
                songs = playlist.content.len(),
                flags = like_status.len(),
                "Like status does not line up with content, skipping merge"
            );
            return;
        }

        for (song, liked) in playlist.content.iter().zip(&like_status) {
            cache.set(QueryKey::song_like(&song.id), CachedValue::Liked(*liked), retention);
        }
        cache.set(
            QueryKey::playlist_like(&playlist.id),
            CachedValue::LikeStatus(Arc::new(like_status)),
            retention,
        );
    }

    /// The caller's playlists, newest-updated first.
    pub async fn my_playlists(&self) -> Result<Arc<Vec<PlaylistStub>>> {
        self.my_playlists_with(DEFAULT_FETCH_CONFIG).await
    }

    /// The caller's playlists, newest-updated first. Empty when logged out.
    pub async fn my_playlists_with(&self, config: FetchConfig) -> Result<Arc<Vec<PlaylistStub>>> {
        if !self.client.is_logged_in().await {
            return Ok(Arc::new(Vec::new()));
        }

        let value = self
            .client
            .queries()
            .fetch(QueryKey::AllPlaylists, config, |_| async {
                let mut playlists: Vec<PlaylistStub> = self
                    .client
                    .send_json(ApiRequest::get("/playlist/"), "playlist list")
                    .await?;
                sort_by_recency(&mut playlists);

                debug!(playlists = playlists.len(), "Fetched playlist index");
                Ok(CachedValue::Playlists(Arc::new(playlists)))
            })
            .await?;

        value
            .as_playlists()
            .ok_or_else(|| MusicdexError::ParseError("cache holds no playlist index".into()))
    }

    /// Cached snapshot of a playlist, if any, without touching the network.
    pub fn cached_playlist(&self, playlist_id: &str) -> Option<Arc<PlaylistFull>> {
        self.client
            .queries()
            .peek(&QueryKey::playlist(playlist_id))
            .and_then(|value| value.as_playlist())
    }

    /// Whether the current user likes a song, as last seen in a playlist read.
    pub fn song_like_status(&self, song_id: &str) -> Option<bool> {
        self.client
            .queries()
            .peek(&QueryKey::song_like(song_id))
            .and_then(|value| value.as_liked())
    }

    /// Like flags of a playlist, aligned with its content.
    pub fn cached_like_status(&self, playlist_id: &str) -> Option<Arc<Vec<bool>>> {
        self.client
            .queries()
            .peek(&QueryKey::playlist_like(playlist_id))
            .and_then(|value| value.as_like_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientConfig;

    const RETENTION: Duration = Duration::from_secs(60);

    fn client() -> MusicdexClient {
        MusicdexClient::new(ClientConfig::new("https://example.com")).unwrap()
    }

    fn playlist(id: &str, songs: &[&str]) -> Arc<PlaylistFull> {
        let content: Vec<_> = songs.iter().map(|s| serde_json::json!({ "id": s })).collect();
        Arc::new(
            serde_json::from_value(serde_json::json!({
                "id": id,
                "title": "Mix",
                "content": content,
                "updated_at": "2024-01-01T00:00:00Z"
            }))
            .unwrap(),
        )
    }

    fn cache_snapshot(client: &MusicdexClient, playlist: &Arc<PlaylistFull>) {
        client.queries().cache().set(
            QueryKey::playlist(&playlist.id),
            CachedValue::Playlist(Arc::clone(playlist)),
            RETENTION,
        );
    }

    #[tokio::test]
    async fn test_merge_fills_song_and_playlist_keys() {
        let client = client();
        let service = client.playlists();
        let p1 = playlist("p1", &["s1", "s2"]);
        cache_snapshot(&client, &p1);

        service.merge_like_status(&p1, vec![true, false], RETENTION);

        assert_eq!(service.song_like_status("s1"), Some(true));
        assert_eq!(service.song_like_status("s2"), Some(false));
        assert_eq!(service.cached_like_status("p1").unwrap().as_slice(), [true, false]);
    }

    #[tokio::test]
    async fn test_merge_skipped_once_playlist_invalidated() {
        let client = client();
        let service = client.playlists();
        let p1 = playlist("p1", &["s1"]);
        cache_snapshot(&client, &p1);

        client
            .queries()
            .invalidate_group(&QueryKey::playlist_group("p1"));
        service.merge_like_status(&p1, vec![true], RETENTION);

        assert!(service.song_like_status("s1").is_none());
        assert!(service.cached_like_status("p1").is_none());
    }

    #[tokio::test]
    async fn test_merge_skipped_for_superseded_snapshot() {
        let client = client();
        let service = client.playlists();
        let old = playlist("p1", &["s1"]);
        cache_snapshot(&client, &playlist("p1", &["s1"]));

        service.merge_like_status(&old, vec![true], RETENTION);

        assert!(service.song_like_status("s1").is_none());
    }
}
