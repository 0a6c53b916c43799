//! Playlist mutations. Each one invalidates what it changed once the server
//! confirms it; none of them edit cached values in place.

use crate::cache::QueryKey;
use crate::error::{MusicdexError, Result};
use crate::playlist::PlaylistService;
use crate::transport::{segment, ApiRequest};
use crate::types::{MembershipAction, WriteablePlaylist};
use tracing::{debug, info, warn};

/// Builds the request that adds a song to or removes it from a playlist.
pub trait MembershipRoute: Send + Sync {
    fn request(&self, playlist_id: &str, song_id: &str, action: MembershipAction) -> ApiRequest;
}

/// The server's current membership endpoints.
///
/// Adding is a `GET` on the membership path, removing a `DELETE` on the same path.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyMembershipRoute;

impl MembershipRoute for LegacyMembershipRoute {
    fn request(&self, playlist_id: &str, song_id: &str, action: MembershipAction) -> ApiRequest {
        let path = format!("/playlist/{}/{}", segment(playlist_id), segment(song_id));
        match action {
            MembershipAction::Add => ApiRequest::get(path),
            MembershipAction::Delete => ApiRequest::delete(path),
        }
    }
}

impl PlaylistService<'_> {
    /// Create or replace a playlist.
    ///
    /// Returns the playlist as stored by the server.
    pub async fn write(&self, payload: &WriteablePlaylist) -> Result<WriteablePlaylist> {
        self.client.require_login().await?;

        let body =
            serde_json::to_value(payload).map_err(|e| MusicdexError::ParseError(e.to_string()))?;
        let response = self
            .client
            .send(ApiRequest::post("/playlist").json(body))
            .await?;

        // The write went through even if the echo is not a playlist object. A
        // replace can fall back to its payload; a create would lose its new id.
        let saved = match response.json::<WriteablePlaylist>("playlist write") {
            Ok(saved) => Ok(saved),
            Err(e) if payload.id.is_some() => {
                warn!(error = %e, playlist_id = ?payload.id, "Unreadable write response, keeping payload");
                Ok(payload.clone())
            }
            Err(e) => {
                warn!(error = %e, "Playlist created but its id could not be read");
                Err(e)
            }
        };

        let id = saved
            .as_ref()
            .ok()
            .and_then(|saved| saved.id.as_deref())
            .or(payload.id.as_deref());
        let mut keys = Vec::with_capacity(3);
        if let Some(id) = id {
            keys.extend(QueryKey::playlist_group(id));
        }
        keys.push(QueryKey::AllPlaylists);
        self.client.queries().invalidate_group(&keys);

        info!(playlist_id = ?id, created = payload.id.is_none(), "Playlist saved");
        saved
    }

    /// Add or remove one song.
    ///
    /// The playlist index is left alone since its entries don't list songs.
    pub async fn update_membership(
        &self,
        playlist_id: &str,
        song_id: &str,
        action: MembershipAction,
    ) -> Result<()> {
        self.client.require_login().await?;

        let request = self
            .client
            .membership_route()
            .request(playlist_id, song_id, action);
        self.client.send(request).await?;

        self.client
            .queries()
            .invalidate_group(&QueryKey::playlist_group(playlist_id));

        debug!(playlist_id = %playlist_id, song_id = %song_id, action = ?action, "Playlist membership updated");
        Ok(())
    }

    /// Append songs to the end of a playlist in one write.
    pub async fn append_songs(
        &self,
        playlist_id: &str,
        song_ids: &[String],
    ) -> Result<WriteablePlaylist> {
        self.client.require_login().await?;

        let current = self.playlist(playlist_id).await?;
        let mut content = current.song_ids();
        content.extend_from_slice(song_ids);

        let payload = WriteablePlaylist::from_playlist(&current).with_content(content);
        self.write(&payload).await
    }

    /// Delete a playlist.
    pub async fn delete(&self, playlist_id: &str) -> Result<()> {
        self.client.require_login().await?;

        let path = format!("/playlist/{}", segment(playlist_id));
        self.client.send(ApiRequest::delete(path)).await?;

        let [playlist, like] = QueryKey::playlist_group(playlist_id);
        self.client
            .queries()
            .invalidate_group(&[playlist, like, QueryKey::AllPlaylists]);

        info!(playlist_id = %playlist_id, "Playlist deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[test]
    fn test_legacy_route_methods() {
        let add = LegacyMembershipRoute.request("p1", "s 1", MembershipAction::Add);
        assert_eq!(add.method, Method::GET);
        assert_eq!(add.path, "/playlist/p1/s%201");
        assert!(add.body.is_none());

        let delete = LegacyMembershipRoute.request("p1", "s1", MembershipAction::Delete);
        assert_eq!(delete.method, Method::DELETE);
        assert_eq!(delete.path, "/playlist/p1/s1");
    }
}
