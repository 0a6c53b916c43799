//! Starred (favorite) playlists.

use crate::cache::{CachedValue, QueryKey};
use crate::client::MusicdexClient;
use crate::error::{MusicdexError, Result};
use crate::query::STARRED_FETCH_CONFIG;
use crate::transport::ApiRequest;
use crate::types::{PlaylistStub, StarAction, StarRequest};
use std::sync::Arc;
use tracing::{debug, info};

/// Star operations of a [`MusicdexClient`].
pub struct StarService<'a> {
    client: &'a MusicdexClient,
}

impl<'a> StarService<'a> {
    pub(crate) fn new(client: &'a MusicdexClient) -> Self {
        Self { client }
    }

    /// Playlists the caller has starred. Empty when logged out.
    pub async fn starred_playlists(&self) -> Result<Arc<Vec<PlaylistStub>>> {
        if !self.client.is_logged_in().await {
            return Ok(Arc::new(Vec::new()));
        }

        let value = self
            .client
            .queries()
            .fetch(QueryKey::StarredPlaylists, STARRED_FETCH_CONFIG, |_| async {
                let starred: Vec<PlaylistStub> = self
                    .client
                    .send_json(ApiRequest::get("/star/"), "starred playlists")
                    .await?;

                debug!(starred = starred.len(), "Fetched starred playlists");
                Ok(CachedValue::Playlists(Arc::new(starred)))
            })
            .await?;

        value
            .as_playlists()
            .ok_or_else(|| MusicdexError::ParseError("cache holds no starred list".into()))
    }

    pub async fn is_starred(&self, playlist_id: &str) -> Result<bool> {
        Ok(self
            .starred_playlists()
            .await?
            .iter()
            .any(|p| p.id == playlist_id))
    }

    /// Star or unstar a playlist.
    pub async fn update_star(&self, playlist_id: &str, action: StarAction) -> Result<()> {
        self.client.require_login().await?;

        let body = serde_json::to_value(StarRequest { playlist_id })
            .map_err(|e| MusicdexError::ParseError(e.to_string()))?;
        let request = match action {
            StarAction::Add => ApiRequest::post("/star/"),
            StarAction::Delete => ApiRequest::delete("/star/"),
        };
        self.client.send(request.json(body)).await?;

        self.client
            .queries()
            .invalidate_group(&[QueryKey::StarredPlaylists]);

        info!(playlist_id = %playlist_id, action = ?action, "Star updated");
        Ok(())
    }
}
