//! Main Musicdex client.

use crate::cache::{MemoryQueryCache, QueryCache};
use crate::error::{MusicdexError, Result};
use crate::mutation::{LegacyMembershipRoute, MembershipRoute};
use crate::playlist::PlaylistService;
use crate::query::QueryClient;
use crate::star::StarService;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::types::ClientConfig;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Entry point for playlist data.
///
/// Owns the transport, the shared query cache, and the login session, and
/// hands out service handles that read and mutate through them.
///
/// # Example
///
/// ```ignore
/// use musicdex_client::{ClientConfig, MusicdexClient};
///
/// let client = MusicdexClient::new(ClientConfig::with_token("https://holodex.net/api/v2", "token"))?;
///
/// let playlists = client.playlists().my_playlists().await?;
/// let first = client.playlists().playlist(&playlists[0].id).await?;
/// println!("{} songs in {}", first.content.len(), first.title);
/// ```
pub struct MusicdexClient {
    transport: Arc<dyn Transport>,
    queries: QueryClient,
    membership: Box<dyn MembershipRoute>,
    access_token: RwLock<Option<String>>,
}

impl MusicdexClient {
    /// Create a client over HTTP with an in-memory cache.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_parts(
            config.access_token,
            Arc::new(transport),
            Arc::new(MemoryQueryCache::new()),
        ))
    }

    /// Create a client from an explicit transport and cache.
    pub fn with_parts(
        access_token: Option<String>,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn QueryCache>,
    ) -> Self {
        Self {
            transport,
            queries: QueryClient::new(cache),
            membership: Box::new(LegacyMembershipRoute),
            access_token: RwLock::new(access_token),
        }
    }

    /// Replace how membership changes are sent to the server.
    pub fn with_membership_route(mut self, route: impl MembershipRoute + 'static) -> Self {
        self.membership = Box::new(route);
        self
    }

    /// Check if the client has an access token.
    pub async fn is_logged_in(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    /// Set the access token (e.g., after an external login).
    pub async fn set_token(&self, access_token: impl Into<String>) {
        *self.access_token.write().await = Some(access_token.into());
    }

    /// Clear the token and everything cached for the previous user.
    pub async fn logout(&self) {
        *self.access_token.write().await = None;
        self.queries.clear();
        info!("Logged out");
    }

    /// Playlist reads and mutations.
    pub fn playlists(&self) -> PlaylistService<'_> {
        PlaylistService::new(self)
    }

    /// Starred playlists.
    pub fn stars(&self) -> StarService<'_> {
        StarService::new(self)
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub(crate) fn membership_route(&self) -> &dyn MembershipRoute {
        self.membership.as_ref()
    }

    pub(crate) async fn require_login(&self) -> Result<()> {
        if self.is_logged_in().await {
            Ok(())
        } else {
            Err(MusicdexError::AuthRequired)
        }
    }

    /// Send a request with the session token and map error statuses.
    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let token = self.access_token.read().await.clone();
        self.transport
            .execute(request.bearer(token))
            .await?
            .error_for_status()
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        what: &str,
    ) -> Result<T> {
        self.send(request).await?.json(what)
    }
}
