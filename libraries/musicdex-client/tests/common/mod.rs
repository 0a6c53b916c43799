//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use musicdex_client::{ClientConfig, MusicdexClient};
use std::sync::Once;
use wiremock::MockServer;

static INIT: Once = Once::new();

pub const TOKEN: &str = "token";
pub const AUTH_HEADER: &str = "Bearer token";

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Client pointed at the mock server, logged in.
pub fn logged_in(server: &MockServer) -> MusicdexClient {
    init_tracing();
    MusicdexClient::new(ClientConfig::with_token(server.uri(), TOKEN)).unwrap()
}

/// Client pointed at the mock server, logged out.
pub fn anonymous(server: &MockServer) -> MusicdexClient {
    init_tracing();
    MusicdexClient::new(ClientConfig::new(server.uri())).unwrap()
}

/// Full playlist body with the given songs.
pub fn playlist_json(id: &str, songs: &[&str], updated_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": format!("Playlist {}", id),
        "type": "ugp",
        "owner": "42",
        "content": songs
            .iter()
            .map(|song| serde_json::json!({ "id": song, "name": format!("Song {}", song) }))
            .collect::<Vec<_>>(),
        "updated_at": updated_at
    })
}

pub fn stub_json(id: &str, updated_at: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "title": format!("Playlist {}", id),
        "updated_at": updated_at
    })
}

/// Number of requests the server saw for `path`.
pub async fn requests_to(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == path)
        .count()
}

/// Number of requests the server saw in total.
pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}
