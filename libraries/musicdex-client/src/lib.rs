//! Musicdex Client
//!
//! Fetch, cache, and invalidation layer for Musicdex playlists.
//!
//! # Features
//!
//! - **Playlists**: conditional (`If-Modified-Since`) revalidation of cached
//!   playlists, with like status fetched alongside for logged-in users
//! - **Index**: the caller's playlists, sorted newest-updated first
//! - **Mutations**: create/replace, add/remove songs, delete; each invalidates
//!   the cache entries it affects
//! - **Stars**: starred playlists with day-long caching
//!
//! # Example
//!
//! ```ignore
//! use musicdex_client::{ClientConfig, MembershipAction, MusicdexClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::with_token("https://holodex.net/api/v2", "token");
//!     let client = MusicdexClient::new(config)?;
//!
//!     let playlists = client.playlists().my_playlists().await?;
//!     let first = &playlists[0];
//!
//!     client
//!         .playlists()
//!         .update_membership(&first.id, "song-id", MembershipAction::Add)
//!         .await?;
//!
//!     // Revalidated against the server since the add invalidated it.
//!     let playlist = client.playlists().playlist(&first.id).await?;
//!     println!("{} now has {} songs", playlist.title, playlist.content.len());
//!
//!     Ok(())
//! }
//! ```

mod cache;
mod client;
mod error;
mod mutation;
mod playlist;
mod query;
mod star;
mod transport;
mod types;

pub use cache::{CacheEntry, CachedValue, FetchTicket, MemoryQueryCache, QueryCache, QueryKey};
pub use client::MusicdexClient;
pub use error::{MusicdexError, Result};
pub use mutation::{LegacyMembershipRoute, MembershipRoute};
pub use playlist::PlaylistService;
pub use query::{FetchConfig, QueryClient, DEFAULT_FETCH_CONFIG, STARRED_FETCH_CONFIG};
pub use star::StarService;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
pub use types::{
    parse_timestamp, sort_by_recency, ClientConfig, MembershipAction, PlaylistFull, PlaylistStub, SongRef,
    StarAction, StarRequest, WriteablePlaylist, DEFAULT_API_PREFIX,
};
