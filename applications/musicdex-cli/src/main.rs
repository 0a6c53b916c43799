/// Musicdex CLI - playlist management from the terminal
use anyhow::Context;
use clap::{Parser, Subcommand};
use musicdex_client::{MembershipAction, MusicdexClient, StarAction, WriteablePlaylist};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "musicdex")]
#[command(about = "Browse and edit Musicdex playlists", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Playlist operations
    #[command(subcommand)]
    Playlist(PlaylistCommand),
    /// Starred playlist operations
    #[command(subcommand)]
    Star(StarCommand),
}

#[derive(Subcommand)]
enum PlaylistCommand {
    /// Show one playlist
    Show { id: String },
    /// List your playlists, newest first
    List,
    /// Create a playlist
    Create {
        /// Playlist title
        #[arg(short, long)]
        title: String,
        /// Initial song ids
        songs: Vec<String>,
    },
    /// Add a song to a playlist
    Add { id: String, song: String },
    /// Append several songs in one write
    Append {
        id: String,
        #[arg(required = true)]
        songs: Vec<String>,
    },
    /// Remove a song from a playlist
    Remove { id: String, song: String },
    /// Delete a playlist
    Delete { id: String },
}

#[derive(Subcommand)]
enum StarCommand {
    /// List starred playlists
    List,
    /// Star a playlist
    Add { id: String },
    /// Unstar a playlist
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "musicdex_cli=info,musicdex_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref())?;
    config.validate()?;
    tracing::debug!(url = %config.server.url, "Configuration loaded");

    let client = MusicdexClient::new(config.client_config())
        .context("Failed to create Musicdex client")?;

    match cli.command {
        Commands::Playlist(command) => run_playlist(&client, command).await,
        Commands::Star(command) => run_star(&client, command).await,
    }
}

async fn run_playlist(client: &MusicdexClient, command: PlaylistCommand) -> anyhow::Result<()> {
    let playlists = client.playlists();

    match command {
        PlaylistCommand::Show { id } => {
            let playlist = playlists.playlist(&id).await?;
            print_json(&*playlist)?;
        }
        PlaylistCommand::List => {
            let index = playlists.my_playlists().await?;
            if index.is_empty() && !client.is_logged_in().await {
                tracing::warn!("Not logged in; set MUSICDEX_AUTH__ACCESS_TOKEN to list playlists");
            }
            print_json(&*index)?;
        }
        PlaylistCommand::Create { title, songs } => {
            let payload = WriteablePlaylist::new_titled(title).with_content(songs);
            let saved = playlists.write(&payload).await?;
            print_json(&saved)?;
        }
        PlaylistCommand::Add { id, song } => {
            playlists
                .update_membership(&id, &song, MembershipAction::Add)
                .await?;
            tracing::info!("Added {} to {}", song, id);
        }
        PlaylistCommand::Append { id, songs } => {
            let saved = playlists.append_songs(&id, &songs).await?;
            print_json(&saved)?;
        }
        PlaylistCommand::Remove { id, song } => {
            playlists
                .update_membership(&id, &song, MembershipAction::Delete)
                .await?;
            tracing::info!("Removed {} from {}", song, id);
        }
        PlaylistCommand::Delete { id } => {
            playlists.delete(&id).await?;
            tracing::info!("Deleted playlist {}", id);
        }
    }

    Ok(())
}

async fn run_star(client: &MusicdexClient, command: StarCommand) -> anyhow::Result<()> {
    let stars = client.stars();

    match command {
        StarCommand::List => print_json(&*stars.starred_playlists().await?)?,
        StarCommand::Add { id } => {
            stars.update_star(&id, StarAction::Add).await?;
            tracing::info!("Starred {}", id);
        }
        StarCommand::Remove { id } => {
            stars.update_star(&id, StarAction::Delete).await?;
            tracing::info!("Unstarred {}", id);
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
