use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3u_catalog::{
    config::{Config, EpgPurgeMode, HourCorrectionMode},
    database::Database,
    export::PlaylistGenerator,
    ingestor::{EpgIngestor, IngestionStateManager, LifecycleSweeper, M3uIngestor},
    models::*,
};

#[derive(Parser)]
#[command(name = "m3u-catalog")]
#[command(version)]
#[command(about = "Import M3U playlists and XMLTV guides into a local station catalog")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "m3u-catalog.toml")]
    config: PathBuf,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an extended M3U playlist
    ImportM3u {
        file: PathBuf,
        /// Refresh stations matched by URL
        #[arg(long, conflicts_with = "no_overwrite")]
        overwrite: bool,
        /// Keep stations matched by URL as they are
        #[arg(long)]
        no_overwrite: bool,
        /// Delete stations missing from the playlist after a completed import
        #[arg(long)]
        remove_obsolete: bool,
    },
    /// Import an XMLTV program guide
    ImportEpg {
        file: PathBuf,
        /// Hours added to every start and stop time
        #[arg(long, allow_hyphen_values = true)]
        hour_correction: Option<i32>,
        /// in_place or carry
        #[arg(long)]
        hour_correction_mode: Option<HourCorrectionMode>,
        /// Programs removed before importing: none, all or elapsed
        #[arg(long)]
        purge: Option<EpgPurgeMode>,
    },
    /// List stations
    Stations {
        #[arg(long, default_value = "")]
        group: String,
        #[arg(long, default_value = "")]
        name: String,
        /// new, confirmed or obsolete
        #[arg(long)]
        state: Option<StationState>,
        /// Only stations in favorite groups
        #[arg(long)]
        favorite_groups: bool,
    },
    /// List groups
    Groups,
    /// List playlists
    Playlists,
    /// Show the stations of a playlist
    Playlist {
        name: String,
        /// Station name filter
        #[arg(long = "name", default_value = "")]
        station: String,
        /// Only stations with guide data
        #[arg(long)]
        epg_only: bool,
        /// Only favorite items
        #[arg(long)]
        favorites: bool,
    },
    /// Create an empty playlist
    CreatePlaylist {
        name: String,
        /// tv, radio or movie
        #[arg(long, default_value = "unset")]
        kind: PlaylistKind,
    },
    /// Delete a playlist and its items
    DeletePlaylist { name: String },
    /// Write a playlist as extended M3U
    Export {
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show what is airing on a guide channel
    NowAiring { channel: String },
    /// Catalog statistics
    Stats,
    /// Delete stations left obsolete by the last import
    RemoveObsolete,
}

#[derive(Serialize)]
struct Stats {
    stations: StateCounts,
    groups: usize,
    playlists: usize,
    programs: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("m3u_catalog={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    debug!("Configuration loaded from: {}", cli.config.display());

    if let Some(database_url) = cli.database_url.clone() {
        config.database.url = database_url;
    }

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    debug!("Using catalog: {}", config.database.url);

    let result = run(cli, config, database.clone()).await;
    database.close().await;
    result
}

async fn run(cli: Cli, mut config: Config, database: Database) -> Result<()> {
    let json = cli.json;

    match cli.command {
        Command::ImportM3u {
            file,
            overwrite,
            no_overwrite,
            remove_obsolete,
        } => {
            if overwrite {
                config.ingestion.overwrite_on_match = true;
            } else if no_overwrite {
                config.ingestion.overwrite_on_match = false;
            }

            let state_manager = watch_session(IngestionStateManager::new());
            let ingestor = M3uIngestor::new(database.clone(), state_manager, config.ingestion);

            let file = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let mut reader = tokio::io::BufReader::new(file);
            let summary = ingestor.ingest(&mut reader).await?;

            let mut removed = None;
            if remove_obsolete {
                if summary.outcome == ImportOutcome::Completed {
                    removed = Some(LifecycleSweeper::new(database).purge().await?);
                } else {
                    warn!("Import was cancelled; obsolete stations are kept");
                }
            }

            print_output(json, &summary, || {
                println!(
                    "{:?}: {} of {} records, {} new, {} confirmed, {} failed, {} skipped lines",
                    summary.outcome,
                    summary.processed,
                    summary.total_records,
                    summary.created,
                    summary.confirmed,
                    summary.failed,
                    summary.skipped_lines
                );
                println!(
                    "Stations: {} new, {} confirmed, {} obsolete",
                    summary.state_counts.new,
                    summary.state_counts.confirmed,
                    summary.state_counts.obsolete
                );
                if let Some(removed) = removed {
                    println!("Removed {} obsolete stations", removed);
                }
            })?;
        }
        Command::ImportEpg {
            file,
            hour_correction,
            hour_correction_mode,
            purge,
        } => {
            if let Some(hours) = hour_correction {
                config.epg.hour_correction = hours;
            }
            if let Some(mode) = hour_correction_mode {
                config.epg.hour_correction_mode = mode;
            }
            if let Some(purge) = purge {
                config.epg.purge = purge;
            }

            let state_manager = watch_session(IngestionStateManager::new());
            let ingestor = EpgIngestor::new(database, state_manager, config.epg);

            let file = std::fs::File::open(&file)
                .with_context(|| format!("opening {}", file.display()))?;
            let summary = ingestor.ingest(std::io::BufReader::new(file)).await?;

            print_output(json, &summary, || {
                println!(
                    "{:?}: {} programmes, {} inserted, {} already present, {} failed, {} purged",
                    summary.outcome,
                    summary.processed,
                    summary.inserted,
                    summary.duplicates,
                    summary.failed,
                    summary.purged
                );
            })?;
        }
        Command::Stations {
            group,
            name,
            state,
            favorite_groups,
        } => {
            let stations = database
                .list_stations(&StationQuery {
                    group_title: group,
                    name,
                    state,
                    favorite_groups_only: favorite_groups,
                })
                .await?;

            print_output(json, &stations, || {
                for listing in &stations {
                    println!(
                        "{:>6}  {:<10} {:<24} {:<32} {}",
                        listing.station.id,
                        listing.station.state.as_str(),
                        listing.group_title,
                        listing.station.name,
                        listing.station.url
                    );
                }
            })?;
        }
        Command::Groups => {
            let groups = database.list_groups().await?;
            print_output(json, &groups, || {
                for group in &groups {
                    println!(
                        "{:>6}  {}{}",
                        group.id,
                        group.title,
                        if group.favorite { " *" } else { "" }
                    );
                }
            })?;
        }
        Command::Playlists => {
            let playlists = database.list_playlists().await?;
            print_output(json, &playlists, || {
                for playlist in &playlists {
                    println!(
                        "{:>6}  {:<8} {}{}",
                        playlist.id,
                        format!("{:?}", playlist.kind).to_lowercase(),
                        playlist.name,
                        if playlist.favorite { " *" } else { "" }
                    );
                }
            })?;
        }
        Command::Playlist {
            name,
            station,
            epg_only,
            favorites,
        } => {
            let playlist = find_playlist(&database, &name).await?;
            let entries = database
                .list_playlist_items(&PlaylistItemQuery {
                    playlist_id: playlist.id,
                    name: station,
                    epg_only,
                    favorites_only: favorites,
                })
                .await?;

            print_output(json, &entries, || {
                for entry in &entries {
                    println!(
                        "{:>6}  {:<32} {:<16} {}",
                        entry.position, entry.name, entry.epg_channel_id, entry.url
                    );
                }
            })?;
        }
        Command::CreatePlaylist { name, kind } => {
            let playlist = database.create_playlist(&name, kind).await?;
            print_output(json, &playlist, || {
                println!("Created playlist '{}' ({})", playlist.name, playlist.id);
            })?;
        }
        Command::DeletePlaylist { name } => {
            let playlist = find_playlist(&database, &name).await?;
            database.delete_playlist(playlist.id).await?;
            print_output(json, &playlist, || {
                println!("Deleted playlist '{}'", playlist.name);
            })?;
        }
        Command::Export { name, output } => {
            let playlist = find_playlist(&database, &name).await?;
            let generator = PlaylistGenerator::new(database);
            match output {
                Some(path) => {
                    let path = generator.save_m3u_file(playlist.id, &path).await?;
                    info!("Wrote playlist '{}' to {}", playlist.name, path.display());
                }
                None => print!("{}", generator.generate(playlist.id).await?),
            }
        }
        Command::NowAiring { channel } => {
            let programs = database
                .programs_airing(&channel, Local::now().naive_local())
                .await?;
            print_output(json, &programs, || {
                for program in &programs {
                    println!("{} - {}  {}", program.start, program.stop, program.title);
                }
            })?;
        }
        Command::Stats => {
            let stats = Stats {
                stations: database.count_stations_by_state().await?,
                groups: database.list_groups().await?.len(),
                playlists: database.list_playlists().await?.len(),
                programs: database.count_programs().await?,
            };
            print_output(json, &stats, || {
                println!(
                    "Stations:  {} ({} new, {} confirmed, {} obsolete)",
                    stats.stations.total(),
                    stats.stations.new,
                    stats.stations.confirmed,
                    stats.stations.obsolete
                );
                println!("Groups:    {}", stats.groups);
                println!("Playlists: {}", stats.playlists);
                println!("Programs:  {}", stats.programs);
            })?;
        }
        Command::RemoveObsolete => {
            let removed = LifecycleSweeper::new(database).purge().await?;
            print_output(json, &removed, || {
                println!("Removed {} obsolete stations", removed);
            })?;
        }
    }

    Ok(())
}

async fn find_playlist(database: &Database, name: &str) -> Result<Playlist> {
    match database.get_playlist_by_name(name).await? {
        Some(playlist) => Ok(playlist),
        None => bail!("playlist '{}' not found", name),
    }
}

/// Cancel the session on Ctrl-C and log its progress updates
fn watch_session(state_manager: IngestionStateManager) -> IngestionStateManager {
    let handle = state_manager.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling import");
            handle.cancel();
        }
    });

    let mut progress_rx = state_manager.subscribe();
    tokio::spawn(async move {
        while let Ok(progress) = progress_rx.recv().await {
            match progress.progress.percentage {
                Some(percentage) => info!(
                    "[{}] {:?}: {} ({:.0}%)",
                    progress.kind, progress.state, progress.progress.current_step, percentage
                ),
                None => info!(
                    "[{}] {:?}: {}",
                    progress.kind, progress.state, progress.progress.current_step
                ),
            }
        }
    });

    state_manager
}

fn print_output<T: Serialize>(json: bool, value: &T, plain: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain();
    }
    Ok(())
}
