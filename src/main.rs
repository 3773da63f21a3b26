use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seonchak::config::Config;
use seonchak::directory::{MemoryMemberDirectory, MemoryRoomDirectory};
use seonchak::drain::DrainScheduler;
use seonchak::models::{EventRoom, Member, RoomId};
use seonchak::server::ParticipationServer;
use seonchak::service::{Backends, ParticipationService};
use seonchak::{broadcast, metrics};

#[derive(Parser)]
#[command(
    name = "seonchak",
    version,
    about = "First-come event participation service with distributed rank assignment",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the participation API server with the drain scheduler
    Serve {
        /// JSON file seeding rooms and members into the lookup directories
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Use in-process backends instead of Redis (single-process dry-run)
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Run a single drain cycle against the configured backends
    Drain,

    /// Simulate concurrent joins against an in-memory room
    Simulate {
        /// Room id to simulate
        #[arg(long, default_value = "1")]
        room: RoomId,

        /// Number of concurrent joiners
        #[arg(short, long, default_value = "100")]
        members: usize,

        /// Number of winning ranks
        #[arg(short, long, default_value = "10")]
        winners: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve { seed, dry_run } => {
            tracing::info!(seed = ?seed, dry_run, "Starting serve command");
            serve(seed, dry_run).await?;
        }

        Commands::Drain => {
            tracing::info!("Starting drain command");
            drain_once().await?;
        }

        Commands::Simulate {
            room,
            members,
            winners,
        } => {
            tracing::info!(room, members, winners, "Starting simulate command");
            simulate(room, members, winners).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("seonchak=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("seonchak=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Seed data standing in for the out-of-scope room/member services
#[derive(Debug, Deserialize)]
struct SeedData {
    #[serde(default)]
    rooms: Vec<EventRoom>,
    #[serde(default)]
    members: Vec<Member>,
}

fn load_directories(
    seed: Option<PathBuf>,
) -> Result<(Arc<MemoryRoomDirectory>, Arc<MemoryMemberDirectory>)> {
    let rooms = Arc::new(MemoryRoomDirectory::new());
    let members = Arc::new(MemoryMemberDirectory::new());

    if let Some(path) = seed {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        let seed: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse seed file {}", path.display()))?;

        tracing::info!(
            rooms = seed.rooms.len(),
            members = seed.members.len(),
            "Seeding lookup directories"
        );

        for room in seed.rooms {
            rooms.insert(room);
        }
        for member in seed.members {
            members.insert(member);
        }
    }

    Ok((rooms, members))
}

async fn serve(seed: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let config = Config::from_env()?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {e}");
    }

    let backends = if dry_run {
        let (backends, _) = Backends::in_memory();
        tracing::info!("Running with in-process backends (dry-run)");
        backends
    } else {
        Backends::redis(&config).await?
    };

    let (rooms, members) = load_directories(seed)?;

    let service = Arc::new(ParticipationService::new(
        backends.clone(),
        rooms,
        members,
        config.lock.clone(),
    ));

    let drain = DrainScheduler::new(
        backends.queue.clone(),
        backends.broadcaster.clone(),
        config.drain.interval(),
    );
    let drain_handle = drain.spawn();

    let server = ParticipationServer::new(config.server.clone(), service);
    server
        .start_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    drain_handle.shutdown().await;
    tracing::info!("seonchak stopped");
    Ok(())
}

async fn drain_once() -> Result<()> {
    let config = Config::from_env()?;
    let backends = Backends::redis(&config).await?;

    let drain = DrainScheduler::new(
        backends.queue.clone(),
        backends.broadcaster.clone(),
        config.drain.interval(),
    );

    let stats = drain.run_once().await;
    println!("Drain cycle completed:");
    println!("  Rooms drained:     {}", stats.rooms_drained);
    println!("  Entries broadcast: {}", stats.entries_broadcast);
    println!("  Malformed entries: {}", stats.malformed_entries);
    println!("  Rooms failed:      {}", stats.rooms_failed);

    Ok(())
}

async fn simulate(room_id: RoomId, member_count: usize, winners: i64) -> Result<()> {
    let config = Config::default();
    let (backends, broadcaster) = Backends::in_memory();

    let rooms = Arc::new(MemoryRoomDirectory::new());
    let members = Arc::new(MemoryMemberDirectory::new());

    let now = chrono::Utc::now();
    rooms.insert(EventRoom {
        id: room_id,
        title: "simulated event".to_string(),
        start_time: now - chrono::Duration::seconds(1),
        end_time: now + chrono::Duration::hours(1),
        winner_num: winners,
        unlock_count: 0,
    });
    for member_id in 1..=member_count as i64 {
        members.insert(Member {
            id: member_id,
            creator_name: format!("member-{member_id}"),
        });
    }

    let service = Arc::new(ParticipationService::new(
        backends.clone(),
        rooms,
        members,
        config.lock.clone(),
    ));

    // Keep a subscriber alive so broadcasts are observable
    let mut rx = broadcaster.subscribe();

    let mut handles = Vec::with_capacity(member_count);
    for member_id in 1..=member_count as i64 {
        let service = service.clone();
        handles.push(tokio::spawn(
            async move { service.join(room_id, member_id).await },
        ));
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for result in futures::future::join_all(handles).await {
        match result? {
            Ok(_) => succeeded += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "Simulated join failed");
            }
        }
    }

    let drain = DrainScheduler::new(
        backends.queue.clone(),
        backends.broadcaster.clone(),
        config.drain.interval(),
    );
    let stats = drain.run_once().await;

    let mut authoritative = 0usize;
    while let Ok(message) = rx.try_recv() {
        if message.topic == broadcast::room_topic(room_id) {
            authoritative = authoritative.max(message.batch.len());
        }
    }

    let records = service.list_participations(room_id).await?;
    let winners_seen = records.iter().filter(|r| r.is_winner).count();

    println!("Simulation completed:");
    println!("  Joins succeeded:   {succeeded}");
    println!("  Joins failed:      {failed}");
    println!("  Ranks persisted:   {}", records.len());
    println!("  Winners:           {winners_seen}");
    println!("  Drained entries:   {}", stats.entries_broadcast);
    println!("  Largest broadcast: {authoritative}");

    Ok(())
}
