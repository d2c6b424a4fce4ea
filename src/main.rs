use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use classboard::activity::{ActivityError, RemovalReport};
use classboard::config::FollowConfig;
use classboard::coordinator::{CoordinatorError, MultiReplicaCoordinator};
use classboard::ids::{OccupantId, PageId, Role, ViewContext};
use classboard::slides::{self, SlideClient, SlideError, SlideSource};
use classboard::store::memory::MemoryStore;
use classboard::store::{Op, PeerPage, ReplicatedStore, StoreError, Transaction};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("mount failed: {0}")]
    Mount(#[from] CoordinatorError),
    #[error("activity failed: {0}")]
    Activity(#[from] ActivityError),
    #[error("{}", .0.user_message())]
    Slides(#[from] SlideError),
    #[error("store rejected change: {0}")]
    Store(#[from] StoreError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "classboard", about = "Classroom whiteboard page-follow engine")]
struct Cli {
    /// Base URL of the slide image-description service.
    #[arg(long, env = "CLASSBOARD_FILE_SERVER_URL")]
    file_server_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an in-memory classroom: upload slides, follow the moderator, remove.
    Simulate {
        #[arg(long, default_value_t = 3)]
        participants: usize,
        #[arg(long, default_value_t = 4)]
        slides: usize,
    },
    /// Resolve a slide-deck link into image URLs.
    Slides { link: String },
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    slides: usize,
    followed_to: PageId,
    participants: Vec<ParticipantView>,
    removal: RemovalReport,
}

#[derive(Debug, Serialize)]
struct ParticipantView {
    occupant: OccupantId,
    page: PageId,
    camera_locked: bool,
}

const MODERATOR: &str = "Teacher";

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if let Err(e) = dotenv {
        debug!(error = %e, "no .env loaded");
    }

    let cli = Cli::parse();
    let mut config = FollowConfig::from_env();
    if let Some(url) = cli.file_server_url {
        config = config.with_file_server_url(url);
    }

    match cli.command {
        Command::Simulate { participants, slides } => run_simulate(&config, participants, slides).await,
        Command::Slides { link } => run_slides(&config, &link).await,
    }
}

async fn run_slides(config: &FollowConfig, link: &str) -> Result<(), CliError> {
    let presentation_id = slides::extract_presentation_id(link)?;
    let client = SlideClient::from_config(config)?;
    let images = client.fetch_images(&presentation_id).await?;
    println!("{}", serde_json::to_string_pretty(&images)?);
    Ok(())
}

async fn run_simulate(config: &FollowConfig, participants: usize, slides: usize) -> Result<(), CliError> {
    let moderator = MultiReplicaCoordinator::new(MODERATOR, Role::Moderator, config.clone());
    moderator
        .mount(MODERATOR, ViewContext::Solo, Arc::new(MemoryStore::new()))
        .await?;

    let mut classroom = Vec::with_capacity(participants);
    for n in 1..=participants {
        let name = format!("Student {n}");
        moderator
            .mount(&name, ViewContext::SidebarPreview, Arc::new(MemoryStore::new()))
            .await?;
        let own = Arc::new(MemoryStore::new());
        let coordinator =
            MultiReplicaCoordinator::new(&name, Role::Participant, config.clone()).with_leader(MODERATOR);
        coordinator
            .mount(&name, ViewContext::Solo, Arc::clone(&own) as Arc<dyn ReplicatedStore>)
            .await?;
        classroom.push((coordinator, own));
    }

    let images: Vec<String> = (1..=slides)
        .map(|i| format!("https://slides.classboard.test/slide-{i}.png"))
        .collect();
    let cohort = moderator
        .upload(&images, |cohort| info!(pages = cohort.pages.len(), "moderator cohort ready"))
        .await?;
    // Each participant process installs the same cohort on its own board.
    for (coordinator, _) in &classroom {
        coordinator.upload(&images, |_| {}).await?;
    }

    let target = cohort.pages.last().cloned().unwrap_or_else(|| PageId::activity(1));
    let leader = OccupantId::new(MODERATOR);
    for (_, own) in &classroom {
        own.commit(Transaction::remote().with(Op::PutPeerPage(PeerPage {
            peer_id: leader.clone(),
            current_page_id: target.clone(),
        })))?;
    }
    tokio::time::sleep(config.frame_delay + config.settle_window * 2).await;

    let views = classroom
        .iter()
        .map(|(coordinator, own)| ParticipantView {
            occupant: coordinator.local().clone(),
            page: own.current_page_id(),
            camera_locked: own.camera().options.locked,
        })
        .collect();

    let mut removal = moderator.remove_activity().await?;
    for (coordinator, _) in &classroom {
        let report = coordinator.remove_activity().await?;
        removal.replicas += report.replicas;
        removal.pages_removed += report.pages_removed;
    }

    let report = SimulationReport { slides, followed_to: target, participants: views, removal };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
