use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, normalize_server_url, Settings},
    load_board, BoardCache, CardMutationCoordinator, ColumnWindow, DetailBundleController,
    DetailView, DragTransitionResolver, EngineEvent, HttpJobsApi, JobsApi, LoadOutcome,
    MomentumAction, Point, ToastKind,
};
use shared::{
    domain::{JobId, JobStatus},
    protocol::Card,
};
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Track job applications on a status board")]
struct Cli {
    /// Overrides the configured server url.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every column of the board.
    Board,
    Show {
        job_id: i64,
    },
    Activity {
        job_id: i64,
        /// Keep paging until the feed is exhausted.
        #[arg(long)]
        all: bool,
    },
    Move {
        job_id: i64,
        status: JobStatus,
    },
    Tag {
        job_id: i64,
        tag: String,
    },
    Note {
        job_id: i64,
        body: String,
    },
    /// Stamp the last action as now, optionally scheduling the next one.
    Momentum {
        job_id: i64,
        #[arg(long)]
        next_title: Option<String>,
        /// RFC 3339 timestamp, e.g. 2024-05-01T09:00:00Z.
        #[arg(long)]
        next_at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings()?;
    if let Some(server_url) = cli.server_url.as_deref() {
        settings.server_url = normalize_server_url(server_url)?;
    }
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let api: Arc<dyn JobsApi> = Arc::new(
        HttpJobsApi::with_timeout(&settings.server_url, settings.request_timeout())
            .context("failed to create jobs api client")?,
    );
    info!(server_url = %settings.server_url, "jobtrack starting");
    let coordinator = CardMutationCoordinator::new(Arc::clone(&api));
    let mut events = coordinator.subscribe_events();

    let result = run(cli.command, &settings, api.as_ref(), &coordinator).await;
    print_toasts(&mut events);
    result
}

async fn run(
    command: Command,
    settings: &Settings,
    api: &dyn JobsApi,
    coordinator: &Arc<CardMutationCoordinator>,
) -> Result<()> {
    match command {
        Command::Board => {
            let board = BoardCache::new();
            coordinator.add_observer(board.clone()).await;
            let count = load_board(api, &board, coordinator).await?;
            println!("{count} jobs");
            let window = ColumnWindow::default();
            for (status, cards) in board.columns().await {
                if cards.is_empty() {
                    continue;
                }
                println!("\n{status} ({})", cards.len());
                for card in window.slice(&cards) {
                    println!("  {}", card_line(card));
                }
                if cards.len() > window.visible() {
                    println!("  ... {} more", cards.len() - window.visible());
                }
            }
        }
        Command::Show { job_id } => {
            let controller = open_detail(coordinator, job_id).await?;
            print_detail(&controller.view().await);
        }
        Command::Activity { job_id, all } => {
            let controller = open_detail(coordinator, job_id).await?;
            if all {
                while controller.pager().has_more().await {
                    if !matches!(
                        controller.load_more_activity().await,
                        LoadOutcome::Loaded { .. }
                    ) {
                        break;
                    }
                }
            }
            let activity = controller.pager().snapshot().await;
            for event in &activity.items {
                println!(
                    "{} [{}] {}",
                    event.created_at.format("%Y-%m-%d %H:%M"),
                    event.kind,
                    event.message
                );
            }
            if activity.has_more {
                println!("(more available, pass --all)");
            }
        }
        Command::Move { job_id, status } => {
            let controller = open_detail(coordinator, job_id).await?;
            let card = controller
                .view()
                .await
                .job
                .ok_or_else(|| anyhow!("job {job_id} not loaded"))?;

            // A keyboard move is a drag that travelled exactly the activation distance.
            let distance = settings.drag_activation_distance;
            let mut resolver = DragTransitionResolver::with_activation_distance(distance);
            resolver.pointer_down(card.id, card.status, Point::new(0.0, 0.0));
            resolver.pointer_move(Point::new(distance, 0.0), Some(status));
            let resolution = resolver
                .release(Some(status))
                .ok_or_else(|| anyhow!("move gesture did not settle"))?;

            match controller.commit_drop(resolution).await? {
                Some(card) => println!("{}", card_line(&card)),
                None => println!("job {job_id} is already in {status}"),
            }
        }
        Command::Tag { job_id, tag } => {
            let controller = open_detail(coordinator, job_id).await?;
            let card = controller.add_tag(&tag).await?;
            println!("tags: {}", card.tags.join(", "));
        }
        Command::Note { job_id, body } => {
            let controller = open_detail(coordinator, job_id).await?;
            let note = controller.add_note(&body).await?;
            println!("note {} added", note.id);
        }
        Command::Momentum {
            job_id,
            next_title,
            next_at,
        } => {
            let controller = open_detail(coordinator, job_id).await?;
            let action = MomentumAction {
                schedule_next: next_title.is_some() || next_at.is_some(),
                next_action_title: next_title,
                next_action_at: next_at,
            };
            let card = controller.log_momentum(action).await?;
            println!("{}", card_line(&card));
        }
    }

    Ok(())
}

async fn open_detail(
    coordinator: &Arc<CardMutationCoordinator>,
    job_id: i64,
) -> Result<DetailBundleController> {
    let controller = DetailBundleController::new(Arc::clone(coordinator));
    controller
        .open(JobId(job_id))
        .await
        .with_context(|| format!("failed to open job {job_id}"))?;
    Ok(controller)
}

fn card_line(card: &Card) -> String {
    let mut line = format!(
        "#{} {} at {} [{}]",
        card.id, card.job_title, card.company_name, card.status
    );
    if !card.tags.is_empty() {
        line.push_str(&format!(" #{}", card.tags.join(" #")));
    }
    if let Some(at) = card.next_action_at {
        let title = card.next_action_title.as_deref().unwrap_or("next action");
        line.push_str(&format!(" | {title} on {}", at.format("%Y-%m-%d")));
    }
    if card.needs_follow_up {
        line.push_str(" | needs follow-up");
    }
    line
}

fn print_detail(view: &DetailView) {
    if let Some(job) = &view.job {
        println!("{}", card_line(job));
        println!("priority: {:?}", job.priority);
        if let Some(location) = &job.location {
            println!("location: {location}");
        }
    }
    if !view.notes.is_empty() {
        println!("\nnotes:");
        for note in &view.notes {
            println!("  [{}] {}", note.id, note.body);
        }
    }
    if !view.interviews.is_empty() {
        println!("\ninterviews:");
        for interview in &view.interviews {
            let when = interview
                .scheduled_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unscheduled".to_string());
            let stage = interview.stage.as_deref().unwrap_or("interview");
            println!("  [{}] {stage} {when} ({:?})", interview.id, interview.status);
        }
    }
    if !view.activity.items.is_empty() {
        println!("\nrecent activity:");
        for event in &view.activity.items {
            println!("  {} {}", event.created_at.format("%Y-%m-%d"), event.message);
        }
    }
}

fn print_toasts(events: &mut broadcast::Receiver<EngineEvent>) {
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::Toast(toast) = event {
            match toast.kind {
                ToastKind::Success => println!("ok: {}", toast.message),
                ToastKind::Error => eprintln!("error: {}", toast.message),
            }
        }
    }
}
