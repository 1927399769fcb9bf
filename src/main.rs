use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use studio_outline::config::{self, Backend, Config};
use studio_outline::controller::OutlineNodeController;
use studio_outline::error::OutlineError;
use studio_outline::model::Category;
use studio_outline::moves::Direction;
use studio_outline::service::StudioService;
use studio_outline::session::OutlineSession;
use studio_outline::store::{self, SeedFile, SqliteStudio};
use studio_outline::studio::StudioClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and edit a course outline")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `app.backend` from the config file
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the outline with status, moves and sync availability
    Show {
        /// Block to treat as the deep-link focus
        #[arg(long)]
        focus: Option<String>,
        /// Print the raw outline as JSON
        #[arg(long)]
        json: bool,
    },
    Rename {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
    },
    Move {
        #[arg(long)]
        id: String,
        #[arg(long, value_parser = parse_direction)]
        direction: Direction,
    },
    /// Pull the latest library version into a linked block
    Sync {
        #[arg(long)]
        id: String,
    },
    Publish {
        #[arg(long)]
        id: String,
    },
    Duplicate {
        #[arg(long)]
        id: String,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Load an outline JSON file into the local store
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
}

impl Command {
    /// Block the command acts on, for the commands that act on one.
    fn target_id(&self) -> Option<&str> {
        match self {
            Command::Rename { id, .. }
            | Command::Move { id, .. }
            | Command::Sync { id }
            | Command::Publish { id }
            | Command::Duplicate { id }
            | Command::Delete { id } => Some(id),
            Command::Show { .. } | Command::Seed { .. } => None,
        }
    }
}

fn parse_direction(s: &str) -> Result<Direction, String> {
    match s {
        "up" => Ok(Direction::Up),
        "down" => Ok(Direction::Down),
        other => Err(format!("expected up or down, got {other}")),
    }
}

async fn open_store(cfg: &Config) -> Result<store::Pool> {
    let database_url = cfg.app.database_url();
    let pool = store::init_pool(&database_url)
        .await
        .with_context(|| format!("opening {database_url}"))?;
    store::run_migrations(&pool).await.context("running migrations")?;
    Ok(pool)
}

async fn build_service(cfg: &Config) -> Result<Arc<dyn StudioService>> {
    let service: Arc<dyn StudioService> = match cfg.app.backend {
        Backend::Studio => {
            Arc::new(StudioClient::from_config(cfg).context("building studio client")?)
        }
        Backend::Local => Arc::new(SqliteStudio::new(open_store(cfg).await?)),
    };
    Ok(service)
}

fn print_outline(session: &OutlineSession, focus: Option<&str>) {
    for controller in session.controllers() {
        let Some(view) = controller.view(focus) else {
            continue;
        };
        let indent = match view.category {
            Category::Section => "",
            Category::Subsection => "  ",
            Category::Unit => "    ",
        };
        let mut flags = Vec::new();
        if view.actions.allow_move_up {
            flags.push("up");
        }
        if view.actions.allow_move_down {
            flags.push("down");
        }
        if view.ready_to_sync {
            flags.push("sync");
        }
        if view.read_only {
            flags.push("linked");
        }
        let marker = if view.highlight { ">" } else { " " };
        println!(
            "{marker}{indent}{} [{}] {} {}",
            view.title,
            view.status.as_str(),
            view.id,
            flags.join(",")
        );
    }
}

fn print_notices(session: &OutlineSession) {
    for notice in session.notices().iter() {
        eprintln!(
            "[{:?}] {} ({})",
            notice.kind,
            notice.message,
            notice.raised_at.format("%H:%M:%S")
        );
    }
}

async fn run_action(
    session: &mut OutlineSession,
    mut controller: OutlineNodeController,
    command: &Command,
) -> Result<(), OutlineError> {
    let service = session.service();
    let service = service.as_ref();
    match command {
        Command::Rename { title, .. } => {
            controller.open_edit();
            let outcome = controller.submit_title(title, service, session).await?;
            info!(?outcome, "rename finished");
        }
        Command::Move { direction, .. } => {
            let details = controller.move_node(*direction, service, session).await?;
            info!(from = details.from, to = details.to, "moved");
        }
        Command::Sync { .. } => {
            if controller.open_sync().is_none() {
                warn!(id = controller.id(), "nothing to sync");
                return Ok(());
            }
            let outcome = controller.confirm_sync(service, session).await?;
            info!(?outcome, "sync finished");
        }
        Command::Publish { .. } => controller.publish(service, session).await?,
        Command::Duplicate { .. } => {
            let new_id = controller.duplicate(service, session).await?;
            println!("{new_id}");
        }
        Command::Delete { .. } => controller.delete(service, session).await?,
        Command::Show { .. } | Command::Seed { .. } => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load_with_backend(Some(&args.config), args.backend)?;
    cfg.ensure_dirs()?;

    if let Command::Seed { file } = &args.command {
        if cfg.app.backend != Backend::Local {
            bail!("seed only applies to the local backend");
        }
        let raw = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw).context("parsing seed file")?;
        let pool = open_store(&cfg).await?;
        let written = store::seed(&pool, &cfg.course.id, seed).await?;
        println!("seeded {written} blocks");
        return Ok(());
    }

    let service = build_service(&cfg).await?;
    let mut session = OutlineSession::load(service, &cfg.course.id)
        .await
        .context("loading outline")?;

    if let Command::Show { focus, json } = &args.command {
        if *json {
            println!("{}", serde_json::to_string_pretty(session.outline())?);
        } else {
            print_outline(&session, focus.as_deref());
        }
        return Ok(());
    }

    let Some(id) = args.command.target_id() else {
        return Ok(());
    };
    let Some(controller) = session.controller(id) else {
        eprintln!("no block {id} in {}", cfg.course.id);
        return Ok(());
    };
    if let Err(err) = run_action(&mut session, controller, &args.command).await {
        session.report(&err);
    }
    print_notices(&session);
    print_outline(&session, Some(id));
    Ok(())
}
