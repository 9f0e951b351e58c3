use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cardflow::commands;
use cardflow::daemon;
use cardflow::db::Database;

#[derive(Parser)]
#[command(name = "cardflow")]
#[command(about = "A card lifecycle and time-accounting engine for meeting action tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize cardflow in the current directory
    Init,

    /// Create a new card in a meeting
    Create {
        /// Meeting ID
        meeting: i64,
        /// Card summary
        summary: String,
        /// Card type (action, decision, follow_up, update, blocker, idea, risk, question)
        #[arg(short = 't', long, default_value = "action")]
        card_type: String,
        /// Owner of the card
        #[arg(short, long)]
        owner: Option<String>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Priority (low, medium, high, urgent)
        #[arg(short, long, default_value = "medium")]
        priority: String,
        /// Time estimate in hours
        #[arg(short, long)]
        estimate: Option<f64>,
    },

    /// List cards
    List {
        /// Filter by meeting ID
        #[arg(short, long)]
        meeting: Option<i64>,
        /// Filter by status (todo, in_progress, blocked, done)
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by priority
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Show card details, status history, and activity
    Show {
        /// Card ID
        id: i64,
    },

    /// Move a card to a new lifecycle status
    Status {
        /// Card ID
        id: i64,
        /// Target status (todo, in_progress, blocked, done)
        status: String,
        /// Acting user
        #[arg(short, long, default_value = "cli")]
        actor: String,
        /// Reason, when moving to blocked
        #[arg(short, long)]
        reason: Option<String>,
        /// Who or what is blocking, when moving to blocked
        #[arg(short, long)]
        blocked_by: Option<String>,
    },

    /// Add a note to a card's activity log
    Note {
        /// Card ID
        id: i64,
        /// Note text
        text: String,
        /// Acting user
        #[arg(short, long, default_value = "cli")]
        actor: String,
    },

    /// Run one escalation sweep over all open cards
    Escalate {
        /// Sweep credential, required when a secret is configured
        #[arg(long, env = "CARDFLOW_SWEEP_SECRET")]
        secret: Option<String>,
    },

    /// Carry incomplete cards forward from the linked previous meeting
    Carryover {
        /// Target (current) meeting ID
        meeting: i64,
        /// Acting user
        #[arg(short, long, default_value = "cli")]
        actor: String,
    },

    /// Compare a meeting's cards against its linked previous meeting
    Compare {
        /// Current meeting ID
        meeting: i64,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Export all meetings, cards, history, and activity as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Meeting management
    Meeting {
        #[command(subcommand)]
        action: MeetingCommands,
    },

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        action: DaemonCommands,
    },
}

#[derive(Subcommand)]
enum MeetingCommands {
    /// Create a new meeting
    New {
        /// Meeting title
        title: String,
        /// Recurring series name (created on first use)
        #[arg(short, long)]
        series: Option<String>,
        /// Previous meeting ID to link in the series
        #[arg(short, long)]
        previous: Option<i64>,
    },
    /// Link two meetings as consecutive in a series
    Link {
        /// Previous meeting ID
        previous: i64,
        /// Next meeting ID
        next: i64,
    },
    /// List meetings
    List,
    /// Show a meeting and its cards
    Show {
        /// Meeting ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the background escalation daemon
    Start,
    /// Stop the background daemon
    Stop,
    /// Check daemon status
    Status,
    /// Internal: run the daemon loop (used by start)
    #[command(hide = true)]
    Run {
        #[arg(long)]
        dir: PathBuf,
    },
}

fn find_cardflow_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(".cardflow");
        if candidate.exists() && candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a cardflow workspace (or any parent). Run 'cardflow init' first.");
        }
    }
}

fn get_db() -> Result<Database> {
    let cardflow_dir = find_cardflow_dir()?;
    let db_path = cardflow_dir.join("cards.db");
    Database::open(&db_path).context("Failed to open database")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cwd = env::current_dir()?;
            commands::init::run(&cwd)
        }

        Commands::Create {
            meeting,
            summary,
            card_type,
            owner,
            due,
            priority,
            estimate,
        } => {
            let db = get_db()?;
            commands::create::run(
                &db,
                meeting,
                &summary,
                &card_type,
                owner.as_deref(),
                due.as_deref(),
                &priority,
                estimate,
            )
        }

        Commands::List {
            meeting,
            status,
            priority,
        } => {
            let db = get_db()?;
            commands::list::run(&db, meeting, status.as_deref(), priority.as_deref())
        }

        Commands::Show { id } => {
            let db = get_db()?;
            commands::show::run(&db, id)
        }

        Commands::Status {
            id,
            status,
            actor,
            reason,
            blocked_by,
        } => {
            let db = get_db()?;
            commands::status::run(
                &db,
                id,
                &status,
                &actor,
                reason.as_deref(),
                blocked_by.as_deref(),
            )
        }

        Commands::Note { id, text, actor } => {
            let db = get_db()?;
            commands::note::run(&db, id, &text, &actor)
        }

        Commands::Escalate { secret } => {
            let cardflow_dir = find_cardflow_dir()?;
            let db = get_db()?;
            commands::escalate::run(&db, &cardflow_dir, secret.as_deref())
        }

        Commands::Carryover { meeting, actor } => {
            let db = get_db()?;
            commands::carryover::run(&db, meeting, &actor)
        }

        Commands::Compare { meeting, json } => {
            let db = get_db()?;
            commands::compare::run(&db, meeting, json)
        }

        Commands::Export { output } => {
            let db = get_db()?;
            commands::export::run(&db, output.as_deref())
        }

        Commands::Meeting { action } => {
            let db = get_db()?;
            match action {
                MeetingCommands::New {
                    title,
                    series,
                    previous,
                } => commands::meeting::new(&db, &title, series.as_deref(), previous),
                MeetingCommands::Link { previous, next } => {
                    commands::meeting::link(&db, previous, next)
                }
                MeetingCommands::List => commands::meeting::list(&db),
                MeetingCommands::Show { id } => commands::meeting::show(&db, id),
            }
        }

        Commands::Daemon { action } => match action {
            DaemonCommands::Start => {
                let cardflow_dir = find_cardflow_dir()?;
                daemon::start(&cardflow_dir)
            }
            DaemonCommands::Stop => {
                let cardflow_dir = find_cardflow_dir()?;
                daemon::stop(&cardflow_dir)
            }
            DaemonCommands::Status => {
                let cardflow_dir = find_cardflow_dir()?;
                daemon::status(&cardflow_dir)
            }
            DaemonCommands::Run { dir } => daemon::run_daemon(&dir),
        },
    }
}
