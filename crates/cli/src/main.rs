//! Homeplate access CLI - Inspect routes and access decisions.
//!
//! # Usage
//!
//! ```bash
//! # List every route and the policy guarding it
//! hp-access routes
//!
//! # Check a user against the live backend
//! hp-access check --user 7c9e6679-7425-40de-944b-e07fc1f90ae7 --route /chef/dashboard
//!
//! # Check against a JSON fixture instead (no network)
//! hp-access check --route /chef/dashboard --fixture fixtures/chef.json
//! ```
//!
//! # Commands
//!
//! - `routes` - Print the marketplace route catalog
//! - `check` - Resolve a user's role and run the gate for one route

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homeplate_core::UserId;

mod commands;

#[derive(Parser)]
#[command(name = "hp-access")]
#[command(author, version, about = "Homeplate access control tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route catalog with each route's access policy
    Routes,
    /// Run the access gate for one user and route
    Check {
        /// User to check; defaults to the fixture's signed-in session
        #[arg(short, long)]
        user: Option<UserId>,

        /// Route path to evaluate (e.g., /chef/dashboard)
        #[arg(short, long)]
        route: String,

        /// Read accounts from a JSON fixture instead of the backend
        #[arg(short, long)]
        fixture: Option<PathBuf>,
    },
}

/// Initialize Sentry from `SENTRY_DSN` if set; the guard must be kept alive.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.is_empty())?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry();

    // Logs go to stderr so command output stays pipeable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "homeplate_access=info,homeplate_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Routes => commands::routes::list()?,
        Commands::Check {
            user,
            route,
            fixture,
        } => {
            let report = match fixture {
                Some(path) => commands::check::with_fixture(&path, user, &route).await?,
                None => commands::check::live(user, &route).await?,
            };
            commands::check::print(&report);
        }
    }
    Ok(())
}
