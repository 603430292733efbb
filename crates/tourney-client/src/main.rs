//! # Tourney Client
//!
//! Terminal front end. Admins get an edit console on stdin; everyone else
//! watches the bracket update live.
//!
//! ## Usage
//!
//! ```bash
//! # Watch as a viewer
//! tourney --user carol
//!
//! # Edit as an admin against a remote server
//! tourney --user alice-id --server http://10.0.0.5:8080
//! ```

mod commands;
mod config;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tourney_core::{EventDispatcher, Role, SnapshotStore, SyncCoordinator};
use tourney_protocol::{Event, EventKind};
use tourney_transport::{ConnectionSession, HttpStore, WebSocketConnector};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{Command, HELP};
use crate::config::ClientConfig;

/// Tourney terminal client.
#[derive(Debug, Parser)]
#[command(name = "tourney", version, about)]
struct Args {
    /// User id to authenticate as.
    #[arg(short, long)]
    user: Option<String>,

    /// Server base URL.
    #[arg(short, long)]
    server: Option<String>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourney=info,tourney_core=info,tourney_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.server = server;
    }
    if let Some(user) = args.user {
        config.user = Some(user);
    }
    let user = config
        .user
        .clone()
        .context("No user id: pass --user or set TOURNEY_USER")?;

    let dispatcher = Arc::new(EventDispatcher::new());
    dispatcher.subscribe(EventKind::Error, |event| {
        if let Event::Error { message } = event {
            warn!(%message, "Server error");
        }
    });

    let session = ConnectionSession::new(
        Arc::new(WebSocketConnector::default()),
        Arc::clone(&dispatcher),
        config.session_config(),
    );
    session.connect(user.as_str());

    let role = resolve_role(&session, &config, &user).await;
    info!(user = %user, role = %role, server = %config.server, "Starting");

    let store: Arc<dyn SnapshotStore> = Arc::new(HttpStore::new(config.server.as_str())?);
    let coordinator = Arc::new(SyncCoordinator::new(role, store, config.sync.clone()));

    let remote = Arc::clone(&coordinator);
    dispatcher.subscribe(EventKind::TournamentUpdated, move |event| {
        if let Event::TournamentUpdated { snapshot } = event {
            remote.apply_remote(snapshot.clone());
        }
    });
    let remote = Arc::clone(&coordinator);
    dispatcher.subscribe(EventKind::TournamentReset, move |_| {
        remote.apply_remote_reset();
    });

    match coordinator.bootstrap().await {
        Ok(outcome) => debug!(?outcome, "Bootstrapped"),
        Err(e) => warn!(error = %e, "Could not load tournament; will retry"),
    }

    let renderer = tokio::spawn(render_loop(Arc::clone(&coordinator)));

    if role.can_edit() {
        println!("{HELP}");
        tokio::select! {
            result = console(&coordinator) => result?,
            _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        }
        if let Err(e) = coordinator.flush().await {
            warn!(error = %e, "Failed to persist final edits");
        }
    } else {
        coordinator.start_polling();
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Interrupted");
    }

    coordinator.shutdown();
    renderer.abort();
    session.close();
    session.join().await;
    Ok(())
}

/// Prefer the server's verdict; fall back to the local allow-list when the
/// server does not answer in time.
async fn resolve_role(session: &ConnectionSession, config: &ClientConfig, user: &str) -> Role {
    let mut state = session.watch_state();
    let deadline = tokio::time::sleep(config.auth_wait());
    tokio::pin!(deadline);

    loop {
        if let Some(admin) = session.is_admin() {
            let local = config.admins.is_admin(user);
            if !config.admins.is_empty() && local != admin {
                warn!(user, server = admin, local, "Local admin list disagrees with server");
            }
            return if admin { Role::Admin } else { Role::Viewer };
        }
        if session.is_closed() {
            break;
        }
        tokio::select! {
            _ = &mut deadline => break,
            changed = state.changed() => if changed.is_err() { break },
            _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {}
        }
    }

    warn!("No answer from the server; using the local admin list");
    config.admins.role_for(user)
}

/// Reprint the bracket on every change.
async fn render_loop(coordinator: Arc<SyncCoordinator>) {
    let mut view = coordinator.watch();
    loop {
        let text = render::render(view.borrow_and_update().as_ref());
        println!("\n{text}");
        if view.changed().await.is_err() {
            break;
        }
    }
}

/// Read admin commands from stdin until `quit` or EOF.
async fn console(coordinator: &SyncCoordinator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(Command::Help) => println!("{HELP}"),
            Ok(Command::Show) => println!("{}", render::render(coordinator.snapshot().as_ref())),
            Ok(command) => match commands::execute(coordinator, command) {
                Ok(message) => println!("{message}"),
                Err(e) => println!("error: {e:#}"),
            },
            Err(e) => println!("error: {e}"),
        }
    }
    Ok(())
}
