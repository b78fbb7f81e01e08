use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use earthguard::EarthGuard;
use earthguard::config::Config;
use earthguard::error::EarthGuardError;
use earthguard::persona::{GREETING, STATUS_PLACEHOLDER};
use earthguard::render::{render_location_hint, render_status, render_turn};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let app = Arc::new(EarthGuard::new(&config)?);
    tracing::info!("{} v{} ready", config.server.name, config.server.version);

    // Dashboard activation: the status card fills in whenever the poll lands
    println!("{}", render_status(STATUS_PLACEHOLDER));
    spawn_status_poll(&app);

    // Conversation start: location resolves in the background; questions asked
    // before it lands are sent without map grounding
    {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let location = app.resolve_location().await;
            if app.conversation().needs_location_hint() {
                println!("{}", render_location_hint(&location));
            }
        });
    }

    println!("\n{GREETING}\n");
    println!("Type a question, /status to refresh the status card, /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" | "/exit" => break,
            "/status" => {
                println!("{}", render_status(STATUS_PLACEHOLDER));
                spawn_status_poll(&app);
            }
            _ => match app.submit(&line).await {
                Ok(_) => {
                    let snapshot = app.snapshot();
                    for turn in snapshot.turns.iter().rev().take(2).rev() {
                        println!("{}", render_turn(turn));
                    }
                }
                Err(EarthGuardError::EmptyMessage) => {}
                Err(e) => println!("{e}"),
            },
        }
    }

    tracing::info!(session = %app.snapshot().session_id, "Session ended");
    Ok(())
}

fn spawn_status_poll(app: &Arc<EarthGuard>) {
    let app = Arc::clone(app);
    tokio::spawn(async move {
        println!("{}", render_status(&app.poll_status().await));
    });
}
