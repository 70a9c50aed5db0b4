//! wxyc-radio - terminal front end for the WXYC stream
//!
//! Reads line commands from stdin and prints what the playback service
//! reports back. Commands: start, mute, unmute, stop, status, quit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wxyc_radio::commands;
use wxyc_radio::events::UiEvent;
use wxyc_radio::settings::AppSettings;
use wxyc_radio::state::AppState;

/// Command-line arguments for wxyc-radio
#[derive(Parser, Debug)]
#[command(name = "wxyc-radio")]
#[command(about = "Listen to WXYC from the terminal")]
#[command(version)]
struct Args {
    /// Directory holding settings.json
    #[arg(short, long, default_value = ".", env = "WXYC_DATA_DIR")]
    data_dir: PathBuf,

    /// Stream URL, overrides the saved settings
    #[arg(short, long, env = "WXYC_STREAM_URL")]
    url: Option<String>,

    /// Start audible instead of muted
    #[arg(long)]
    unmuted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wxyc_radio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut settings = AppSettings::load(&args.data_dir)
        .map_err(anyhow::Error::msg)
        .context("Failed to load settings")?;
    if !AppSettings::get_settings_path(&args.data_dir).exists() {
        // Leave an editable copy of the defaults behind
        if let Err(e) = settings.save(&args.data_dir) {
            warn!("{}", e);
        }
    }
    if let Some(url) = args.url {
        settings.stream.url = url;
    }
    info!("Station: {} ({})", settings.stream.station_name, settings.stream.url);

    let ui = wxyc_radio::ui_channel();
    let deps = wxyc_radio::desktop_deps(&settings, ui.clone())?;
    let (state, mut service) = wxyc_radio::spawn_service(settings, deps, ui)?;

    let printer = tokio::spawn(print_ui_events(state.subscribe()));

    if args.unmuted {
        commands::start_unmuted(&state).map_err(anyhow::Error::msg)?;
    } else {
        commands::start(&state).map_err(anyhow::Error::msg)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !handle_line(&state, line.trim()) {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            _ = &mut service => {
                info!("Playback service stopped");
                printer.abort();
                return Ok(());
            }
        }
    }

    if commands::destroy(&state).is_ok() {
        service.await.context("Playback service panicked")?;
    }
    printer.abort();
    Ok(())
}

/// Returns false when the user asked to quit
fn handle_line(state: &AppState, line: &str) -> bool {
    let sent = match line {
        "" => Ok(()),
        "start" => commands::start_unmuted(state),
        "mute" => commands::mute(state),
        "unmute" => commands::unmute(state),
        "stop" => commands::stop(state),
        "status" => {
            let status = commands::get_player_state(state);
            match serde_json::to_string(&status) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to encode status: {}", e),
            }
            Ok(())
        }
        "quit" | "exit" => return false,
        other => {
            println!("unknown command: {} (start, mute, unmute, stop, status, quit)", other);
            Ok(())
        }
    };

    if let Err(e) = sent {
        warn!("{}", e);
    }
    true
}

async fn print_ui_events(mut events: broadcast::Receiver<UiEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to encode UI event: {}", e),
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "UI events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}
