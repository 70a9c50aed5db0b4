// WXYC Radio - single-station stream player
// Module declarations
pub mod audio;
pub mod commands;
pub mod connectivity;
pub mod controller;
pub mod error;
pub mod events;
pub mod focus;
pub mod notification;
pub mod service;
pub mod settings;
pub mod smtc;
pub mod state;

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use audio::StreamPlayerFactory;
use connectivity::TcpReachability;
use events::UiEvent;
use focus::DesktopAudioFocus;
use notification::SystemMediaPresenter;
use service::{PlaybackService, ServiceDeps};
use settings::AppSettings;
use state::{AppState, PlaybackState, StreamSource};

const UI_CHANNEL_CAPACITY: usize = 32;

/// Collaborators for running on a desktop host
pub fn desktop_deps(
    settings: &AppSettings,
    ui: broadcast::Sender<UiEvent>,
) -> anyhow::Result<ServiceDeps> {
    let source = StreamSource::new(&settings.stream.url).context("Invalid stream URL")?;
    let connectivity = TcpReachability::for_stream(&source, &settings.connectivity)
        .context("Failed to set up connectivity probe")?;

    Ok(ServiceDeps {
        focus: Arc::new(DesktopAudioFocus),
        connectivity: Arc::new(connectivity),
        players: Arc::new(StreamPlayerFactory),
        presenter: Box::new(SystemMediaPresenter::new(
            settings.stream.station_name.clone(),
            ui,
        )),
    })
}

/// Channel for UI events; pass the sender to `desktop_deps` and `spawn_service`
pub fn ui_channel() -> broadcast::Sender<UiEvent> {
    broadcast::channel(UI_CHANNEL_CAPACITY).0
}

/// Create the playback service and run its event loop on a new task.
/// The task finishes when the service is destroyed or stops itself.
pub fn spawn_service(
    settings: AppSettings,
    deps: ServiceDeps,
    ui: broadcast::Sender<UiEvent>,
) -> anyhow::Result<(AppState, JoinHandle<()>)> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(PlaybackState::default());

    let service = PlaybackService::on_create(settings, deps, events_tx.clone(), ui.clone(), state_tx)
        .context("Failed to create playback service")?;
    let handle = tokio::spawn(service.run(events_rx));

    Ok((AppState::new(events_tx, state_rx, ui), handle))
}
