// Playback service
// Host lifecycle shell around the stream controller. It owns the event loop
// that serializes every state change, the connectivity monitor and the
// foreground notification.

use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::audio::PlayerFactory;
use crate::commands::Command;
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::controller::StreamController;
use crate::error::{PlaybackError, Result};
use crate::events::{EventSender, ServiceEvent, UiEvent};
use crate::focus::AudioFocus;
use crate::notification::{build_notification, NotificationPresenter};
use crate::settings::AppSettings;
use crate::state::{PlaybackState, StreamSource};

/// Host collaborators the service is built from
pub struct ServiceDeps {
    pub focus: Arc<dyn AudioFocus>,
    pub connectivity: Arc<dyn Connectivity>,
    pub players: Arc<dyn PlayerFactory>,
    pub presenter: Box<dyn NotificationPresenter>,
}

/// Whether the host should keep the service alive after a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Sticky,
    NotSticky,
}

pub struct PlaybackService {
    settings: AppSettings,
    controller: StreamController,
    connectivity: Arc<dyn Connectivity>,
    presenter: Box<dyn NotificationPresenter>,
    monitor: Option<ConnectivityMonitor>,
    foreground: bool,
}

impl PlaybackService {
    /// Build the service and register the connectivity monitor.
    /// Must be called inside a tokio runtime.
    pub fn on_create(
        settings: AppSettings,
        deps: ServiceDeps,
        events: EventSender,
        ui: broadcast::Sender<UiEvent>,
        published: watch::Sender<PlaybackState>,
    ) -> Result<Self> {
        let source = StreamSource::new(&settings.stream.url)?;
        info!(url = source.as_str(), "Creating playback service");

        let monitor = ConnectivityMonitor::spawn(
            deps.connectivity.clone(),
            settings.connectivity.interval(),
            events.clone(),
        );

        let controller = StreamController::new(
            source,
            deps.players,
            deps.focus,
            settings.playback.volume(),
            events,
            ui,
            published,
        );

        Ok(Self {
            settings,
            controller,
            connectivity: deps.connectivity,
            presenter: deps.presenter,
            monitor: Some(monitor),
            foreground: false,
        })
    }

    pub async fn on_start_command(&mut self, command: Option<Command>) -> StartMode {
        if !self.connectivity.is_network_connected().await {
            warn!(?command, "{}, stopping service", PlaybackError::NetworkUnavailable);
            self.controller.on_start_without_network();
            return StartMode::NotSticky;
        }

        debug!(?command, "Start command");
        match command {
            Some(Command::StartUnmuted) => self.controller.start(false),
            Some(Command::Mute) => self.controller.mute(),
            Some(Command::Unmute) => self.controller.unmute(),
            Some(Command::Stop) => {
                self.controller.stop();
                self.leave_foreground();
                return StartMode::Sticky;
            }
            None if !self.controller.has_player() => {
                self.controller.start(self.settings.playback.start_muted)
            }
            None => {}
        }

        self.enter_foreground();
        StartMode::Sticky
    }

    /// Release everything. Safe to call more than once.
    pub fn on_destroy(&mut self) {
        self.controller.stop();
        self.leave_foreground();
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
            info!("Playback service destroyed");
        }
    }

    /// Binding is not supported
    pub fn on_bind(&self) -> Option<Infallible> {
        None
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state()
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    /// Drain the event queue until the host destroys the service or it stops itself
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ServiceEvent>) {
        info!("Playback service running");

        while let Some(event) = events.recv().await {
            let before = self.controller.state();

            match event {
                ServiceEvent::StartCommand(command) => {
                    if self.on_start_command(command).await == StartMode::NotSticky {
                        break;
                    }
                }
                ServiceEvent::FocusChanged(change) => self.controller.on_focus_change(change),
                ServiceEvent::ConnectivityChanged { reachable } => {
                    self.controller.on_connectivity_changed(reachable)
                }
                ServiceEvent::Player(event) => self.controller.on_player_event(event),
                ServiceEvent::Destroy => break,
            }

            if self.foreground && self.controller.state() != before {
                self.show_notification();
            }
        }

        self.on_destroy();
    }

    fn enter_foreground(&mut self) {
        if !self.foreground {
            info!("Entering foreground");
        }
        self.foreground = true;
        self.show_notification();
    }

    fn leave_foreground(&mut self) {
        if self.foreground {
            self.presenter.stop_foreground();
            self.foreground = false;
        }
    }

    fn show_notification(&mut self) {
        let notification = build_notification(&self.settings.notification, &self.controller.state());
        self.presenter.start_foreground(&notification);
    }
}
