// Stream controller
// Owns the player, the focus grant and the playback flags. Every handler runs
// on the service event loop, one event at a time.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::audio::{MediaPlayer, PlayerFactory};
use crate::events::{EventSender, PlayerEvent, PreparationId, UiEvent};
use crate::focus::{AudioFocus, FocusAction, FocusChange, FocusState, FocusTracker};
use crate::state::{PlaybackState, StreamSource};

const MUTED_VOLUME: f32 = 0.0;

/// The player and where it is in its preparation
enum PlayerSlot {
    Empty,
    Preparing {
        player: Box<dyn MediaPlayer>,
        id: PreparationId,
    },
    Ready {
        player: Box<dyn MediaPlayer>,
        id: PreparationId,
    },
}

impl PlayerSlot {
    fn id(&self) -> Option<PreparationId> {
        match self {
            PlayerSlot::Empty => None,
            PlayerSlot::Preparing { id, .. } | PlayerSlot::Ready { id, .. } => Some(*id),
        }
    }

    fn player_mut(&mut self) -> Option<&mut Box<dyn MediaPlayer>> {
        match self {
            PlayerSlot::Empty => None,
            PlayerSlot::Preparing { player, .. } | PlayerSlot::Ready { player, .. } => Some(player),
        }
    }
}

pub struct StreamController {
    source: StreamSource,
    players: Arc<dyn PlayerFactory>,
    focus: FocusTracker,
    slot: PlayerSlot,
    state: PlaybackState,
    volume: f32,
    last_id: PreparationId,
    events: EventSender,
    ui: broadcast::Sender<UiEvent>,
    published: watch::Sender<PlaybackState>,
}

impl StreamController {
    pub fn new(
        source: StreamSource,
        players: Arc<dyn PlayerFactory>,
        focus: Arc<dyn AudioFocus>,
        volume: f32,
        events: EventSender,
        ui: broadcast::Sender<UiEvent>,
        published: watch::Sender<PlaybackState>,
    ) -> Self {
        Self {
            source,
            players,
            focus: FocusTracker::new(focus),
            slot: PlayerSlot::Empty,
            state: PlaybackState::default(),
            volume,
            last_id: 0,
            events,
            ui,
            published,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn focus_state(&self) -> FocusState {
        self.focus.state()
    }

    pub fn has_player(&self) -> bool {
        !matches!(self.slot, PlayerSlot::Empty)
    }

    /// Start the stream. An unmuted start needs focus first; without it
    /// nothing is created. With a player already running only the mute
    /// state is applied.
    pub fn start(&mut self, muted: bool) {
        if self.has_player() {
            debug!(muted, "Stream already running, applying mute state");
            if muted {
                self.mute();
            } else {
                self.unmute();
            }
            return;
        }

        if !muted {
            if let Err(e) = self.focus.acquire() {
                debug!("Not starting stream: {}", e);
                return;
            }
        }

        let mut player = self.players.create(&self.source);
        player.set_volume(if muted { MUTED_VOLUME } else { self.volume });

        self.last_id += 1;
        let id = self.last_id;
        player.prepare_async(id, self.events.clone());
        self.slot = PlayerSlot::Preparing { player, id };

        self.state.is_muted = muted;
        self.state.is_preparing = true;
        self.state.is_playing = false;
        info!(id, muted, url = self.source.as_str(), "Preparing stream");
        self.publish();
    }

    /// Silence output and hand focus back
    pub fn mute(&mut self) {
        if let Some(player) = self.slot.player_mut() {
            player.set_volume(MUTED_VOLUME);
        }
        self.state.is_muted = true;
        self.focus.release();
        debug!("Muted");
        self.publish();
    }

    /// Restore output if focus can be regained; otherwise stay muted
    pub fn unmute(&mut self) {
        if !self.has_player() {
            // Focus is taken when a stream starts
            debug!("Unmuted with nothing playing");
            self.state.is_muted = false;
            self.publish();
            return;
        }

        if let Err(e) = self.focus.acquire() {
            debug!("Staying muted: {}", e);
            return;
        }

        let volume = self.volume;
        if let Some(player) = self.slot.player_mut() {
            player.set_volume(volume);
        }
        // A transient loss may have paused us before focus was handed back
        if let PlayerSlot::Ready { player, .. } = &mut self.slot {
            if !self.state.is_playing {
                player.start();
                self.state.is_playing = true;
            }
        }
        self.state.is_muted = false;
        debug!("Unmuted");
        self.publish();
    }

    /// Tear everything down. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.release_player();
        self.focus.release();
    }

    pub fn on_player_event(&mut self, event: PlayerEvent) {
        if self.slot.id() != Some(event.id()) {
            debug!(id = event.id(), "Ignoring result of a released player");
            return;
        }

        match event {
            PlayerEvent::Prepared(id) => {
                if !matches!(self.slot, PlayerSlot::Preparing { .. }) {
                    debug!(id, "Duplicate prepared event");
                    return;
                }
                let PlayerSlot::Preparing { mut player, .. } =
                    std::mem::replace(&mut self.slot, PlayerSlot::Empty)
                else {
                    return;
                };

                self.state.is_preparing = false;
                if self.focus.state() == FocusState::TransientlyLost {
                    debug!(id, "Prepared while focus is lent out, holding playback");
                } else {
                    player.start();
                    self.state.is_playing = true;
                }
                self.slot = PlayerSlot::Ready { player, id };

                info!(id, "Stream playing");
                self.notify(UiEvent::SetActive);
                self.publish();
            }
            PlayerEvent::Failed(id, error) => {
                warn!(id, "Releasing stream after failure: {}", error);
                self.stop();
            }
        }
    }

    pub fn on_focus_change(&mut self, change: FocusChange) {
        match self.focus.on_change(change) {
            FocusAction::Ignore => return,
            FocusAction::Pause => {
                if let PlayerSlot::Ready { player, .. } = &mut self.slot {
                    player.pause();
                }
                self.state.is_playing = false;
            }
            FocusAction::Resume => {
                if let PlayerSlot::Ready { player, .. } = &mut self.slot {
                    player.start();
                    self.state.is_playing = true;
                }
            }
            FocusAction::Teardown => {
                // The tracker already gave the handle back
                self.release_player();
            }
        }
        self.publish();
    }

    pub fn on_connectivity_changed(&mut self, reachable: bool) {
        if reachable {
            self.state.has_connection = true;
            self.publish();
            return;
        }

        self.state.has_connection = false;
        if self.has_player() {
            warn!("Network connection lost, stopping stream");
            self.notify(UiEvent::notice("Network connection lost"));
            self.stop();
        }
        self.publish();
    }

    /// The service refused to start because the station is unreachable
    pub fn on_start_without_network(&mut self) {
        self.state.has_connection = false;
        self.notify(UiEvent::notice("No Network Connection"));
        self.notify(UiEvent::SetInactive);
        self.publish();
    }

    /// Returns whether there was a player to release
    fn release_player(&mut self) -> bool {
        let released = match std::mem::replace(&mut self.slot, PlayerSlot::Empty) {
            PlayerSlot::Empty => false,
            PlayerSlot::Preparing { mut player, id } | PlayerSlot::Ready { mut player, id } => {
                player.release();
                info!(id, "Stream released");
                true
            }
        };

        self.state.is_playing = false;
        self.state.is_preparing = false;
        if released {
            self.notify(UiEvent::SetInactive);
        }
        self.publish();
        released
    }

    fn notify(&self, event: UiEvent) {
        // No subscribers is fine: the UI may not be open
        let _ = self.ui.send(event);
    }

    fn publish(&self) {
        debug_assert!(!(self.state.is_playing && self.state.is_preparing));
        self.published.send_if_modified(|current| {
            let changed = *current != self.state;
            *current = self.state;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::testing::{FakePlayerFactory, PlayerCall};
    use crate::error::PlaybackError;
    use crate::focus::testing::FakeFocus;
    use tokio::sync::mpsc;

    struct Harness {
        controller: StreamController,
        players: Arc<FakePlayerFactory>,
        focus: Arc<FakeFocus>,
        ui: broadcast::Receiver<UiEvent>,
        published: watch::Receiver<PlaybackState>,
        _events: mpsc::UnboundedReceiver<crate::events::ServiceEvent>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_focus(FakeFocus::default())
        }

        fn with_focus(focus: FakeFocus) -> Self {
            let players = Arc::new(FakePlayerFactory::default());
            let focus = Arc::new(focus);
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let (ui_tx, ui_rx) = broadcast::channel(32);
            let (state_tx, state_rx) = watch::channel(PlaybackState::default());

            let controller = StreamController::new(
                StreamSource::new("https://audio-mp3.ibiblio.org/wxyc.mp3").unwrap(),
                players.clone(),
                focus.clone(),
                0.8,
                events_tx,
                ui_tx,
                state_tx,
            );

            Self {
                controller,
                players,
                focus,
                ui: ui_rx,
                published: state_rx,
                _events: events_rx,
            }
        }

        fn ui_events(&mut self) -> Vec<UiEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.ui.try_recv() {
                events.push(event);
            }
            events
        }

        /// Start unmuted and complete preparation
        fn playing(mut self) -> Self {
            self.controller.start(false);
            self.controller.on_player_event(PlayerEvent::Prepared(1));
            self.ui_events();
            self
        }
    }

    #[test]
    fn test_unmuted_start_prepares_then_plays() {
        let mut h = Harness::new();
        h.controller.start(false);

        let state = h.controller.state();
        assert!(state.is_preparing);
        assert!(!state.is_playing);
        assert!(!state.is_muted);
        assert_eq!(h.controller.focus_state(), FocusState::Focused);
        assert_eq!(h.players.calls(), vec![PlayerCall::SetVolume(0.8), PlayerCall::Prepare(1)]);

        h.controller.on_player_event(PlayerEvent::Prepared(1));

        let state = h.controller.state();
        assert!(state.is_playing);
        assert!(!state.is_preparing);
        assert_eq!(h.players.count(&PlayerCall::Start), 1);
        assert_eq!(h.ui_events(), vec![UiEvent::SetActive]);
        assert_eq!(*h.published.borrow(), state);
    }

    #[test]
    fn test_unmuted_start_without_focus_creates_nothing() {
        let mut h = Harness::with_focus(FakeFocus::denying());
        h.controller.start(false);

        assert_eq!(h.players.created(), 0);
        assert!(!h.controller.has_player());
        assert!(!h.controller.state().is_playing);
        assert!(!h.controller.state().is_preparing);
    }

    #[test]
    fn test_muted_start_is_silent_and_unfocused() {
        let mut h = Harness::with_focus(FakeFocus::denying());
        h.controller.start(true);

        assert!(h.controller.state().is_muted);
        assert_eq!(h.players.last_volume(), Some(0.0));
        assert_eq!(h.focus.requests.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(h.controller.focus_state(), FocusState::Unfocused);

        h.controller.on_player_event(PlayerEvent::Prepared(1));
        assert!(h.controller.state().is_playing);
        assert!(h.controller.state().is_muted);
    }

    #[test]
    fn test_mute_then_unmute_restores_volume() {
        let mut h = Harness::new().playing();

        h.controller.mute();
        assert!(h.controller.state().is_muted);
        assert_eq!(h.players.last_volume(), Some(0.0));
        assert_eq!(h.controller.focus_state(), FocusState::Unfocused);
        assert_eq!(h.focus.abandon_count(), 1);

        h.controller.unmute();
        assert!(!h.controller.state().is_muted);
        assert_eq!(h.players.last_volume(), Some(0.8));
        assert_eq!(h.controller.focus_state(), FocusState::Focused);
        assert!(h.controller.state().is_playing);
    }

    #[test]
    fn test_unmute_denied_stays_muted() {
        let mut h = Harness::new().playing();
        h.controller.mute();
        h.focus.set_deny(true);

        h.controller.unmute();
        assert!(h.controller.state().is_muted);
        assert_eq!(h.players.last_volume(), Some(0.0));
        assert_eq!(h.controller.focus_state(), FocusState::Unfocused);
    }

    #[test]
    fn test_unmute_without_player_holds_no_focus() {
        let mut h = Harness::new();
        h.controller.mute();
        h.controller.unmute();

        assert!(!h.controller.state().is_muted);
        assert_eq!(h.focus.requests.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(h.controller.focus_state(), FocusState::Unfocused);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut h = Harness::new().playing();

        h.controller.stop();
        assert!(!h.controller.has_player());
        assert!(!h.controller.state().is_playing);
        assert_eq!(h.ui_events(), vec![UiEvent::SetInactive]);
        assert_eq!(h.focus.abandon_count(), 1);

        h.controller.stop();
        assert!(h.ui_events().is_empty());
        assert_eq!(h.players.count(&PlayerCall::Release), 1);
        assert_eq!(h.focus.abandon_count(), 1);
    }

    #[test]
    fn test_stop_without_start_does_nothing() {
        let mut h = Harness::new();
        h.controller.stop();
        assert!(h.ui_events().is_empty());
        assert_eq!(h.focus.abandon_count(), 0);
    }

    #[test]
    fn test_focus_sequences_track_last_outcome() {
        let mut h = Harness::new().playing();
        let script = [
            (FocusChange::LossTransient, false),
            (FocusChange::Gain, true),
            (FocusChange::LossTransient, false),
            (FocusChange::LossTransient, false),
            (FocusChange::Gain, true),
            (FocusChange::Gain, true),
        ];

        for (change, playing) in script {
            h.controller.on_focus_change(change);
            assert_eq!(h.controller.state().is_playing, playing, "after {:?}", change);
        }
        assert_eq!(h.players.count(&PlayerCall::Pause), 2);
        assert_eq!(h.players.count(&PlayerCall::Start), 3);
    }

    #[test]
    fn test_permanent_focus_loss_releases_everything() {
        let mut h = Harness::new().playing();
        h.controller.on_focus_change(FocusChange::Loss);

        assert!(!h.controller.has_player());
        assert!(!h.controller.state().is_playing);
        assert_eq!(h.controller.focus_state(), FocusState::Unfocused);
        assert_eq!(h.players.count(&PlayerCall::Release), 1);
        assert_eq!(h.focus.abandon_count(), 1);
        assert_eq!(h.ui_events(), vec![UiEvent::SetInactive]);

        // Regain after a permanent loss is not ours to act on
        h.controller.on_focus_change(FocusChange::Gain);
        assert!(!h.controller.state().is_playing);
    }

    #[test]
    fn test_prepared_during_transient_loss_holds_playback() {
        let mut h = Harness::new();
        h.controller.start(false);
        h.controller.on_focus_change(FocusChange::LossTransient);

        h.controller.on_player_event(PlayerEvent::Prepared(1));
        assert!(!h.controller.state().is_playing);
        assert!(!h.controller.state().is_preparing);
        assert_eq!(h.players.count(&PlayerCall::Start), 0);

        h.controller.on_focus_change(FocusChange::Gain);
        assert!(h.controller.state().is_playing);
    }

    #[test]
    fn test_preparation_failure_releases_silently() {
        let mut h = Harness::new();
        h.controller.start(false);
        h.controller.on_player_event(PlayerEvent::Failed(
            1,
            PlaybackError::preparation("unsupported format"),
        ));

        let state = h.controller.state();
        assert!(!state.is_preparing);
        assert!(!state.is_playing);
        assert!(!h.controller.has_player());
        assert_eq!(h.controller.focus_state(), FocusState::Unfocused);
        assert_eq!(h.ui_events(), vec![UiEvent::SetInactive]);
    }

    #[test]
    fn test_results_from_released_player_are_ignored() {
        let mut h = Harness::new();
        h.controller.start(false);
        h.controller.stop();
        h.controller.start(false);

        h.controller.on_player_event(PlayerEvent::Prepared(1));
        assert!(h.controller.state().is_preparing);
        assert!(!h.controller.state().is_playing);

        h.controller.on_player_event(PlayerEvent::Failed(1, PlaybackError::preparation("late")));
        assert!(h.controller.has_player());

        h.controller.on_player_event(PlayerEvent::Prepared(2));
        assert!(h.controller.state().is_playing);
    }

    #[test]
    fn test_connectivity_loss_while_playing_stops_once() {
        let mut h = Harness::new().playing();

        h.controller.on_connectivity_changed(false);
        h.controller.on_connectivity_changed(false);

        let state = h.controller.state();
        assert!(!state.has_connection);
        assert!(!state.is_playing);
        assert_eq!(h.players.count(&PlayerCall::Release), 1);
        assert_eq!(
            h.ui_events(),
            vec![UiEvent::notice("Network connection lost"), UiEvent::SetInactive]
        );
    }

    #[test]
    fn test_connectivity_restored_only_sets_flag() {
        let mut h = Harness::new();
        h.controller.on_connectivity_changed(false);
        assert!(!h.controller.state().has_connection);
        assert!(h.ui_events().is_empty());

        h.controller.on_connectivity_changed(true);
        assert!(h.controller.state().has_connection);
        assert!(!h.controller.has_player());
    }

    #[test]
    fn test_start_while_running_applies_mute_state() {
        let mut h = Harness::new();
        h.controller.start(true);
        h.controller.on_player_event(PlayerEvent::Prepared(1));

        h.controller.start(false);
        assert_eq!(h.players.created(), 1);
        assert!(!h.controller.state().is_muted);
        assert_eq!(h.players.last_volume(), Some(0.8));
    }

    #[test]
    fn test_start_without_network_reports_and_goes_inactive() {
        let mut h = Harness::new();
        h.controller.on_start_without_network();

        assert!(!h.controller.state().has_connection);
        assert_eq!(
            h.ui_events(),
            vec![UiEvent::notice("No Network Connection"), UiEvent::SetInactive]
        );
    }

    #[test]
    fn test_playing_and_preparing_never_both_true() {
        let mut h = Harness::new();
        let check = |c: &StreamController| {
            let s = c.state();
            assert!(!(s.is_playing && s.is_preparing));
        };

        h.controller.start(false);
        check(&h.controller);
        h.controller.on_focus_change(FocusChange::LossTransient);
        check(&h.controller);
        h.controller.on_focus_change(FocusChange::Gain);
        check(&h.controller);
        h.controller.on_player_event(PlayerEvent::Prepared(1));
        check(&h.controller);
        h.controller.on_connectivity_changed(false);
        check(&h.controller);
    }
}
