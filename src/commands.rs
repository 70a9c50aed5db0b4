// UI-facing command handlers
// Each handler only enqueues work for the service loop, so they never block
// on playback and are safe to call from any task.
use std::fmt;
use std::str::FromStr;

use crate::events::ServiceEvent;
use crate::focus::FocusChange;
use crate::state::{AppState, PlaybackState};

/// Named action carried by a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartUnmuted,
    Mute,
    Unmute,
    Stop,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startUnmuted" => Ok(Command::StartUnmuted),
            "mute" => Ok(Command::Mute),
            "unmute" => Ok(Command::Unmute),
            "stop" => Ok(Command::Stop),
            other => Err(format!("Unknown action: {}", other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::StartUnmuted => "startUnmuted",
            Command::Mute => "mute",
            Command::Unmute => "unmute",
            Command::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Start request without an action: starts muted unless already running
pub fn start(state: &AppState) -> Result<(), String> {
    state.send(ServiceEvent::StartCommand(None))
}

pub fn start_unmuted(state: &AppState) -> Result<(), String> {
    state.send(ServiceEvent::StartCommand(Some(Command::StartUnmuted)))
}

pub fn mute(state: &AppState) -> Result<(), String> {
    state.send(ServiceEvent::StartCommand(Some(Command::Mute)))
}

pub fn unmute(state: &AppState) -> Result<(), String> {
    state.send(ServiceEvent::StartCommand(Some(Command::Unmute)))
}

pub fn stop(state: &AppState) -> Result<(), String> {
    state.send(ServiceEvent::StartCommand(Some(Command::Stop)))
}

/// Forward a focus change from the host's audio arbiter
pub fn report_focus_change(state: &AppState, change: FocusChange) -> Result<(), String> {
    state.send(ServiceEvent::FocusChanged(change))
}

pub fn destroy(state: &AppState) -> Result<(), String> {
    state.send(ServiceEvent::Destroy)
}

/// Send a start request carrying a raw action name, as the UI does
pub fn dispatch(state: &AppState, action: Option<&str>) -> Result<(), String> {
    let command = action.map(str::parse::<Command>).transpose()?;
    state.send(ServiceEvent::StartCommand(command))
}

pub fn get_player_state(state: &AppState) -> PlaybackState {
    state.player_state()
}
