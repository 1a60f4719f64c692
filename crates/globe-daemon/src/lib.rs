//! globe-radio daemon: stream playback, directory browsing and the local HTTP
//! API a globe front-end drives.

pub mod browser;
pub mod directory;
pub mod error;
pub mod http;
pub mod logging;
pub mod mpv;
pub mod output;
pub mod player;

/// Change notifications fanned out to every subscriber (SSE clients, tests).
/// Receivers re-read the matching snapshot; messages carry no state.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastMessage {
    PlayerUpdated,
    BrowserUpdated,
    /// A WARN/ERROR log line, already formatted.
    Log(String),
}
