//! StreamController: owns the single playback session.
//!
//! ```text
//!   Idle ──select──▶ Loading ──play ok──▶ Playing ──toggle──▶ Paused
//!                     ▲  │                    ▲                  │
//!                     │  └──play err──▶ Error │                  │
//!                     └──── toggle (resume) ──┴─── play ok ──────┘
//!   any ──stop──▶ Idle
//! ```
//!
//! Two locks.  `state` guards the snapshot and is only held for short,
//! non-blocking sections, so readers never wait on the output.  `binding`
//! serialises the calls that rebind the output (halt, set_source, volume).
//!
//! Every select, pause, resume and stop bumps `generation` under `state`.
//! Output work started under an older generation is abandoned, and a `play()`
//! completion is applied only if its generation is still current, so the most
//! recent request always wins.  Output events carry the [`SourceId`] they
//! belong to and are dropped unless it is the bound one.

use std::sync::Arc;

use globe_proto::protocol::{PlaybackStatus, PlayerSnapshot, Station};
use reqwest::Url;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::directory::PlayTracker;
use crate::error::PlayerError;
use crate::output::{AudioOutput, OutputEvent, SourceId};
use crate::BroadcastMessage;

pub const LOAD_FAILED: &str = "Failed to play stream. Try another station.";
pub const STREAM_FAILED: &str = "Failed to load stream. Try another station.";
pub const RESUME_FAILED: &str = "Failed to resume playback.";

/// How a `select_station` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Started,
    Failed,
    /// A newer select or stop took over before this load finished.
    Superseded,
}

#[derive(Debug)]
struct PlayerState {
    rev: u64,
    generation: u64,
    station: Option<Station>,
    /// Source currently bound on the output for `station`.
    source: Option<SourceId>,
    status: PlaybackStatus,
    error: Option<String>,
    volume: f32,
}

pub struct StreamController {
    output: Arc<dyn AudioOutput>,
    tracker: Arc<dyn PlayTracker>,
    state: RwLock<PlayerState>,
    binding: Mutex<()>,
    changes: broadcast::Sender<BroadcastMessage>,
}

impl StreamController {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        tracker: Arc<dyn PlayTracker>,
        initial_volume: f32,
        changes: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        let volume = if initial_volume.is_nan() {
            0.0
        } else {
            initial_volume.clamp(0.0, 1.0)
        };
        Self {
            output,
            tracker,
            state: RwLock::new(PlayerState {
                rev: 1,
                generation: 0,
                station: None,
                source: None,
                status: PlaybackStatus::Idle,
                error: None,
                volume,
            }),
            binding: Mutex::new(()),
            changes,
        }
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.read().await;
        PlayerSnapshot {
            rev: state.rev,
            station: state.station.clone(),
            status: state.status,
            is_playing: state.status == PlaybackStatus::Playing,
            is_loading: state.status == PlaybackStatus::Loading,
            error: state.error.clone(),
            volume: state.volume,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.changes.subscribe()
    }

    /// Tear down whatever is playing, bind `station` and start it.
    pub async fn select_station(&self, station: Station) -> LoadOutcome {
        let locator = station.stream_url().to_string();
        let generation = {
            let mut state = self.state.write().await;
            state.generation += 1;
            info!("player: selecting '{}' ({})", station.name, locator);
            state.station = Some(station);
            state.source = None;
            state.status = PlaybackStatus::Loading;
            state.error = None;
            self.commit(&mut state);
            state.generation
        };

        let binding = self.binding.lock().await;
        if self.is_stale(generation).await {
            return LoadOutcome::Superseded;
        }
        if let Err(e) = self.output.halt().await {
            debug!("player: halt before select failed: {}", e);
        }
        if let Err(e) = validate_locator(&locator) {
            warn!("player: {}", e);
            return self.fail_load(generation).await;
        }
        let source = match self.output.set_source(&locator).await {
            Ok(source) => source,
            Err(e) => {
                warn!("player: could not bind {}: {}", locator, e);
                return self.fail_load(generation).await;
            }
        };
        let volume = {
            let mut state = self.state.write().await;
            if state.generation != generation {
                debug!("player: bind of gen {} superseded", generation);
                return LoadOutcome::Superseded;
            }
            state.source = Some(source);
            state.volume
        };
        if let Err(e) = self.output.set_volume(volume).await {
            debug!("player: could not apply volume: {}", e);
        }
        drop(binding);

        let started = self.output.play().await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("player: discarding stale load result (gen {})", generation);
            return LoadOutcome::Superseded;
        }
        match started {
            Ok(()) => {
                state.status = PlaybackStatus::Playing;
                state.error = None;
                self.commit(&mut state);
                if let Some(station) = &state.station {
                    self.dispatch_played(station.stationuuid.clone());
                }
                LoadOutcome::Started
            }
            Err(e) => {
                warn!("player: stream failed to start: {}", e);
                self.fail(&mut state, LOAD_FAILED);
                LoadOutcome::Failed
            }
        }
    }

    /// Pause when playing, resume when paused or failed.  Does nothing without
    /// a bound station or while a load is still pending.  A resume shows as
    /// `Loading` until the output reports audio.
    pub async fn toggle_playback(&self) {
        let (generation, resume) = {
            let mut state = self.state.write().await;
            if state.station.is_none() {
                return;
            }
            let resume = match state.status {
                PlaybackStatus::Idle | PlaybackStatus::Loading => return,
                PlaybackStatus::Playing => {
                    state.status = PlaybackStatus::Paused;
                    false
                }
                PlaybackStatus::Paused | PlaybackStatus::Error => {
                    state.status = PlaybackStatus::Loading;
                    state.error = None;
                    true
                }
            };
            state.generation += 1;
            self.commit(&mut state);
            (state.generation, resume)
        };

        if !resume {
            let _binding = self.binding.lock().await;
            if !self.is_stale(generation).await {
                if let Err(e) = self.output.pause().await {
                    warn!("player: pause failed: {}", e);
                }
            }
            return;
        }

        let resumed = self.output.play().await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("player: discarding stale resume result (gen {})", generation);
            return;
        }
        match resumed {
            Ok(()) => {
                state.status = PlaybackStatus::Playing;
                self.commit(&mut state);
            }
            Err(e) => {
                warn!("player: resume failed: {}", e);
                self.fail(&mut state, RESUME_FAILED);
            }
        }
    }

    /// Release the output and forget the station.  Always lands in `Idle`.
    pub async fn stop(&self) {
        let generation = {
            let mut state = self.state.write().await;
            state.generation += 1;
            state.station = None;
            state.source = None;
            state.status = PlaybackStatus::Idle;
            state.error = None;
            self.commit(&mut state);
            state.generation
        };

        let _binding = self.binding.lock().await;
        // A newer select has already halted and rebound the output.
        if self.is_stale(generation).await {
            return;
        }
        if let Err(e) = self.output.halt().await {
            debug!("player: halt on stop failed: {}", e);
        }
    }

    /// Set the volume, clamped to `0.0..=1.0`.  The level is kept for later
    /// sessions.  Returns the level actually applied.
    pub async fn set_volume(&self, level: f32) -> Result<f32, PlayerError> {
        if level.is_nan() {
            return Err(PlayerError::InvalidVolume(level));
        }
        let level = level.clamp(0.0, 1.0);

        let bound = {
            let mut state = self.state.write().await;
            state.volume = level;
            self.commit(&mut state);
            state.source.is_some()
        };
        if bound {
            let _binding = self.binding.lock().await;
            // Apply whatever is newest by the time the output is ours.
            let volume = self.state.read().await.volume;
            if let Err(e) = self.output.set_volume(volume).await {
                warn!("player: could not apply volume: {}", e);
            }
        }
        Ok(level)
    }

    /// Apply a notification raised by the output on its own.  Events for any
    /// source other than the bound one are stale and dropped.
    pub async fn handle_output_event(&self, source: SourceId, event: OutputEvent) {
        let mut state = self.state.write().await;
        if state.source != Some(source) {
            debug!("player: dropping {:?} for unbound source {:?}", event, source);
            return;
        }
        match (event, state.status) {
            (_, PlaybackStatus::Idle) => {}
            (OutputEvent::Ready, status) => {
                debug!("player: output ready ({:?})", status);
            }
            (
                OutputEvent::Error(reason),
                PlaybackStatus::Loading | PlaybackStatus::Playing | PlaybackStatus::Paused,
            ) => {
                warn!("player: output error: {}", reason);
                self.fail(&mut state, STREAM_FAILED);
            }
            (OutputEvent::Ended, PlaybackStatus::Playing) => {
                info!("player: stream ended");
                state.status = PlaybackStatus::Paused;
                self.commit(&mut state);
            }
            (event, status) => {
                debug!("player: ignoring {:?} while {:?}", event, status);
            }
        }
    }

    async fn is_stale(&self, generation: u64) -> bool {
        self.state.read().await.generation != generation
    }

    async fn fail_load(&self, generation: u64) -> LoadOutcome {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return LoadOutcome::Superseded;
        }
        self.fail(&mut state, LOAD_FAILED);
        LoadOutcome::Failed
    }

    fn fail(&self, state: &mut PlayerState, message: &str) {
        state.status = PlaybackStatus::Error;
        state.error = Some(message.to_string());
        self.commit(state);
    }

    fn commit(&self, state: &mut PlayerState) {
        state.rev += 1;
        // No receivers is fine.
        let _ = self.changes.send(BroadcastMessage::PlayerUpdated);
    }

    fn dispatch_played(&self, stationuuid: String) {
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            tracker.notify_played(&stationuuid).await;
        });
    }
}

/// Only absolute http(s) URLs with a host are handed to the output.
fn validate_locator(locator: &str) -> Result<Url, PlayerError> {
    let invalid = || PlayerError::InvalidLocator(locator.to_string());
    let url = Url::parse(locator).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
        _ => Err(invalid()),
    }
}
