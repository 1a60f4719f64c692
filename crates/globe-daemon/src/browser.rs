//! Browser: the station list a front-end renders next to the globe.
//!
//! Each list request takes a new generation number before it reaches the
//! network.  When results arrive late for a superseded request they are
//! dropped, so the list always reflects the most recent click or search.
//! A directory outage shows up as an empty list and a warning in the log.

use std::sync::Arc;

use globe_proto::config::DirectoryConfig;
use globe_proto::markers::{self, CountryMarker};
use globe_proto::protocol::{BrowserSnapshot, SearchKind, Station};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::directory::DirectoryClient;
use crate::error::DirectoryError;
use crate::BroadcastMessage;

pub const POPULAR_TITLE: &str = "Popular Stations";

#[derive(Debug, Clone, Copy)]
pub struct ListLimits {
    pub stations: usize,
    pub top: usize,
    pub tags: usize,
}

impl From<&DirectoryConfig> for ListLimits {
    fn from(config: &DirectoryConfig) -> Self {
        Self {
            stations: config.station_limit,
            top: config.top_limit,
            tags: config.tag_limit,
        }
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    snapshot: BrowserSnapshot,
    generation: u64,
}

pub struct Browser {
    directory: Arc<DirectoryClient>,
    limits: ListLimits,
    state: RwLock<BrowserState>,
    changes: broadcast::Sender<BroadcastMessage>,
}

impl Browser {
    pub fn new(
        directory: Arc<DirectoryClient>,
        limits: ListLimits,
        changes: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        let snapshot = BrowserSnapshot {
            rev: 1,
            title: POPULAR_TITLE.to_string(),
            ..Default::default()
        };
        Self {
            directory,
            limits,
            state: RwLock::new(BrowserState {
                snapshot,
                generation: 0,
            }),
            changes,
        }
    }

    pub async fn snapshot(&self) -> BrowserSnapshot {
        self.state.read().await.snapshot.clone()
    }

    /// Look up a station in the list currently on screen.
    pub async fn find_station(&self, stationuuid: &str) -> Option<Station> {
        let state = self.state.read().await;
        state
            .snapshot
            .stations
            .iter()
            .find(|s| s.stationuuid == stationuuid)
            .cloned()
    }

    /// Popular stations and popular tags, fetched together.
    pub async fn load_initial(&self) {
        let generation = self.begin(POPULAR_TITLE.to_string(), None).await;
        let (stations, tags) = tokio::join!(
            self.directory.top_stations(self.limits.top),
            self.directory.popular_tags(self.limits.tags),
        );

        match tags {
            Ok(tags) => {
                let mut state = self.state.write().await;
                if state.generation == generation {
                    state.snapshot.popular_tags = tags;
                    self.commit(&mut state);
                } else {
                    debug!("browser: discarding stale tags (gen {})", generation);
                }
            }
            Err(e) => warn!("browser: could not load popular tags: {}", e),
        }
        self.finish(generation, stations).await;
    }

    /// Show the stations of one country.  Returns `None` for a code with no
    /// marker, leaving the list untouched.
    pub async fn select_country(&self, code: &str) -> Option<CountryMarker> {
        let Some(marker) = markers::by_code(code) else {
            debug!("browser: no marker for country code {:?}", code);
            return None;
        };
        info!("browser: country {} ({})", marker.name, marker.code);

        let title = format!("Stations in {}", marker.name);
        let generation = self.begin(title, Some(marker.clone())).await;
        let result = self
            .directory
            .by_country(&marker.code, self.limits.stations)
            .await;
        self.finish(generation, result).await;
        Some(marker)
    }

    /// Free-text search.  Blank queries are ignored.
    pub async fn search(&self, query: &str, kind: SearchKind) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        info!("browser: search {:?} by {:?}", query, kind);

        let title = format!("{}: \"{}\"", kind.label(), query);
        let generation = self.begin(title, None).await;
        let result = self
            .directory
            .search(query, kind, self.limits.stations)
            .await;
        self.finish(generation, result).await;
    }

    /// Drop the country filter and go back to the popular list.
    pub async fn clear_country(&self) {
        let generation = self.begin(POPULAR_TITLE.to_string(), None).await;
        let result = self.directory.top_stations(self.limits.top).await;
        self.finish(generation, result).await;
    }

    /// Globe markers, annotated with station counts when the directory
    /// answers.
    pub async fn countries(&self) -> Vec<CountryMarker> {
        match self.directory.countries().await {
            Ok(countries) => markers::with_station_counts(markers::all(), &countries),
            Err(e) => {
                warn!("browser: country listing unavailable: {}", e);
                markers::all()
            }
        }
    }

    async fn begin(&self, title: String, country: Option<CountryMarker>) -> u64 {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.snapshot.title = title;
        state.snapshot.selected_country = country;
        state.snapshot.is_loading = true;
        self.commit(&mut state);
        state.generation
    }

    async fn finish(&self, generation: u64, result: Result<Vec<Station>, DirectoryError>) {
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!("browser: discarding stale list (gen {})", generation);
            return;
        }
        state.snapshot.stations = match result {
            Ok(stations) => stations,
            Err(e) => {
                warn!("browser: {}", e);
                Vec::new()
            }
        };
        state.snapshot.is_loading = false;
        self.commit(&mut state);
    }

    fn commit(&self, state: &mut BrowserState) {
        state.snapshot.rev += 1;
        let _ = self.changes.send(BroadcastMessage::BrowserUpdated);
    }
}
