use serde::{Deserialize, Serialize};

/// A station entry as returned by the radio directory.  Field names follow the
/// directory's JSON so bodies decode without renames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Station {
    pub stationuuid: String,
    #[serde(default)]
    pub name: String,
    /// Stream URL as submitted to the directory.
    #[serde(default)]
    pub url: String,
    /// Stream URL after the directory followed playlists / redirects.
    #[serde(default)]
    pub url_resolved: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub favicon: String,
    /// Comma-joined free text, e.g. "jazz,smooth jazz,lounge".
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub countrycode: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default)]
    pub clickcount: i64,
    #[serde(default)]
    pub geo_lat: Option<f64>,
    #[serde(default)]
    pub geo_long: Option<f64>,
}

impl Station {
    /// The locator to hand to the audio output: the resolved URL when the
    /// directory provided one, otherwise the submitted URL.
    pub fn stream_url(&self) -> &str {
        let resolved = self.url_resolved.trim();
        if resolved.is_empty() {
            self.url.trim()
        } else {
            resolved
        }
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub stationcount: u64,
}

/// Entry of the directory's `/countries` listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Country {
    pub name: String,
    #[serde(default)]
    pub iso_3166_1: String,
    #[serde(default)]
    pub stationcount: u64,
}

/// Free-text search scope.  Exactly one applies per query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Name,
    Country,
    Tag,
}

impl SearchKind {
    /// Directory path segment for this scope.
    pub fn endpoint(self) -> &'static str {
        match self {
            SearchKind::Name => "byname",
            SearchKind::Country => "bycountry",
            SearchKind::Tag => "bytag",
        }
    }

    /// Prefix used when titling a result list.
    pub fn label(self) -> &'static str {
        match self {
            SearchKind::Name => "Search",
            SearchKind::Country => "Country",
            SearchKind::Tag => "Genre",
        }
    }
}

impl std::str::FromStr for SearchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SearchKind::Name),
            "country" => Ok(SearchKind::Country),
            "tag" => Ok(SearchKind::Tag),
            other => Err(format!("unknown search type: {other}")),
        }
    }
}

/// Playback lifecycle of the single stream session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // nothing bound / explicitly stopped
    Loading, // source set, waiting for audio
    Playing,
    Paused,
    Error, // load or resume failed; station stays bound
}

/// Read-only view of the stream controller.  `rev` increases on every change
/// so subscribers can skip duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub rev: u64,
    pub station: Option<Station>,
    pub status: PlaybackStatus,
    pub is_playing: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub volume: f32,
}

/// Read-only view of the station list the UI renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrowserSnapshot {
    pub rev: u64,
    pub title: String,
    pub stations: Vec<Station>,
    pub selected_country: Option<crate::markers::CountryMarker>,
    pub popular_tags: Vec<Tag>,
    pub is_loading: bool,
}
