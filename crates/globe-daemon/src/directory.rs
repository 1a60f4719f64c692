//! Radio directory client with ordered replica failover.
//!
//! Every query walks the configured server list in order.  A transport error
//! or a non-success status moves on to the next server; the first success
//! wins and its body is decoded.  When the list runs out the call fails with
//! [`DirectoryError::Unavailable`].  There is no backoff and no merging of
//! partial results.

use async_trait::async_trait;
use globe_proto::config::DirectoryConfig;
use globe_proto::protocol::{Country, SearchKind, Station, Tag};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::DirectoryError;

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Receives "station was played" notifications.  Implementations must not
/// surface failures; callers dispatch and forget.
#[async_trait]
pub trait PlayTracker: Send + Sync {
    async fn notify_played(&self, stationuuid: &str);
}

#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: Client,
    servers: Vec<Url>,
}

impl DirectoryClient {
    pub fn new<S: AsRef<str>>(servers: &[S], user_agent: &str) -> Result<Self> {
        let servers = servers
            .iter()
            .map(|s| {
                let raw = s.as_ref().trim_end_matches('/');
                match Url::parse(raw) {
                    Ok(url) if !url.cannot_be_a_base() => Ok(url),
                    _ => Err(DirectoryError::InvalidUrl(s.as_ref().to_string())),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(DirectoryError::Client)?;

        Ok(Self { client, servers })
    }

    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        Self::new(&config.servers, &config.user_agent)
    }

    pub fn servers(&self) -> &[Url] {
        &self.servers
    }

    // ── queries ───────────────────────────────────────────────────────────────

    /// Stations whose country code matches `code` exactly.
    pub async fn by_country(&self, code: &str, limit: usize) -> Result<Vec<Station>> {
        let query = ranked_query(limit);
        self.fetch_stations(&["stations", "bycountrycodeexact", code], &query, limit)
            .await
    }

    /// Free-text search scoped to one of name, country name or tag.
    pub async fn search(&self, text: &str, kind: SearchKind, limit: usize) -> Result<Vec<Station>> {
        let query = ranked_query(limit);
        self.fetch_stations(&["stations", kind.endpoint(), text], &query, limit)
            .await
    }

    pub async fn by_name(&self, name: &str, limit: usize) -> Result<Vec<Station>> {
        self.search(name, SearchKind::Name, limit).await
    }

    pub async fn by_country_name(&self, country: &str, limit: usize) -> Result<Vec<Station>> {
        self.search(country, SearchKind::Country, limit).await
    }

    pub async fn by_tag(&self, tag: &str, limit: usize) -> Result<Vec<Station>> {
        self.search(tag, SearchKind::Tag, limit).await
    }

    /// The `limit` most clicked stations.
    pub async fn top_stations(&self, limit: usize) -> Result<Vec<Station>> {
        let limit_segment = limit.to_string();
        let query = [("hidebroken", "true".to_string())];
        self.fetch_stations(&["stations", "topclick", &limit_segment], &query, limit)
            .await
    }

    /// Tags ordered by how many stations carry them.
    pub async fn popular_tags(&self, limit: usize) -> Result<Vec<Tag>> {
        let query = [
            ("order", "stationcount".to_string()),
            ("reverse", "true".to_string()),
            ("limit", limit.to_string()),
        ];
        let mut tags: Vec<Tag> = self.fetch_json(&["tags"], &query).await?;
        tags.truncate(limit);
        Ok(tags)
    }

    /// Every country the directory knows about, with station counts.
    pub async fn countries(&self) -> Result<Vec<Country>> {
        self.fetch_json(&["countries"], &[]).await
    }

    /// Count a click for `stationuuid`.  Never fails.
    pub async fn notify_played(&self, stationuuid: &str) {
        match self.fetch_with_fallback(&["url", stationuuid], &[]).await {
            Ok(_) => debug!("directory: click recorded for {}", stationuuid),
            Err(e) => debug!("directory: click for {} not recorded: {}", stationuuid, e),
        }
    }

    // ── plumbing ──────────────────────────────────────────────────────────────

    async fn fetch_stations(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        limit: usize,
    ) -> Result<Vec<Station>> {
        let mut stations: Vec<Station> = self.fetch_json(segments, query).await?;
        stations.truncate(limit);
        Ok(stations)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.fetch_with_fallback(segments, query).await?;
        let server = response.url().origin().ascii_serialization();
        response
            .json::<T>()
            .await
            .map_err(|source| DirectoryError::Decode { server, source })
    }

    async fn fetch_with_fallback(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Response> {
        for server in &self.servers {
            let url = endpoint_url(server, segments, query);
            match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("directory: {} -> {}", url, response.status());
                    return Ok(response);
                }
                Ok(response) => {
                    warn!("directory: {} returned {}, trying next server", url, response.status());
                }
                Err(e) => {
                    warn!("directory: {} failed: {}, trying next server", url, e);
                }
            }
        }
        Err(DirectoryError::Unavailable(self.servers.len()))
    }
}

#[async_trait]
impl PlayTracker for DirectoryClient {
    async fn notify_played(&self, stationuuid: &str) {
        DirectoryClient::notify_played(self, stationuuid).await
    }
}

/// Ask the server for the most clicked, working streams first.
fn ranked_query(limit: usize) -> [(&'static str, String); 4] {
    [
        ("limit", limit.to_string()),
        ("order", "clickcount".to_string()),
        ("reverse", "true".to_string()),
        ("hidebroken", "true".to_string()),
    ]
}

/// Append `segments` to the server's base path.  Each segment is encoded on
/// its own, so free text containing `/` or spaces stays a single segment.
fn endpoint_url(server: &Url, segments: &[&str], query: &[(&str, String)]) -> Url {
    let mut url = server.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    url
}
