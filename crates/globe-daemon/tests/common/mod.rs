//! Shared fixtures: a scripted audio output, a recording play tracker and an
//! axum stub of the radio directory.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use globe_daemon::directory::PlayTracker;
use globe_daemon::output::{AudioOutput, SourceId};
use globe_proto::protocol::{Country, Station, Tag};
use serde::Deserialize;
use tokio::sync::oneshot;

// ── audio output ──────────────────────────────────────────────────────────────

type Gate = oneshot::Receiver<Result<(), String>>;

/// Records every call.  `play()` succeeds unless the bound URL was marked as
/// failing, `fail_plays` is set, or a gate for the URL decides otherwise.
#[derive(Default)]
pub struct FakeOutput {
    calls: Mutex<Vec<String>>,
    source: Mutex<Option<String>>,
    source_id: Mutex<Option<SourceId>>,
    next_id: AtomicU64,
    volume: Mutex<Option<f32>>,
    gates: Mutex<HashMap<String, Gate>>,
    bind_gates: Mutex<HashMap<String, Gate>>,
    failing: Mutex<HashSet<String>>,
    fail_plays: AtomicBool,
}

impl FakeOutput {
    /// The next `play()` of `url` blocks until the returned sender fires.
    pub fn gate(&self, url: &str) -> oneshot::Sender<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }

    /// The next `set_source(url)` blocks until the returned sender fires.
    pub fn gate_bind(&self, url: &str) -> oneshot::Sender<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        self.bind_gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_fail_plays(&self, fail: bool) {
        self.fail_plays.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn source(&self) -> Option<String> {
        self.source.lock().unwrap().clone()
    }

    /// Id handed out by the latest `set_source`, cleared by `halt`.
    pub fn source_id(&self) -> Option<SourceId> {
        *self.source_id.lock().unwrap()
    }

    pub fn volume(&self) -> Option<f32> {
        *self.volume.lock().unwrap()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn set_source(&self, url: &str) -> anyhow::Result<SourceId> {
        self.record(format!("source {url}"));
        let gate = self.bind_gates.lock().unwrap().remove(url);
        if let Some(gate) = gate {
            match gate.await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => anyhow::bail!(reason),
                Err(_) => anyhow::bail!("gate dropped"),
            }
        }
        let id = SourceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        *self.source.lock().unwrap() = Some(url.to_string());
        *self.source_id.lock().unwrap() = Some(id);
        Ok(id)
    }

    async fn play(&self) -> anyhow::Result<()> {
        let Some(url) = self.source() else {
            self.record("play".to_string());
            anyhow::bail!("nothing bound");
        };
        self.record(format!("play {url}"));

        let gate = self.gates.lock().unwrap().remove(&url);
        if let Some(gate) = gate {
            return match gate.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(anyhow::anyhow!(reason)),
                Err(_) => Err(anyhow::anyhow!("gate dropped")),
            };
        }
        if self.fail_plays.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
            anyhow::bail!("cannot play {url}");
        }
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.record("pause".to_string());
        Ok(())
    }

    async fn halt(&self) -> anyhow::Result<()> {
        self.record("halt".to_string());
        *self.source.lock().unwrap() = None;
        *self.source_id.lock().unwrap() = None;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        self.record(format!("volume {volume}"));
        *self.volume.lock().unwrap() = Some(volume);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTracker {
    played: Mutex<Vec<String>>,
}

impl RecordingTracker {
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlayTracker for RecordingTracker {
    async fn notify_played(&self, stationuuid: &str) {
        self.played.lock().unwrap().push(stationuuid.to_string());
    }
}

// ── fixtures ──────────────────────────────────────────────────────────────────

pub fn station(uuid: &str, url: &str) -> Station {
    Station {
        stationuuid: uuid.to_string(),
        name: format!("Station {uuid}"),
        url: url.to_string(),
        ..Default::default()
    }
}

/// 60 stations, click counts strictly descending, country codes cycling
/// through DE, FR and JP.
pub fn fixture_stations() -> Vec<Station> {
    let codes = ["DE", "FR", "JP"];
    (0..60)
        .map(|i| Station {
            stationuuid: format!("uuid-{i:02}"),
            name: format!("Fixture {i}"),
            url: format!("http://streams.example.com/{i}"),
            url_resolved: format!("http://cdn.example.com/{i}.mp3"),
            countrycode: codes[i % codes.len()].to_string(),
            tags: "pop,news".to_string(),
            clickcount: 10_000 - i as i64 * 100,
            bitrate: 128,
            ..Default::default()
        })
        .collect()
}

pub fn fixture_tags() -> Vec<Tag> {
    ["pop", "rock", "news", "jazz", "classical"]
        .iter()
        .enumerate()
        .map(|(i, name)| Tag {
            name: name.to_string(),
            stationcount: 5_000 - i as u64 * 500,
        })
        .collect()
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

// ── directory stub ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubDirectory {
    pub stations: Vec<Station>,
    pub tags: Vec<Tag>,
    pub countries: Vec<Country>,
    /// Extra latency per country code.
    pub delays: HashMap<String, Duration>,
    /// Extra latency on the tag listing.
    pub tag_delay: Option<Duration>,
    hits: Mutex<Vec<String>>,
    user_agents: Mutex<Vec<String>>,
}

impl StubDirectory {
    pub fn with_fixtures() -> Self {
        Self {
            stations: fixture_stations(),
            tags: fixture_tags(),
            countries: vec![
                Country {
                    name: "Germany".into(),
                    iso_3166_1: "DE".into(),
                    stationcount: 20,
                },
                Country {
                    name: "France".into(),
                    iso_3166_1: "FR".into(),
                    stationcount: 20,
                },
            ],
            ..Default::default()
        }
    }

    /// Request targets (path and query) in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }

    fn record(&self, uri: &OriginalUri, headers: &HeaderMap) {
        self.hits.lock().unwrap().push(uri.0.to_string());
        if let Some(ua) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
            self.user_agents.lock().unwrap().push(ua.to_string());
        }
    }
}

#[derive(Deserialize)]
struct LimitParam {
    limit: Option<usize>,
}

type Stub = State<Arc<StubDirectory>>;

async fn topclick(
    State(stub): Stub,
    uri: OriginalUri,
    headers: HeaderMap,
    Path(_limit): Path<usize>,
) -> Json<Vec<Station>> {
    stub.record(&uri, &headers);
    // Deliberately ignores the limit: the client must cap.
    Json(stub.stations.clone())
}

async fn by_country_code(
    State(stub): Stub,
    uri: OriginalUri,
    headers: HeaderMap,
    Path(code): Path<String>,
    Query(params): Query<LimitParam>,
) -> Json<Vec<Station>> {
    stub.record(&uri, &headers);
    if let Some(delay) = stub.delays.get(&code) {
        tokio::time::sleep(*delay).await;
    }
    let stations = stub
        .stations
        .iter()
        .filter(|s| s.countrycode.eq_ignore_ascii_case(&code))
        .take(params.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    Json(stations)
}

async fn by_text(
    State(stub): Stub,
    uri: OriginalUri,
    headers: HeaderMap,
    Path(_text): Path<String>,
    Query(params): Query<LimitParam>,
) -> Json<Vec<Station>> {
    stub.record(&uri, &headers);
    let stations = stub
        .stations
        .iter()
        .take(params.limit.unwrap_or(usize::MAX).min(5))
        .cloned()
        .collect();
    Json(stations)
}

async fn tags(State(stub): Stub, uri: OriginalUri, headers: HeaderMap) -> Json<Vec<Tag>> {
    stub.record(&uri, &headers);
    if let Some(delay) = stub.tag_delay {
        tokio::time::sleep(delay).await;
    }
    Json(stub.tags.clone())
}

async fn countries(State(stub): Stub, uri: OriginalUri, headers: HeaderMap) -> Json<Vec<Country>> {
    stub.record(&uri, &headers);
    Json(stub.countries.clone())
}

async fn click(State(stub): Stub, uri: OriginalUri, headers: HeaderMap) -> StatusCode {
    stub.record(&uri, &headers);
    StatusCode::OK
}

/// Serve `stub` on an ephemeral port; returns the replica base URL.
pub async fn spawn_directory(stub: Arc<StubDirectory>) -> String {
    let api = Router::new()
        .route("/stations/topclick/:limit", get(topclick))
        .route("/stations/bycountrycodeexact/:code", get(by_country_code))
        .route("/stations/byname/:text", get(by_text))
        .route("/stations/bycountry/:text", get(by_text))
        .route("/stations/bytag/:text", get(by_text))
        .route("/tags", get(tags))
        .route("/countries", get(countries))
        .route("/url/:uuid", get(click))
        .with_state(stub);
    spawn_router(Router::new().nest("/json", api)).await
}

/// A replica that answers every request with `status`, counting hits.
pub async fn spawn_failing(status: StatusCode, hits: Arc<Mutex<usize>>) -> String {
    let app = Router::new().fallback(move || {
        let hits = hits.clone();
        async move {
            *hits.lock().unwrap() += 1;
            status
        }
    });
    spawn_router(app).await
}

/// A replica that answers 200 with a body that is not JSON.
pub async fn spawn_garbage() -> String {
    let app = Router::new().fallback(|| async { (StatusCode::OK, "<html>maintenance</html>") });
    spawn_router(app).await
}

/// An address nothing listens on.
pub fn dead_server() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/json")
}

async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/json")
}
