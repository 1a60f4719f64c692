//! Local HTTP API: the UI boundary a globe front-end talks to.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use futures_util::stream::{self, Stream};
use globe_proto::markers::CountryMarker;
use globe_proto::protocol::{BrowserSnapshot, PlayerSnapshot, SearchKind};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::browser::Browser;
use crate::player::StreamController;
use crate::BroadcastMessage;

#[derive(Clone)]
pub struct AppState {
    pub player: Arc<StreamController>,
    pub browser: Arc<Browser>,
    pub changes: broadcast::Sender<BroadcastMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiState {
    pub player: PlayerSnapshot,
    pub browser: BrowserSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub volume: u8,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default, rename = "type")]
    pub kind: SearchKind,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/events", get(events))
        .route("/api/countries", get(countries))
        .route("/api/country/:code", post(select_country))
        .route("/api/country", delete(clear_country))
        .route("/api/search", get(search))
        .route("/api/play/:uuid", post(play_station))
        .route("/api/toggle", post(toggle))
        .route("/api/stop", post(stop))
        .route("/api/volume/:volume", post(set_volume))
        .route("/api/volume", get(get_volume))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: AppState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn api_state(state: &AppState) -> ApiState {
    ApiState {
        player: state.player.snapshot().await,
        browser: state.browser.snapshot().await,
    }
}

async fn get_state(State(state): State<AppState>) -> Json<ApiState> {
    Json(api_state(&state).await)
}

/// One `state` event per change, `log` events for warnings.
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.changes.subscribe();
    let stream = stream::unfold((rx, state), |(mut rx, state)| async move {
        let event = loop {
            match rx.recv().await {
                Ok(BroadcastMessage::Log(line)) => {
                    break Event::default().event("log").data(line.replace('\r', ""));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    match Event::default().event("state").json_data(api_state(&state).await) {
                        Ok(event) => break event,
                        Err(e) => return Some((Err(e), (rx, state))),
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        };
        Some((Ok(event), (rx, state)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn countries(State(state): State<AppState>) -> Json<Vec<CountryMarker>> {
    Json(state.browser.countries().await)
}

async fn select_country(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    info!("HTTP API: country {}", code);
    match state.browser.select_country(&code).await {
        Some(_) => Json(state.browser.snapshot().await).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown country code {code}")).into_response(),
    }
}

async fn clear_country(State(state): State<AppState>) -> Json<BrowserSnapshot> {
    info!("HTTP API: clear country");
    state.browser.clear_country().await;
    Json(state.browser.snapshot().await)
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<BrowserSnapshot> {
    info!("HTTP API: search {:?} ({:?})", params.q, params.kind);
    state.browser.search(&params.q, params.kind).await;
    Json(state.browser.snapshot().await)
}

/// Starts the load in the background; progress shows up in `/api/state`.
async fn play_station(State(state): State<AppState>, Path(uuid): Path<String>) -> StatusCode {
    let Some(station) = state.browser.find_station(&uuid).await else {
        return StatusCode::NOT_FOUND;
    };
    info!("HTTP API: play {} ({})", station.name, uuid);
    let player = Arc::clone(&state.player);
    tokio::spawn(async move {
        player.select_station(station).await;
    });
    StatusCode::ACCEPTED
}

async fn toggle(State(state): State<AppState>) -> Json<PlayerSnapshot> {
    info!("HTTP API: toggle");
    state.player.toggle_playback().await;
    Json(state.player.snapshot().await)
}

async fn stop(State(state): State<AppState>) -> Json<PlayerSnapshot> {
    info!("HTTP API: stop");
    state.player.stop().await;
    Json(state.player.snapshot().await)
}

async fn set_volume(State(state): State<AppState>, Path(volume): Path<i32>) -> Response {
    info!("HTTP API: volume {}%", volume);
    match state.player.set_volume(volume as f32 / 100.0).await {
        Ok(level) => Json(VolumeStatus {
            volume: (level * 100.0).round() as u8,
        })
        .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn get_volume(State(state): State<AppState>) -> Json<VolumeStatus> {
    let volume = state.player.snapshot().await.volume;
    Json(VolumeStatus {
        volume: (volume * 100.0).round() as u8,
    })
}
