/// mpv backend for the stream controller.
///
/// ```text
///   MpvOutput (AudioOutput)
///         │ ensure_handle(): spawn mpv on first use, respawn if it died
///         ▼
///   MpvDriver::spawn_and_connect()
///         ├── writer_task   ← MpvRequest via mpsc, serialised → socket
///         └── reader_task   ← JSON lines from socket
///                                ├── response (has request_id) → matching oneshot
///                                └── event / property-change   → broadcast
/// ```
///
/// `play()` waits on the broadcast for the first sign of audio (core-idle
/// turning false or playback-restart) or for an `end-file` error.  When mpv
/// has gone idle (stream ended or failed) it reloads the bound URL first.
/// `forward_events` turns the same broadcast into `OutputEvent`s tagged with
/// the bound `SourceId`; events for an older playlist entry are dropped.
///
/// Platform notes:
/// - Unix:    Unix domain socket
/// - Windows: named pipe  \\.\pipe\<name>
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::output::{AudioOutput, OutputEvent, SourceId};
use crate::player::StreamController;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// observe_property ids, matched in property-change events.
pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSE: u64 = 2;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // one JSON line, '\n' included
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An unsolicited mpv message (event or property change).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// `Some((obs_id, data))` for property-change events.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// For `end-file` events: the reason ("eof", "stop", "error", ...).
    pub fn end_reason(&self) -> Option<&str> {
        if self.event_name()? == "end-file" {
            self.raw.get("reason")?.as_str()
        } else {
            None
        }
    }

    /// mpv's playlist entry the event refers to, when it says.
    pub fn entry_id(&self) -> Option<u64> {
        self.raw.get("playlist_entry_id")?.as_u64()
    }

    fn file_error(&self) -> String {
        self.raw
            .get("file_error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string()
    }

    /// What this event says about a pending start: `Some(Ok)` once audio
    /// flows, `Some(Err)` if the file failed, `None` if it says nothing.
    pub fn readiness(&self) -> Option<Result<(), String>> {
        if let Some((OBS_CORE_IDLE, data)) = self.as_property_change() {
            return (data.as_bool() == Some(false)).then_some(Ok(()));
        }
        match self.event_name()? {
            "playback-restart" => Some(Ok(())),
            "end-file" if self.end_reason() == Some("error") => Some(Err(self.file_error())),
            _ => None,
        }
    }

    /// Notification for the stream controller, if any.
    pub fn to_output_event(&self) -> Option<OutputEvent> {
        match self.event_name()? {
            "playback-restart" => Some(OutputEvent::Ready),
            "end-file" => match self.end_reason()? {
                "error" => Some(OutputEvent::Error(self.file_error())),
                "eof" => Some(OutputEvent::Ended),
                _ => None,
            },
            _ => None,
        }
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Replace the current file.  Returns the new playlist entry id when mpv
    /// reports one (0.38+).
    pub async fn load(&self, url: &str) -> anyhow::Result<Option<u64>> {
        let resp = self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(resp["data"]["playlist_entry_id"].as_u64())
    }

    pub async fn load_paused(&self, url: &str) -> anyhow::Result<Option<u64>> {
        self.set_pause(true).await?;
        self.load(url).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }

    /// True while mpv is not producing audio (idle, buffering or paused).
    pub async fn core_idle(&self) -> anyhow::Result<bool> {
        let resp = self.send(json!(["get_property", "core-idle"])).await?;
        Ok(resp["data"].as_bool().unwrap_or(true))
    }

    /// True when no file is loaded (after `end-file`, or a fresh process).
    pub async fn idle_active(&self) -> anyhow::Result<bool> {
        let resp = self.send(json!(["get_property", "idle-active"])).await?;
        Ok(resp["data"].as_bool().unwrap_or(false))
    }

    /// Must be called after every fresh connection.
    pub async fn observe_properties(&self) {
        for (id, name) in [(OBS_CORE_IDLE, "core-idle"), (OBS_PAUSE, "pause")] {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and the live IPC handle.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    handle: Option<MpvHandle>,
    last_volume: f32,
}

impl MpvDriver {
    pub fn new(initial_volume: f32) -> Self {
        Self {
            socket_name: globe_proto::platform::mpv_socket_name(),
            process: None,
            handle: None,
            last_volume: initial_volume,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    pub async fn kill(&mut self) {
        self.handle = None;
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary = globe_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.last_volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        info!("mpv: spawning {}", mpv_binary.display());
        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(globe_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        events: broadcast::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;
        self.spawn_process()?;

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, events))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        events: broadcast::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, events));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, events: broadcast::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel; writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, events));

    MpvHandle { tx: cmd_tx }
}

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    events: broadcast::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let reply = pending.lock().await.remove(&req_id);
                    let Some(tx) = reply else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                        continue;
                    };
                    let result = match val["error"].as_str() {
                        Some("success") => Ok(val),
                        other => Err(anyhow::anyhow!(
                            "mpv error: {}",
                            other.unwrap_or("unknown error")
                        )),
                    };
                    let _ = tx.send(result);
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    // No subscribers is fine.
                    let _ = events.send(MpvEvent { raw: val });
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── AudioOutput ───────────────────────────────────────────────────────────────

/// What `set_source` last loaded.
#[derive(Debug, Clone)]
struct BoundSource {
    id: SourceId,
    url: String,
    entry_id: Option<u64>,
}

pub struct MpvOutput {
    driver: Mutex<MpvDriver>,
    /// Held across the IPC that loads or clears a file, so a reload in
    /// `play()` never races a rebind.
    bound: Mutex<Option<BoundSource>>,
    next_source: AtomicU64,
    events: broadcast::Sender<MpvEvent>,
    load_timeout: Duration,
}

impl MpvOutput {
    pub fn new(initial_volume: f32, load_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            driver: Mutex::new(MpvDriver::new(initial_volume)),
            bound: Mutex::new(None),
            next_source: AtomicU64::new(1),
            events,
            load_timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MpvEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(&self) {
        self.driver.lock().await.kill().await;
    }

    /// The bound source an event belongs to.  `None` when nothing is bound
    /// or the event names a different playlist entry.
    pub async fn source_of(&self, event: &MpvEvent) -> Option<SourceId> {
        let bound = self.bound.lock().await;
        owning_source(bound.as_ref()?, event)
    }

    /// Live handle, spawning (or respawning) mpv when needed.
    async fn ensure_handle(&self) -> anyhow::Result<MpvHandle> {
        let mut driver = self.driver.lock().await;
        if driver.handle.is_some() && driver.process_alive() {
            if let Some(handle) = driver.handle.clone() {
                return Ok(handle);
            }
        }
        if driver.handle.is_some() {
            warn!("mpv: process died, respawning");
        }
        let handle = driver.spawn_and_connect(self.events.clone()).await?;
        handle.observe_properties().await;
        driver.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Live handle without spawning.
    async fn current_handle(&self) -> Option<MpvHandle> {
        let mut driver = self.driver.lock().await;
        if driver.process_alive() {
            driver.handle.clone()
        } else {
            None
        }
    }
}

fn owning_source(bound: &BoundSource, event: &MpvEvent) -> Option<SourceId> {
    match (event.entry_id(), bound.entry_id) {
        (Some(event_entry), Some(bound_entry)) if event_entry != bound_entry => None,
        _ => Some(bound.id),
    }
}

/// Unpause the bound source, reloading it if mpv has nothing loaded.
/// Returns `true` when audio is already flowing.
async fn unpause_or_reload(handle: &MpvHandle, bound: &mut BoundSource) -> anyhow::Result<bool> {
    handle.set_pause(false).await?;
    if handle.idle_active().await? {
        info!("mpv: idle, reloading {}", bound.url);
        bound.entry_id = handle.load(&bound.url).await?;
        return Ok(false);
    }
    Ok(!handle.core_idle().await.unwrap_or(true))
}

/// Wait for the first sign of audio or a load error for `entry_id`.
async fn wait_ready(
    events: &mut broadcast::Receiver<MpvEvent>,
    entry_id: Option<u64>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(evt) => {
                    let ours = match (evt.entry_id(), entry_id) {
                        (Some(seen), Some(expected)) => seen == expected,
                        _ => true,
                    };
                    match evt.readiness() {
                        Some(Ok(())) => return Ok(()),
                        Some(Err(reason)) if ours => anyhow::bail!("mpv could not play: {}", reason),
                        _ => continue,
                    }
                }
                Err(RecvError::Lagged(n)) => debug!("mpv: play waiter lagged {} events", n),
                Err(RecvError::Closed) => anyhow::bail!("mpv event channel closed"),
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| anyhow::anyhow!("no audio from mpv after {:?}", timeout))?
}

#[async_trait]
impl AudioOutput for MpvOutput {
    async fn set_source(&self, url: &str) -> anyhow::Result<SourceId> {
        let handle = self.ensure_handle().await?;
        let mut bound = self.bound.lock().await;
        let entry_id = handle.load_paused(url).await?;
        let id = SourceId(self.next_source.fetch_add(1, Ordering::Relaxed));
        *bound = Some(BoundSource {
            id,
            url: url.to_string(),
            entry_id,
        });
        Ok(id)
    }

    async fn play(&self) -> anyhow::Result<()> {
        let handle = self.ensure_handle().await?;
        let mut events = self.events.subscribe();
        let entry_id = {
            let mut bound = self.bound.lock().await;
            let Some(source) = bound.as_mut() else {
                anyhow::bail!("no stream bound");
            };
            if unpause_or_reload(&handle, source).await? {
                return Ok(());
            }
            source.entry_id
        };
        wait_ready(&mut events, entry_id, self.load_timeout).await
    }

    async fn pause(&self) -> anyhow::Result<()> {
        match self.current_handle().await {
            Some(handle) => handle.set_pause(true).await,
            None => Ok(()),
        }
    }

    async fn halt(&self) -> anyhow::Result<()> {
        let mut bound = self.bound.lock().await;
        *bound = None;
        match self.current_handle().await {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        self.driver.lock().await.last_volume = volume;
        match self.current_handle().await {
            Some(handle) => handle.set_volume(volume).await,
            None => Ok(()),
        }
    }
}

/// Feed mpv's own notifications for the bound source into the stream
/// controller.
pub fn forward_events(
    output: Arc<MpvOutput>,
    player: Arc<StreamController>,
) -> tokio::task::JoinHandle<()> {
    let mut events = output.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(evt) => {
                    let Some(event) = evt.to_output_event() else {
                        continue;
                    };
                    match output.source_of(&evt).await {
                        Some(source) => player.handle_output_event(source, event).await,
                        None => debug!("mpv: dropping {:?} for a replaced entry", event),
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("mpv: event forwarder lagged {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
