use async_trait::async_trait;

/// Identifies one bound source.  Every `set_source` hands out a fresh id and
/// every event the sink raises carries the id of the source it concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// A controllable audio sink that plays one source at a time.
///
/// The stream controller only orchestrates this resource; the daemon backs it
/// with mpv.  Rebinding calls (`halt`, `set_source`, `set_volume`) are
/// serialised by the controller.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Bind a new source locator without starting audio.
    async fn set_source(&self, url: &str) -> anyhow::Result<SourceId>;

    /// Start (or resume) audio on the bound source, reopening it if the sink
    /// went idle.  Resolves once audio is flowing, or with an error if the
    /// source cannot be played.
    async fn play(&self) -> anyhow::Result<()>;

    async fn pause(&self) -> anyhow::Result<()>;

    /// Stop audio and clear the bound source.
    async fn halt(&self) -> anyhow::Result<()>;

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()>;
}

/// Notifications the sink raises on its own, outside any command.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Ready,
    Error(String),
    Ended,
}
