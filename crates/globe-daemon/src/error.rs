//! Error types surfaced by the directory client and stream controller.

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Every replica failed at the transport level or answered non-success.
    #[error("radio directory unavailable: all {0} servers failed")]
    Unavailable(usize),

    /// A replica answered with success but the body did not decode.
    #[error("invalid response from {server}: {source}")]
    Decode {
        server: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid directory server URL: {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("station has no playable stream URL: {0:?}")]
    InvalidLocator(String),

    #[error("volume must be a number, got {0}")]
    InvalidVolume(f32),
}
