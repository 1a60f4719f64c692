use std::sync::Arc;
use std::time::Duration;

use globe_daemon::browser::{Browser, ListLimits};
use globe_daemon::directory::DirectoryClient;
use globe_daemon::mpv::{self, MpvOutput};
use globe_daemon::player::StreamController;
use globe_daemon::{http, logging, BroadcastMessage};
use globe_proto::config::Config;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Broadcast channel first so the log layer can feed it
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(256);

    let data_dir = globe_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");
    logging::init(&log_path, broadcast_tx.clone())?;
    eprintln!("globe-radio log: {}", log_path.display());

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let directory = Arc::new(DirectoryClient::from_config(&config.directory)?);
    info!(
        "Directory servers: {}",
        directory
            .servers()
            .iter()
            .map(|u| u.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let output = Arc::new(MpvOutput::new(
        config.player.default_volume,
        Duration::from_secs(config.player.load_timeout_secs),
    ));
    let player = Arc::new(StreamController::new(
        output.clone(),
        directory.clone(),
        config.player.default_volume,
        broadcast_tx.clone(),
    ));
    let browser = Arc::new(Browser::new(
        directory.clone(),
        ListLimits::from(&config.directory),
        broadcast_tx.clone(),
    ));

    let _forwarder = mpv::forward_events(output.clone(), player.clone());

    // First list in the background; the API is usable meanwhile
    let initial = browser.clone();
    tokio::spawn(async move { initial.load_initial().await });

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http::AppState {
                player: player.clone(),
                browser: browser.clone(),
                changes: broadcast_tx.clone(),
            },
        );
    } else {
        warn!("HTTP API disabled in config; nothing can drive playback");
    }

    info!("globe-radio running, Ctrl-C to quit");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    player.stop().await;
    output.shutdown().await;
    Ok(())
}
