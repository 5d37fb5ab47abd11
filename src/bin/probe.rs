//! Connect to a ShibaCoder server, request the lobby list and log the
//! traffic that follows.

use std::cell::Cell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use tracing::{error, info, warn};

use shibacoder_sync::config::ClientConfig;
use shibacoder_sync::prefs::JsonFileStore;
use shibacoder_sync::transport::WsTransport;
use shibacoder_sync::{EventKind, ServerEvent, SyncClient, SyncError, TransportEvent};

const DEFAULT_PREFS_PATH: &str = ".shibacoder/prefs.json";

#[derive(Debug, Parser)]
#[command(
    name = "shibacoder-probe",
    about = "Watch lobby traffic on a ShibaCoder server"
)]
struct Args {
    /// Websocket URL (overrides SHIBACODER_WS_URL)
    #[arg(long)]
    url: Option<String>,

    /// Lobby list page to request
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Lobby name filter
    #[arg(long, default_value = "")]
    search: String,

    /// Exit after the first lobby list arrives
    #[arg(long)]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Probe failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), SyncError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = args.url {
        config.ws_url = url;
        config.validate()?;
    }

    let prefs = JsonFileStore::new(
        config
            .prefs_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFS_PATH)),
    );
    let (transport, mut events) =
        WsTransport::new(&config.ws_url, config.backoff.clone(), config.ping_interval());

    info!(url = %config.ws_url, "Starting probe");
    let mut client = SyncClient::new(transport, config, prefs);
    if let Some(name) = client.snapshot().player_name {
        info!(player = %name, "Remembered player name");
    }

    let listed = Rc::new(Cell::new(false));
    {
        let listed = listed.clone();
        client.bus().on(EventKind::LobbyList, move |event| {
            if let ServerEvent::LobbyList(list) = event {
                let page = list.pagination;
                info!(
                    page = page.current_page,
                    pages = page.total_pages,
                    total = page.total_lobbies,
                    "Lobby list"
                );
                for lobby in &list.lobbies {
                    info!(
                        id = %lobby.id,
                        name = %lobby.name,
                        players = lobby.player_count,
                        max = lobby.max_players,
                        status = lobby.status.as_str(),
                        "  lobby"
                    );
                }
            }
            listed.set(true);
            Ok(())
        });
    }
    client.bus().on(EventKind::LobbyListUpdate, |event| {
        if let ServerEvent::LobbyListUpdate(list) = event {
            info!(lobbies = list.lobbies.len(), "Lobby list updated");
        }
        Ok(())
    });
    client.bus().on(EventKind::Error, |event| {
        if let ServerEvent::Error(err) = event {
            warn!(message = %err.message, "Server error");
        }
        Ok(())
    });

    client.connect()?;

    while let Some(event) = client.next(&mut events).await {
        if event == TransportEvent::Opened {
            client.list_lobbies(args.page, &args.search)?;
        }
        if args.once && listed.get() {
            break;
        }
    }

    client.close();
    Ok(())
}
