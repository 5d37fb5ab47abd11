//! Client synchronization core.
//!
//! - `protocol` - Envelope, inbound events and outbound commands
//! - `connection` - The one transport connection and its lifecycle
//! - `bus` - Event-kind keyed handler registry
//! - `lobby` - Lobby list entries, the current lobby and its roster
//! - `game` - Problem, test results, outcome
//! - `phase` - Lobby phase state machine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             SyncClient                               │
//! │                                                                      │
//! │  command ──▶ validate ──▶ ConnectionManager ──▶ Transport ──▶ wire   │
//! │                                                                      │
//! │  wire ──▶ Transport ──▶ ConnectionManager ──▶ LobbyState ──▶ EventBus│
//! │          (TransportEvent)  (decode)          (fold)      (handlers)  │
//! │                                                                      │
//! │  collaborators read Snapshot, never the connection or registry       │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one execution context; the only shared state is the
//! `Rc<RefCell<LobbyState>>` each event is folded into before any bus
//! handler sees it.
//!
//! # Submissions
//!
//! `test_results` carries no correlation id. Results are assumed to arrive
//! in submission order with at most one submission outstanding; callers
//! enforce that with [`Snapshot::submission_pending`].

pub mod bus;
pub mod connection;
pub mod game;
pub mod lobby;
pub mod phase;
pub mod protocol;

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApplyError, CommandError, TransportError};
use crate::prefs::{MemoryStore, PreferenceStore, Preferences};

// Re-export commonly used types
pub use bus::{DispatchReport, EventBus, HandlerId, HandlerResult};
pub use connection::{Backoff, ConnectionManager, ConnectionState, Transport, TransportEvent};
pub use game::{FinalScore, GameFinished, Problem, ProblemExample, ReceivedResult, TestResult};
pub use lobby::{
    is_valid_pin, Lobby, LobbyError, LobbyStatus, LobbySummary, LobbyVisibility, Pagination,
    Player, MAX_LOBBY_PLAYERS,
};
pub use phase::{InvalidTransition, LobbyPhase};
pub use protocol::{ClientCommand, EventKind, ServerEvent};

use protocol::{
    CreateLobbyRequest, EmptyPayload, JoinLobbyRequest, ListLobbiesRequest, SubmitCodeRequest,
};

/// Lobby and game state folded from server events.
#[derive(Debug, Clone, Default)]
pub struct LobbyState {
    lobbies: Vec<LobbySummary>,
    pagination: Pagination,
    search: String,
    lobby: Option<Lobby>,
    test_results: Option<ReceivedResult>,
    game_finished: Option<GameFinished>,
    error: Option<String>,
    loading: bool,
    player_name: Option<String>,
    submission_pending: bool,
    /// Highest sequence number applied for the current lobby
    last_seq: Option<u64>,
}

impl LobbyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LobbyPhase {
        LobbyPhase::of(self.lobby.as_ref())
    }

    pub fn lobbies(&self) -> &[LobbySummary] {
        &self.lobbies
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn lobby(&self) -> Option<&Lobby> {
        self.lobby.as_ref()
    }

    /// Current roster, empty when not in a lobby.
    pub fn players(&self) -> &[Player] {
        self.lobby.as_ref().map_or(&[], |l| l.players.as_slice())
    }

    pub fn test_results(&self) -> Option<&TestResult> {
        self.test_results.as_ref().map(|r| &r.result)
    }

    pub fn game_finished(&self) -> Option<&GameFinished> {
        self.game_finished.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn submission_pending(&self) -> bool {
        self.submission_pending
    }

    /// Fold one server event into the state.
    pub fn apply(&mut self, event: &ServerEvent) -> Result<(), ApplyError> {
        self.apply_at(event, Utc::now())
    }

    /// Fold one server event, stamping time-sensitive data with `now`.
    ///
    /// Rejected events leave the state untouched.
    pub fn apply_at(&mut self, event: &ServerEvent, now: DateTime<Utc>) -> Result<(), ApplyError> {
        self.phase().check(event.kind())?;

        let entering = matches!(event, ServerEvent::LobbyCreated(_) | ServerEvent::LobbyJoined(_));
        if let (false, Some(seq), Some(last)) = (entering, event.seq(), self.last_seq) {
            if seq <= last {
                return Err(ApplyError::Stale { seq, last });
            }
        }

        match event {
            ServerEvent::LobbyList(list) | ServerEvent::LobbyListUpdate(list) => {
                if matches!(event, ServerEvent::LobbyList(_)) {
                    self.error = None;
                }
                self.lobbies = list.lobbies.clone();
                self.pagination = list.pagination;
                self.search = list.search.clone();
                self.loading = false;
            }

            ServerEvent::LobbyCreated(joined) | ServerEvent::LobbyJoined(joined) => {
                let mut lobby = joined.lobby_data.clone();
                if lobby.id.is_empty() {
                    lobby.id = joined.lobby_id.clone();
                }
                let players = std::mem::take(&mut lobby.players);
                lobby.replace_roster(players)?;

                // The creator is the only occupant of a fresh lobby and a
                // joiner is appended last, under a server-picked name if
                // none was sent
                if self.player_name.is_none() {
                    let me = match event {
                        ServerEvent::LobbyCreated(_) => match lobby.players.as_slice() {
                            [only] => Some(only),
                            _ => None,
                        },
                        _ => lobby.players.last(),
                    };
                    self.player_name = me.map(|p| p.name.clone());
                }

                info!(lobby = %lobby.id, players = lobby.player_count(), "Entered lobby");
                self.lobby = Some(lobby);
                self.test_results = None;
                self.game_finished = None;
                self.submission_pending = false;
                self.error = None;
                self.last_seq = None;
            }

            ServerEvent::PlayerJoined(roster)
            | ServerEvent::PlayerLeft(roster)
            | ServerEvent::PlayerReadyUpdate(roster)
            | ServerEvent::ProgressUpdate(roster) => {
                let lobby = self.lobby.as_mut().ok_or(ApplyError::NoLobby)?;
                if let Some(max) = roster.max_players {
                    let max = max.clamp(1, MAX_LOBBY_PLAYERS);
                    if max >= roster.players.len() {
                        lobby.max_players = max;
                    }
                }
                lobby.replace_roster(roster.players.clone())?;
                debug!(
                    event = %event.kind(),
                    players = lobby.player_count(),
                    ready = lobby.ready_count(),
                    "Roster replaced"
                );
            }

            ServerEvent::LobbyLeft(_) => {
                self.leave();
            }

            ServerEvent::GameStart(start) => {
                let lobby = self.lobby.as_mut().ok_or(ApplyError::NoLobby)?;
                lobby.status = LobbyStatus::Playing;
                lobby.time_limit = start.time_limit.or(start.problem.time_limit);
                lobby.problem = Some(start.problem.clone());
                info!(lobby = %lobby.id, problem = %start.problem.title, "Game started");
                self.test_results = None;
                self.game_finished = None;
            }

            ServerEvent::TestResults(result) => {
                self.test_results = Some(ReceivedResult::new(result.clone(), now));
                self.submission_pending = false;
            }

            ServerEvent::GameFinished(finished) => {
                let lobby = self.lobby.as_mut().ok_or(ApplyError::NoLobby)?;
                lobby.status = LobbyStatus::Finished;
                lobby.winner = Some(finished.outcome.winner.clone());
                lobby.final_scores = Some(finished.outcome.final_scores.clone());
                info!(lobby = %lobby.id, winner = %finished.outcome.winner, "Game finished");
                self.game_finished = Some(finished.outcome.clone());
                self.submission_pending = false;
            }

            ServerEvent::Error(err) => {
                self.error = Some(err.message.clone());
                self.loading = false;
                self.submission_pending = false;
            }
        }

        if let Some(seq) = event.seq() {
            self.last_seq = Some(seq);
        }
        Ok(())
    }

    /// Connection lost: the server drops us from our lobby, so do we.
    pub fn on_disconnect(&mut self) {
        if self.lobby.is_some() {
            info!("Disconnected, clearing current lobby");
        }
        self.leave();
        self.loading = false;
    }

    /// Clear the test result once it has been shown for `display_for`.
    pub fn expire_results(&mut self, now: DateTime<Utc>, display_for: Duration) -> bool {
        match &self.test_results {
            Some(received) if received.is_expired(now, display_for) => {
                self.test_results = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear_test_results(&mut self) {
        self.test_results = None;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    fn leave(&mut self) {
        self.lobby = None;
        self.test_results = None;
        self.game_finished = None;
        self.submission_pending = false;
        self.last_seq = None;
    }

    fn record_error(&mut self, message: String) {
        self.error = Some(message);
    }
}

/// Read-only view of the client, for collaborators to render from.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub connection: ConnectionState,
    pub connected: bool,
    pub phase: LobbyPhase,
    pub lobbies: Vec<LobbySummary>,
    pub pagination: Pagination,
    pub search: String,
    pub lobby: Option<Lobby>,
    pub test_results: Option<TestResult>,
    pub game_finished: Option<GameFinished>,
    /// Last server or local validation error
    pub error: Option<String>,
    pub loading: bool,
    pub player_name: Option<String>,
    pub submission_pending: bool,
}

impl Snapshot {
    fn capture(connection: &ConnectionState, state: &LobbyState) -> Self {
        Self {
            connection: connection.clone(),
            connected: connection.is_connected(),
            phase: state.phase(),
            lobbies: state.lobbies.clone(),
            pagination: state.pagination,
            search: state.search.clone(),
            lobby: state.lobby.clone(),
            test_results: state.test_results().cloned(),
            game_finished: state.game_finished.clone(),
            error: state.error.clone(),
            loading: state.loading,
            player_name: state.player_name.clone(),
            submission_pending: state.submission_pending,
        }
    }

    pub fn players(&self) -> &[Player] {
        self.lobby.as_ref().map_or(&[], |l| l.players.as_slice())
    }

    /// This client's entry in the roster.
    pub fn me(&self) -> Option<&Player> {
        let name = self.player_name.as_deref()?;
        self.players().iter().find(|p| p.name == name)
    }

    /// The other player in the roster.
    pub fn opponent(&self) -> Option<&Player> {
        let name = self.player_name.as_deref()?;
        self.players().iter().find(|p| p.name != name)
    }

    pub fn connection_error(&self) -> Option<&str> {
        self.connection.error()
    }
}

/// Shared read handle onto the lobby state, usable from inside bus
/// handlers registered after the client's own.
#[derive(Debug, Clone)]
pub struct StateView {
    state: Rc<RefCell<LobbyState>>,
}

impl StateView {
    pub fn read(&self) -> Ref<'_, LobbyState> {
        self.state.borrow()
    }
}

/// Options for [`SyncClient::create_lobby`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateLobby {
    pub name: String,
    pub visibility: LobbyVisibility,
    pub pin: Option<String>,
    pub player_name: Option<String>,
}

impl CreateLobby {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn private(name: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: LobbyVisibility::Private,
            pin: Some(pin.into()),
            player_name: None,
        }
    }

    pub fn as_player(mut self, player_name: impl Into<String>) -> Self {
        self.player_name = Some(player_name.into());
        self
    }
}

/// Lobby/game client: owns the connection, the event bus and the state,
/// and exposes the command surface.
pub struct SyncClient<T: Transport, S: PreferenceStore = MemoryStore> {
    connection: ConnectionManager<T>,
    bus: EventBus,
    state: Rc<RefCell<LobbyState>>,
    prefs: S,
    config: ClientConfig,
}

impl<T: Transport, S: PreferenceStore> SyncClient<T, S> {
    pub fn new(transport: T, config: ClientConfig, prefs: S) -> Self {
        let bus = EventBus::new();
        let state = Rc::new(RefCell::new(LobbyState::new()));

        match prefs.load() {
            Ok(Preferences {
                last_player_name: Some(name),
            }) => {
                debug!(player = %name, "Restored player name");
                state.borrow_mut().player_name = Some(name);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not load preferences"),
        }

        // Fold before dispatch and outside the bus; `off` can't reach it
        let mut connection = ConnectionManager::new(transport);
        {
            let bus = bus.clone();
            let state = state.clone();
            connection.on_message(move |event| {
                if let Err(e) = state.borrow_mut().apply(&event) {
                    warn!(event = %event.kind(), error = %e, "Event rejected");
                }
                bus.dispatch(&event);
            });
        }

        Self {
            connection,
            bus,
            state,
            prefs,
            config,
        }
    }

    /// The event bus, for collaborators that want to react to events.
    ///
    /// Handlers run after the event has been folded into the state.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn view(&self) -> StateView {
        StateView {
            state: self.state.clone(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self.connection.state(), &self.state.borrow())
    }

    pub fn phase(&self) -> LobbyPhase {
        self.state.borrow().phase()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.connection.connect()
    }

    /// End the session. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.connection.close();
        self.state.borrow_mut().on_disconnect();
    }

    /// Feed one transport notification through the core.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let was_connected = self.connection.is_connected();
        self.connection.handle(event);
        if was_connected && !self.connection.is_connected() {
            self.state.borrow_mut().on_disconnect();
        }
    }

    /// Drain transport notifications until the transport stops for good,
    /// expiring stale test results as time passes.
    pub async fn run(&mut self, events: &mut UnboundedReceiver<TransportEvent>) {
        while self.next(events).await.is_some() {}
    }

    /// Handle the next transport notification and return a copy of it, or
    /// `None` once the transport has stopped. Lets callers issue commands
    /// between notifications, e.g. as soon as `Opened` arrives.
    pub async fn next(
        &mut self,
        events: &mut UnboundedReceiver<TransportEvent>,
    ) -> Option<TransportEvent> {
        let period = self.config.results_display().max(Duration::from_millis(100));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = ticker.tick() => {
                    self.tick(Utc::now());
                    continue;
                }
            };
            self.tick(Utc::now());

            return match event {
                Some(TransportEvent::Stopped) | None => {
                    self.handle_transport_event(TransportEvent::Stopped);
                    debug!("Transport stopped");
                    None
                }
                Some(event) => {
                    self.handle_transport_event(event.clone());
                    Some(event)
                }
            };
        }
    }

    /// Time-based housekeeping.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self
            .state
            .borrow_mut()
            .expire_results(now, self.config.results_display())
        {
            debug!("Test results display timeout elapsed");
        }
    }

    /// Request one page of public lobbies.
    pub fn list_lobbies(&mut self, page: u32, search: &str) -> Result<(), CommandError> {
        self.ensure_connected()?;
        self.send(ClientCommand::GetLobbyList(ListLobbiesRequest {
            page: page.max(1),
            search: search.trim().to_string(),
        }))?;
        self.state.borrow_mut().loading = true;
        Ok(())
    }

    pub fn create_lobby(&mut self, options: CreateLobby) -> Result<(), CommandError> {
        self.ensure_connected()?;

        let name = options.name.trim();
        if name.is_empty() {
            return self.reject(CommandError::EmptyLobbyName);
        }

        let pin = match options.visibility {
            LobbyVisibility::Private => {
                let pin = options.pin.as_deref().map(str::trim).unwrap_or_default();
                if pin.is_empty() {
                    return self.reject(CommandError::MissingPin);
                }
                if !is_valid_pin(pin) {
                    return self.reject(CommandError::InvalidPin);
                }
                Some(pin.to_string())
            }
            LobbyVisibility::Public => None,
        };

        let player_name = self.resolve_player_name(options.player_name.as_deref());
        self.send(ClientCommand::CreateLobby(CreateLobbyRequest {
            name: name.to_string(),
            visibility: options.visibility,
            pin,
            player_name,
        }))
    }

    /// Join a lobby by id. `pin` is needed for private lobbies.
    pub fn join_lobby(
        &mut self,
        lobby_id: &str,
        pin: Option<&str>,
        player_name: Option<&str>,
    ) -> Result<(), CommandError> {
        self.ensure_connected()?;

        let lobby_id = lobby_id.trim();
        if lobby_id.is_empty() {
            return self.reject(CommandError::EmptyLobbyId);
        }

        let pin = pin.map(str::trim).filter(|p| !p.is_empty());
        match pin {
            Some(pin) if !is_valid_pin(pin) => return self.reject(CommandError::InvalidPin),
            None if self.is_known_private(lobby_id) => {
                return self.reject(CommandError::MissingPin)
            }
            _ => {}
        }

        let player_name = self.resolve_player_name(player_name);
        self.send(ClientCommand::JoinLobby(JoinLobbyRequest {
            lobby_id: lobby_id.to_string(),
            pin: pin.map(str::to_string),
            player_name,
        }))
    }

    /// Leave the current lobby. The lobby is cleared when the server
    /// confirms with `lobby_left`.
    pub fn leave_lobby(&mut self) -> Result<(), CommandError> {
        self.ensure_connected()?;
        self.send(ClientCommand::LeaveLobby(EmptyPayload {}))
    }

    /// Ready up. One-way; there is no un-ready.
    pub fn set_ready(&mut self) -> Result<(), CommandError> {
        self.ensure_connected()?;

        let check = {
            let state = self.state.borrow();
            match state.lobby() {
                None => Err(CommandError::NotInLobby),
                Some(lobby) if lobby.status != LobbyStatus::Waiting => {
                    Err(CommandError::AlreadyStarted)
                }
                Some(lobby) if !lobby.is_full() => Err(CommandError::RosterNotFull),
                Some(_) => Ok(()),
            }
        };
        if let Err(e) = check {
            return self.reject(e);
        }

        self.send(ClientCommand::PlayerReady(EmptyPayload {}))
    }

    /// Submit a solution. The code is sent as-is; `language` defaults to
    /// the configured language.
    pub fn submit_code(&mut self, code: &str, language: Option<&str>) -> Result<(), CommandError> {
        self.ensure_connected()?;

        if code.trim().is_empty() {
            return self.reject(CommandError::EmptyCode);
        }
        if !self.state.borrow().phase().is_playing() {
            return self.reject(CommandError::NotPlaying);
        }
        if self.state.borrow().submission_pending {
            warn!("Submitting while a previous submission is still outstanding");
        }

        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.config.default_language.as_str())
            .to_string();
        self.send(ClientCommand::SubmitCode(SubmitCodeRequest {
            code: code.to_string(),
            language,
        }))?;
        self.state.borrow_mut().submission_pending = true;
        Ok(())
    }

    pub fn clear_error(&mut self) {
        self.state.borrow_mut().clear_error();
    }

    pub fn clear_test_results(&mut self) {
        self.state.borrow_mut().clear_test_results();
    }

    fn ensure_connected(&mut self) -> Result<(), CommandError> {
        if self.connection.is_connected() {
            Ok(())
        } else {
            self.reject(CommandError::NotConnected)
        }
    }

    /// Surface a local failure the same way as a server error.
    fn reject(&mut self, error: CommandError) -> Result<(), CommandError> {
        debug!(error = %error, "Command rejected");
        self.state.borrow_mut().record_error(error.to_string());
        Err(error)
    }

    fn send(&mut self, command: ClientCommand) -> Result<(), CommandError> {
        match self.connection.send(&command) {
            Ok(()) => {
                self.state.borrow_mut().clear_error();
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    fn is_known_private(&self, lobby_id: &str) -> bool {
        self.state
            .borrow()
            .lobbies
            .iter()
            .any(|l| l.id == lobby_id && l.visibility == LobbyVisibility::Private)
    }

    /// Pick the name to send: an explicit one (remembered for next time),
    /// else the remembered one.
    fn resolve_player_name(&mut self, explicit: Option<&str>) -> Option<String> {
        let explicit = explicit.map(str::trim).filter(|n| !n.is_empty());

        let name = match explicit {
            Some(name) => {
                let prefs = Preferences {
                    last_player_name: Some(name.to_string()),
                };
                if let Err(e) = self.prefs.save(&prefs) {
                    warn!(error = %e, "Could not save player name");
                }
                Some(name.to_string())
            }
            None => self.state.borrow().player_name.clone(),
        };

        if name.is_some() {
            self.state.borrow_mut().player_name = name.clone();
        }
        name
    }
}

impl<T: Transport + std::fmt::Debug, S: PreferenceStore> std::fmt::Debug for SyncClient<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("connection", &self.connection)
            .field("bus", &self.bus)
            .field("phase", &self.phase())
            .finish()
    }
}
