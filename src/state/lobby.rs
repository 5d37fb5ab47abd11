//! Lobby state.
//!
//! A lobby is a two-player session container that progresses through
//! waiting → playing → finished. The client only ever holds one current
//! lobby, plus a page of public lobby summaries for browsing.

use serde::{Deserialize, Serialize};

use super::game::{FinalScore, Problem};

/// Maximum players per lobby.
pub const MAX_LOBBY_PLAYERS: usize = 2;

/// Required length of a private lobby pin.
pub const PIN_LENGTH: usize = 4;

/// Lobby visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyVisibility {
    /// Listed in the public catalogue
    #[default]
    Public,
    /// Hidden, joinable by id + pin
    Private,
}

impl LobbyVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Lobby lifecycle status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    #[default]
    Waiting,
    Playing,
    Finished,
}

impl LobbyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Finished => "finished",
        }
    }
}

/// Check that a pin is exactly four ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

/// A player's state within a lobby.
///
/// Names are unique within a lobby, so the name doubles as the identity
/// the client uses to tell itself apart from its opponent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Player {
    /// Server-assigned connection id (not always sent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    pub name: String,

    /// Whether the player has readied up
    #[serde(default)]
    pub ready: bool,

    /// Tests passed by the latest submission
    #[serde(default)]
    pub tests_passed: u32,

    /// Total tests in the problem's suite
    #[serde(default)]
    pub total_tests: u32,

    /// Whether the latest submission passed every test
    #[serde(default)]
    pub completed: bool,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn ready(mut self) -> Self {
        self.ready = true;
        self
    }

    /// Fraction of tests passed, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            f64::from(self.tests_passed) / f64::from(self.total_tests)
        }
    }
}

/// Entry in the browsable lobby list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub visibility: LobbyVisibility,
    #[serde(default)]
    pub status: LobbyStatus,
    pub player_count: usize,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Creation time in epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
}

impl LobbySummary {
    pub fn is_full(&self) -> bool {
        self.player_count >= self.max_players
    }
}

/// Pagination of the lobby list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_lobbies: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
            total_lobbies: 0,
            per_page: 4,
        }
    }
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }
}

fn default_max_players() -> usize {
    MAX_LOBBY_PLAYERS
}

/// The lobby this client is currently in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "type")]
    pub visibility: LobbyVisibility,

    #[serde(default)]
    pub status: LobbyStatus,

    #[serde(default = "default_max_players")]
    pub max_players: usize,

    /// Roster, in server order
    #[serde(default)]
    pub players: Vec<Player>,

    /// Pin (private lobbies only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,

    /// Problem, attached on game start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<Problem>,

    /// Time limit in seconds, attached on game start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,

    /// Winner name, attached on game finish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,

    /// Final scores, attached on game finish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_scores: Option<Vec<FinalScore>>,

    /// Creation time in epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
}

impl Lobby {
    /// Create an empty waiting lobby.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visibility: LobbyVisibility::Public,
            status: LobbyStatus::Waiting,
            max_players: MAX_LOBBY_PLAYERS,
            players: Vec::new(),
            pin: None,
            problem: None,
            time_limit: None,
            winner: None,
            final_scores: None,
            created_at: None,
        }
    }

    /// Capacity, never above [`MAX_LOBBY_PLAYERS`].
    pub fn capacity(&self) -> usize {
        self.max_players.clamp(1, MAX_LOBBY_PLAYERS)
    }

    /// Replace the roster wholesale.
    ///
    /// Rosters larger than the capacity are rejected and the current
    /// roster is left untouched.
    pub fn replace_roster(&mut self, players: Vec<Player>) -> Result<(), LobbyError> {
        if players.len() > self.capacity() {
            return Err(LobbyError::RosterOverflow {
                len: players.len(),
                max: self.capacity(),
            });
        }
        self.players = players;
        Ok(())
    }

    pub fn get_player(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|p| p.ready).count()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Roster full and every player ready.
    pub fn all_ready(&self) -> bool {
        self.is_full() && self.players.iter().all(|p| p.ready)
    }

    pub fn is_private(&self) -> bool {
        self.visibility == LobbyVisibility::Private
    }
}

/// Lobby errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyError {
    RosterOverflow { len: usize, max: usize },
}

impl std::fmt::Display for LobbyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RosterOverflow { len, max } => {
                write!(f, "Roster of {} players exceeds lobby capacity {}", len, max)
            }
        }
    }
}

impl std::error::Error for LobbyError {}
