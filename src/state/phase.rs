//! Lobby phase state machine.
//!
//! Derives where the client is in a lobby's lifecycle and validates which
//! server events make sense from there.
//!
//! # State Diagram
//!
//! ```text
//!                lobby_created / lobby_joined
//! ┌──────┐ ─────────────────────────────────────▶ ┌─────────┐
//! │ Idle │                                         │ Waiting │
//! └──────┘ ◀───────────┐                           └────┬────┘
//!     ▲                │ lobby_left                     │ player_joined (now full)
//!     │                │ (from any state)               ▼ ▲ player_left
//!     │                │                           ┌─────────┐
//!     │                │                           │  Full   │── player_ready_update
//!     │                │                           └────┬────┘
//!     │                │                                │ game_start (all ready)
//!     │                │                                ▼
//!     │          ┌──────────┐     game_finished    ┌─────────┐
//!     └──────────│ Finished │ ◀────────────────────│ Playing │── progress_update
//!                └──────────┘                      └─────────┘── test_results
//! ```
//!
//! `lobby_list`, `lobby_list_update` and `error` are accepted everywhere and
//! never change the phase on their own. `lobby_created` and `lobby_joined`
//! are also accepted from every phase: the server may move a player straight
//! from one lobby into a new one.

use std::fmt;

use super::lobby::{Lobby, LobbyStatus};
use super::protocol::EventKind;

/// Where the client is in the current lobby's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LobbyPhase {
    /// Not in any lobby
    #[default]
    Idle,

    /// In a waiting lobby with a free seat
    Waiting,

    /// In a waiting lobby with every seat taken
    Full { all_ready: bool },

    /// Game in progress
    Playing,

    /// Game over, outcome attached
    Finished,
}

impl LobbyPhase {
    /// Derive the phase from the current lobby.
    pub fn of(lobby: Option<&Lobby>) -> Self {
        let Some(lobby) = lobby else {
            return Self::Idle;
        };

        match lobby.status {
            LobbyStatus::Waiting if lobby.is_full() => Self::Full {
                all_ready: lobby.all_ready(),
            },
            LobbyStatus::Waiting => Self::Waiting,
            LobbyStatus::Playing => Self::Playing,
            LobbyStatus::Finished => Self::Finished,
        }
    }

    pub fn in_lobby(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Check whether an inbound event is valid from this phase.
    pub fn check(&self, kind: EventKind) -> Result<(), InvalidTransition> {
        use EventKind::*;
        use LobbyPhase::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: *self,
            event: kind,
            reason,
        };

        match (self, kind) {
            // Phase-independent
            (_, LobbyList | LobbyListUpdate | Error) => Ok(()),

            // Entering a lobby replaces whatever lobby we were in
            (_, LobbyCreated | LobbyJoined) => Ok(()),

            // Leaving always lands in Idle
            (_, LobbyLeft) => Ok(()),

            // Roster changes
            (Idle, PlayerJoined | PlayerLeft | PlayerReadyUpdate) => {
                Err(invalid("Not in a lobby"))
            }
            (Waiting | Full { .. }, PlayerJoined | PlayerReadyUpdate) => Ok(()),
            (_, PlayerJoined) => Err(invalid("Game already started")),
            (_, PlayerReadyUpdate) => Err(invalid("Game already started")),
            (_, PlayerLeft) => Ok(()),

            // Game start
            (Full { all_ready: true }, GameStart) => Ok(()),
            (Full { all_ready: false }, GameStart) => Err(invalid("Not every player is ready")),
            (Idle, GameStart) => Err(invalid("Not in a lobby")),
            (Waiting, GameStart) => Err(invalid("Roster is not full")),
            (Playing | Finished, GameStart) => Err(invalid("Game already started")),

            // In-game updates
            (Playing, ProgressUpdate | TestResults | GameFinished) => Ok(()),
            (Finished, ProgressUpdate | TestResults | GameFinished) => {
                Err(invalid("Game already finished"))
            }
            (_, ProgressUpdate | TestResults | GameFinished) => {
                Err(invalid("Game is not in progress"))
            }
        }
    }
}

impl fmt::Display for LobbyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Waiting => write!(f, "Waiting"),
            Self::Full { all_ready: true } => write!(f, "Full(all ready)"),
            Self::Full { all_ready: false } => write!(f, "Full"),
            Self::Playing => write!(f, "Playing"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

/// Error when an inbound event does not fit the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: LobbyPhase,
    pub event: EventKind,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::Player;

    fn lobby_with(players: Vec<Player>, status: LobbyStatus) -> Lobby {
        let mut lobby = Lobby::new("lobby_1", "Arena");
        lobby.status = status;
        lobby.replace_roster(players).unwrap();
        lobby
    }

    #[test]
    fn test_phase_of() {
        assert_eq!(LobbyPhase::of(None), LobbyPhase::Idle);

        let waiting = lobby_with(vec![Player::new("Ada")], LobbyStatus::Waiting);
        assert_eq!(LobbyPhase::of(Some(&waiting)), LobbyPhase::Waiting);

        let full = lobby_with(
            vec![Player::new("Ada").ready(), Player::new("Bob")],
            LobbyStatus::Waiting,
        );
        assert_eq!(
            LobbyPhase::of(Some(&full)),
            LobbyPhase::Full { all_ready: false }
        );

        let ready = lobby_with(
            vec![Player::new("Ada").ready(), Player::new("Bob").ready()],
            LobbyStatus::Waiting,
        );
        assert_eq!(
            LobbyPhase::of(Some(&ready)),
            LobbyPhase::Full { all_ready: true }
        );

        let playing = lobby_with(vec![Player::new("Ada")], LobbyStatus::Playing);
        assert_eq!(LobbyPhase::of(Some(&playing)), LobbyPhase::Playing);

        let finished = lobby_with(vec![], LobbyStatus::Finished);
        assert_eq!(LobbyPhase::of(Some(&finished)), LobbyPhase::Finished);
    }

    #[test]
    fn test_phase_independent_events() {
        let phases = [
            LobbyPhase::Idle,
            LobbyPhase::Waiting,
            LobbyPhase::Full { all_ready: false },
            LobbyPhase::Playing,
            LobbyPhase::Finished,
        ];
        for phase in phases {
            assert!(phase.check(EventKind::LobbyList).is_ok());
            assert!(phase.check(EventKind::LobbyListUpdate).is_ok());
            assert!(phase.check(EventKind::Error).is_ok());
            assert!(phase.check(EventKind::LobbyLeft).is_ok());
        }
    }

    #[test]
    fn test_enter_lobby_from_any_phase() {
        let phases = [
            LobbyPhase::Idle,
            LobbyPhase::Waiting,
            LobbyPhase::Full { all_ready: true },
            LobbyPhase::Playing,
            LobbyPhase::Finished,
        ];
        for phase in phases {
            assert!(phase.check(EventKind::LobbyCreated).is_ok());
            assert!(phase.check(EventKind::LobbyJoined).is_ok());
        }
    }

    #[test]
    fn test_game_start_requires_all_ready() {
        assert!(LobbyPhase::Full { all_ready: true }
            .check(EventKind::GameStart)
            .is_ok());
        assert!(LobbyPhase::Full { all_ready: false }
            .check(EventKind::GameStart)
            .is_err());
        assert!(LobbyPhase::Waiting.check(EventKind::GameStart).is_err());
        assert!(LobbyPhase::Idle.check(EventKind::GameStart).is_err());
    }

    #[test]
    fn test_in_game_events() {
        assert!(LobbyPhase::Playing.check(EventKind::TestResults).is_ok());
        assert!(LobbyPhase::Playing.check(EventKind::ProgressUpdate).is_ok());
        assert!(LobbyPhase::Playing.check(EventKind::GameFinished).is_ok());
        assert!(LobbyPhase::Waiting.check(EventKind::TestResults).is_err());
        assert!(LobbyPhase::Finished.check(EventKind::GameFinished).is_err());
    }

    #[test]
    fn test_roster_events() {
        assert!(LobbyPhase::Waiting.check(EventKind::PlayerJoined).is_ok());
        assert!(LobbyPhase::Full { all_ready: false }
            .check(EventKind::PlayerJoined)
            .is_ok());
        assert!(LobbyPhase::Playing.check(EventKind::PlayerLeft).is_ok());
        assert!(LobbyPhase::Playing.check(EventKind::PlayerJoined).is_err());
        assert!(LobbyPhase::Idle.check(EventKind::PlayerLeft).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = LobbyPhase::Idle.check(EventKind::GameStart).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transition from Idle via game_start: Not in a lobby"
        );
    }
}
