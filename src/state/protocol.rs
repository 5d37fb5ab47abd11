//! Wire protocol.
//!
//! Every frame in either direction is a JSON envelope
//! `{"event": <name>, "data": <object>}` sent as one text message.
//! Inbound envelopes decode into [`ServerEvent`], outbound commands encode
//! from [`ClientCommand`].

use std::fmt;

use serde::{Deserialize, Serialize};

use super::game::{GameFinished, Problem, TestResult};
use super::lobby::{Lobby, LobbySummary, LobbyVisibility, Pagination, Player};
use crate::error::ProtocolError;

/// Raw envelope, before the payload is typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Names of inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    LobbyList,
    LobbyListUpdate,
    LobbyCreated,
    LobbyJoined,
    PlayerJoined,
    PlayerLeft,
    LobbyLeft,
    PlayerReadyUpdate,
    GameStart,
    ProgressUpdate,
    TestResults,
    GameFinished,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        Self::LobbyList,
        Self::LobbyListUpdate,
        Self::LobbyCreated,
        Self::LobbyJoined,
        Self::PlayerJoined,
        Self::PlayerLeft,
        Self::LobbyLeft,
        Self::PlayerReadyUpdate,
        Self::GameStart,
        Self::ProgressUpdate,
        Self::TestResults,
        Self::GameFinished,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LobbyList => "lobby_list",
            Self::LobbyListUpdate => "lobby_list_update",
            Self::LobbyCreated => "lobby_created",
            Self::LobbyJoined => "lobby_joined",
            Self::PlayerJoined => "player_joined",
            Self::PlayerLeft => "player_left",
            Self::LobbyLeft => "lobby_left",
            Self::PlayerReadyUpdate => "player_ready_update",
            Self::GameStart => "game_start",
            Self::ProgressUpdate => "progress_update",
            Self::TestResults => "test_results",
            Self::GameFinished => "game_finished",
            Self::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `lobby_list` / `lobby_list_update` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LobbyListPayload {
    #[serde(default)]
    pub lobbies: Vec<LobbySummary>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub search: String,
}

/// `lobby_created` / `lobby_joined` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyJoinedPayload {
    #[serde(default)]
    pub lobby_id: String,
    pub lobby_data: Lobby,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Any payload whose main content is the complete roster:
/// `player_joined`, `player_left`, `player_ready_update`, `progress_update`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPayload {
    /// The player the update is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// `lobby_left` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LobbyLeftPayload {
    #[serde(default)]
    pub message: String,
}

/// `game_start` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartPayload {
    pub problem: Problem,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// `game_finished` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameFinishedPayload {
    #[serde(flatten)]
    pub outcome: GameFinished,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Inbound event, typed by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    LobbyList(LobbyListPayload),
    LobbyListUpdate(LobbyListPayload),
    LobbyCreated(LobbyJoinedPayload),
    LobbyJoined(LobbyJoinedPayload),
    PlayerJoined(RosterPayload),
    PlayerLeft(RosterPayload),
    LobbyLeft(LobbyLeftPayload),
    PlayerReadyUpdate(RosterPayload),
    GameStart(GameStartPayload),
    ProgressUpdate(RosterPayload),
    TestResults(TestResult),
    GameFinished(GameFinishedPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::LobbyList(_) => EventKind::LobbyList,
            Self::LobbyListUpdate(_) => EventKind::LobbyListUpdate,
            Self::LobbyCreated(_) => EventKind::LobbyCreated,
            Self::LobbyJoined(_) => EventKind::LobbyJoined,
            Self::PlayerJoined(_) => EventKind::PlayerJoined,
            Self::PlayerLeft(_) => EventKind::PlayerLeft,
            Self::LobbyLeft(_) => EventKind::LobbyLeft,
            Self::PlayerReadyUpdate(_) => EventKind::PlayerReadyUpdate,
            Self::GameStart(_) => EventKind::GameStart,
            Self::ProgressUpdate(_) => EventKind::ProgressUpdate,
            Self::TestResults(_) => EventKind::TestResults,
            Self::GameFinished(_) => EventKind::GameFinished,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Per-lobby sequence number, for events that carry one.
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::LobbyCreated(p) | Self::LobbyJoined(p) => p.seq,
            Self::PlayerJoined(p)
            | Self::PlayerLeft(p)
            | Self::PlayerReadyUpdate(p)
            | Self::ProgressUpdate(p) => p.seq,
            Self::GameStart(p) => p.seq,
            Self::GameFinished(p) => p.seq,
            _ => None,
        }
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;
        Self::from_envelope(envelope)
    }

    /// Type an already-parsed envelope.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let kind = EventKind::from_name(&envelope.event)
            .ok_or_else(|| ProtocolError::UnknownEvent(envelope.event.clone()))?;

        // `{"event": "lobby_left"}` without data is still a valid frame
        let data = match envelope.data {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            data => data,
        };

        fn typed<T: serde::de::DeserializeOwned>(
            kind: EventKind,
            data: serde_json::Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
                event: kind.as_str(),
                source,
            })
        }

        Ok(match kind {
            EventKind::LobbyList => Self::LobbyList(typed(kind, data)?),
            EventKind::LobbyListUpdate => Self::LobbyListUpdate(typed(kind, data)?),
            EventKind::LobbyCreated => Self::LobbyCreated(typed(kind, data)?),
            EventKind::LobbyJoined => Self::LobbyJoined(typed(kind, data)?),
            EventKind::PlayerJoined => Self::PlayerJoined(typed(kind, data)?),
            EventKind::PlayerLeft => Self::PlayerLeft(typed(kind, data)?),
            EventKind::LobbyLeft => Self::LobbyLeft(typed(kind, data)?),
            EventKind::PlayerReadyUpdate => Self::PlayerReadyUpdate(typed(kind, data)?),
            EventKind::GameStart => Self::GameStart(typed(kind, data)?),
            EventKind::ProgressUpdate => Self::ProgressUpdate(typed(kind, data)?),
            EventKind::TestResults => Self::TestResults(typed(kind, data)?),
            EventKind::GameFinished => Self::GameFinished(typed(kind, data)?),
            EventKind::Error => Self::Error(typed(kind, data)?),
        })
    }
}

/// `get_lobby_list` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLobbiesRequest {
    pub page: u32,
    pub search: String,
}

/// `create_lobby` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub visibility: LobbyVisibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

/// `join_lobby` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLobbyRequest {
    pub lobby_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

/// `submit_code` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitCodeRequest {
    pub code: String,
    pub language: String,
}

/// Empty `{}` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// Outbound command, serialized directly as an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    GetLobbyList(ListLobbiesRequest),
    CreateLobby(CreateLobbyRequest),
    JoinLobby(JoinLobbyRequest),
    LeaveLobby(EmptyPayload),
    PlayerReady(EmptyPayload),
    SubmitCode(SubmitCodeRequest),
}

impl ClientCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetLobbyList(_) => "get_lobby_list",
            Self::CreateLobby(_) => "create_lobby",
            Self::JoinLobby(_) => "join_lobby",
            Self::LeaveLobby(_) => "leave_lobby",
            Self::PlayerReady(_) => "player_ready",
            Self::SubmitCode(_) => "submit_code",
        }
    }

    /// Encode as a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::lobby::LobbyStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("lobby_destroyed"), None);
    }

    #[test]
    fn test_decode_lobby_created() {
        let event = ServerEvent::decode(
            r#"{"event":"lobby_created","data":{"lobbyId":"lobby_1","lobbyData":{
                "id":"lobby_1","name":"Epic Coders Arena","type":"public","status":"waiting",
                "maxPlayers":2,"players":[{"name":"Ada","ready":false}]}}}"#,
        )
        .unwrap();

        let ServerEvent::LobbyCreated(payload) = event else {
            panic!("expected lobby_created");
        };
        assert_eq!(payload.lobby_id, "lobby_1");
        assert_eq!(payload.lobby_data.status, LobbyStatus::Waiting);
        assert_eq!(payload.lobby_data.players, vec![Player::new("Ada")]);
        assert_eq!(payload.seq, None);
    }

    #[test]
    fn test_decode_missing_data() {
        let event = ServerEvent::decode(r#"{"event":"lobby_left"}"#).unwrap();
        assert_eq!(event, ServerEvent::LobbyLeft(LobbyLeftPayload::default()));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            ServerEvent::decode("not json"),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            ServerEvent::decode(r#"{"event":"mystery","data":{}}"#),
            Err(ProtocolError::UnknownEvent(name)) if name == "mystery"
        ));
        assert!(matches!(
            ServerEvent::decode(r#"{"event":"test_results","data":{"passed":"lots"}}"#),
            Err(ProtocolError::InvalidPayload { event: "test_results", .. })
        ));
    }

    #[test]
    fn test_decode_game_finished_flattened() {
        let event = ServerEvent::decode(
            r#"{"event":"game_finished","data":{"winner":"Ada","winner_id":"c1",
                "final_scores":[],"game_duration":12.0,"seq":7}}"#,
        )
        .unwrap();

        assert_eq!(event.seq(), Some(7));
        let ServerEvent::GameFinished(payload) = event else {
            panic!("expected game_finished");
        };
        assert_eq!(payload.outcome.winner, "Ada");
        assert_eq!(payload.outcome.winner_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_encode_create_lobby() {
        let command = ClientCommand::CreateLobby(CreateLobbyRequest {
            name: "Epic Coders Arena".to_string(),
            visibility: LobbyVisibility::Public,
            pin: None,
            player_name: Some("Ada".to_string()),
        });

        let value: serde_json::Value = serde_json::from_str(&command.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "event": "create_lobby",
                "data": {"name": "Epic Coders Arena", "type": "public", "playerName": "Ada"}
            })
        );
    }

    #[test]
    fn test_encode_empty_payload() {
        let value: serde_json::Value =
            serde_json::from_str(&ClientCommand::LeaveLobby(EmptyPayload {}).encode().unwrap())
                .unwrap();
        assert_eq!(value, serde_json::json!({"event": "leave_lobby", "data": {}}));
    }

    #[test]
    fn test_command_names_match_wire() {
        let commands = [
            ClientCommand::GetLobbyList(ListLobbiesRequest {
                page: 1,
                search: String::new(),
            }),
            ClientCommand::PlayerReady(EmptyPayload {}),
            ClientCommand::SubmitCode(SubmitCodeRequest {
                code: "pass".to_string(),
                language: "python".to_string(),
            }),
        ];
        for command in commands {
            let envelope: Envelope = serde_json::from_str(&command.encode().unwrap()).unwrap();
            assert_eq!(envelope.event, command.name());
        }
    }
}
