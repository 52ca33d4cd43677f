use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A player joined to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub connection_id: String,
    pub gamertag: String,
    pub ready: bool,
    pub score: u32,
    pub answers: Vec<AnswerEntry>,
}

/// One submitted answer. At most one entry per question id; later
/// submissions overwrite the stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: usize,
    pub value: usize,
}

/// A fully resolved question, including its correct-answer key.
/// Never serialized toward clients; see [`QuestionView`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBundle {
    pub id: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_key: usize,
}

impl QuestionBundle {
    /// The client-safe projection, with the answer key stripped.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            prompt: self.prompt.clone(),
            options: self.options.clone(),
        }
    }
}

/// What clients see of a question while answering it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: usize,
    pub prompt: String,
    pub options: Vec<String>,
}

/// Roster entry as broadcast to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub connection_id: String,
    pub gamertag: String,
    pub ready: bool,
    pub score: u32,
}

/// The per-session game state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Question,
    RoundResult,
    Finished,
}

impl Phase {
    /// Name of the countdown field active during this phase.
    pub fn timer_name(self) -> &'static str {
        match self {
            Self::Lobby => "lobbyCountdown",
            Self::Question => "questionCountdown",
            Self::RoundResult => "resultCountdown",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "LOBBY"),
            Self::Question => write!(f, "QUESTION"),
            Self::RoundResult => write!(f, "ROUND_RESULT"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

/// Timing and scoring rules loaded from rules.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRules {
    pub lobby_seconds: u64,
    pub question_seconds: u64,
    pub result_seconds: u64,
    pub points_per_correct: u32,
    pub default_question_count: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            lobby_seconds: 15,
            question_seconds: 20,
            result_seconds: 8,
            points_per_correct: 10,
            default_question_count: 5,
        }
    }
}

/// Caller-supplied game options on create-game. Everything is optional;
/// gaps are filled from the configured [`GameRules`] and catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProperties {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub question_count: Option<usize>,
}

/// Full session state, serialized for snapshots. Sensitive fields
/// (`answerKey`, `questions`) are elided before transmission; see
/// `snapshot_without` on the session state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: u64,
    pub room_code: String,
    pub phase: Phase,
    pub phase_timer: u64,
    pub current_question_index: usize,
    pub players: Vec<PlayerView>,
    pub questions: Vec<QuestionBundle>,
    pub answer_key: HashMap<usize, usize>,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    GameCreated {
        session: serde_json::Value,
    },
    PlayersUpdated {
        players: Vec<PlayerView>,
    },
    PhaseChanged {
        phase: Phase,
        seconds: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        question: Option<QuestionView>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        players: Option<Vec<PlayerView>>,
    },
    TimerTick {
        name: String,
        value: u64,
    },
    RoundResult {
        question_id: usize,
        correct_answer: usize,
        players: Vec<PlayerView>,
    },
    TimerProperty {
        name: String,
        value: u64,
    },
    Error {
        kind: String,
        message: String,
    },
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    CreateGame {
        gamertag: String,
        #[serde(default)]
        room_code: Option<String>,
        #[serde(default)]
        game_properties: GameProperties,
    },
    JoinGame {
        room_code: String,
        gamertag: String,
    },
    SubmitAnswer {
        question_id: usize,
        answer: usize,
    },
    SetReady,
    GetTimer,
}
