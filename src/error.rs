use thiserror::Error;

/// Failures surfaced while building a question set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no question builder registered for '{0}'")]
    UnknownKind(String),
    #[error("catalog has too few entries for '{0}' to build a question")]
    NotEnoughEntries(String),
    #[error("question set construction was cancelled")]
    Cancelled,
}

/// Validation and lifecycle errors reported to the initiating client.
///
/// These are never broadcast; the WebSocket layer turns them into an
/// `error {kind, message}` reply on the requester's socket.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("no session with room code '{0}'")]
    RoomNotFound(String),
    #[error("game already started, joining is only possible in the lobby")]
    GameAlreadyStarted,
    #[error("gamertag '{0}' is already taken in this room")]
    DuplicateTag(String),
    #[error("room code '{0}' is already in use by another session")]
    RoomCodeTaken(String),
    #[error("question provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("session is no longer running")]
    SessionClosed,
}

impl GameError {
    /// Stable machine-readable kind, used in the wire-level error message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room-not-found",
            Self::GameAlreadyStarted => "game-already-started",
            Self::DuplicateTag(_) => "duplicate-tag",
            Self::RoomCodeTaken(_) => "room-code-taken",
            Self::Provider(_) => "provider-failure",
            Self::SessionClosed => "session-closed",
        }
    }
}
