use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};

use crate::error::GameError;
use crate::registry::Registry;
use crate::roster::Roster;
use crate::types::{GameRules, Phase, QuestionBundle, ServerMsg, SessionSnapshot};

/// Snapshot fields never sent to clients.
const SENSITIVE_FIELDS: &[&str] = &["answerKey", "questions"];

/// Commands the WebSocket handler sends to a session task.
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        connection_id: String,
        gamertag: String,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    SubmitAnswer {
        connection_id: String,
        question_id: usize,
        value: usize,
    },
    SetReady {
        connection_id: String,
    },
    GetTimer {
        connection_id: String,
    },
    Snapshot {
        reply: oneshot::Sender<serde_json::Value>,
    },
}

/// Events fanned out from a session to WebSocket connections.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Send a message to a specific connection.
    SendTo { connection_id: String, msg: ServerMsg },
    /// Broadcast a message to every participant of the room.
    Broadcast { msg: ServerMsg },
}

/// The active countdown's name and remaining seconds, so a client
/// arriving mid-phase can resynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerProperty {
    pub name: &'static str,
    pub value: u64,
}

/// Handle to a running session task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub room_code: String,
    pub cmd_tx: mpsc::Sender<SessionCommand>,
    pub event_tx: broadcast::Sender<SessionEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Stops the session task regardless of how full its command queue is.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Adds a player; fails when the tag is taken or the game has started.
    pub async fn join(&self, connection_id: String, gamertag: String) -> Result<(), GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Join {
                connection_id,
                gamertag,
                reply: reply_tx,
            })
            .await
            .map_err(|_| GameError::SessionClosed)?;
        reply_rx.await.map_err(|_| GameError::SessionClosed)?
    }

    pub async fn submit_answer(
        &self,
        connection_id: String,
        question_id: usize,
        value: usize,
    ) -> Result<(), GameError> {
        self.cmd_tx
            .send(SessionCommand::SubmitAnswer {
                connection_id,
                question_id,
                value,
            })
            .await
            .map_err(|_| GameError::SessionClosed)
    }

    pub async fn set_ready(&self, connection_id: String) -> Result<(), GameError> {
        self.cmd_tx
            .send(SessionCommand::SetReady { connection_id })
            .await
            .map_err(|_| GameError::SessionClosed)
    }

    /// Asks the session to send the requester its active countdown.
    /// The reply arrives as a `SendTo` event on the requester's connection.
    pub async fn get_timer(&self, connection_id: String) -> Result<(), GameError> {
        self.cmd_tx
            .send(SessionCommand::GetTimer { connection_id })
            .await
            .map_err(|_| GameError::SessionClosed)
    }

    /// The sanitized session snapshot (answer key and question bank elided).
    pub async fn snapshot(&self) -> Result<serde_json::Value, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| GameError::SessionClosed)?;
        reply_rx.await.map_err(|_| GameError::SessionClosed)
    }
}

/// The internal state of one session. Owned exclusively by its task;
/// ticks and player commands are serialized through the command loop.
pub(crate) struct GameState {
    id: u64,
    room_code: String,
    phase: Phase,
    phase_timer: u64,
    questions: Vec<QuestionBundle>,
    /// Index of the next question to issue; monotonically non-decreasing.
    next_question: usize,
    /// Correct answers recorded as each question is issued. Private.
    answer_key: HashMap<usize, usize>,
    /// Question ids already scored. Makes round-result entry idempotent.
    scored: HashSet<usize>,
    roster: Roster,
    rules: GameRules,
}

impl GameState {
    pub(crate) fn new(
        id: u64,
        room_code: String,
        questions: Vec<QuestionBundle>,
        rules: GameRules,
    ) -> Self {
        Self {
            id,
            room_code,
            phase: Phase::Lobby,
            phase_timer: rules.lobby_seconds,
            questions,
            next_question: 0,
            answer_key: HashMap::new(),
            scored: HashSet::new(),
            roster: Roster::new(),
            rules,
        }
    }

    fn broadcast(&self, tx: &broadcast::Sender<SessionEvent>, msg: ServerMsg) {
        let _ = tx.send(SessionEvent::Broadcast { msg });
    }

    fn send_to(&self, tx: &broadcast::Sender<SessionEvent>, connection_id: &str, msg: ServerMsg) {
        let _ = tx.send(SessionEvent::SendTo {
            connection_id: connection_id.to_string(),
            msg,
        });
    }

    fn broadcast_roster(&self, tx: &broadcast::Sender<SessionEvent>) {
        self.broadcast(tx, ServerMsg::PlayersUpdated {
            players: self.roster.views(),
        });
    }

    /// Index of the question currently (or last) in play.
    fn current_question_index(&self) -> usize {
        self.next_question.saturating_sub(1)
    }
}

/// Spawn a session task. The caller (the registry) records the returned
/// handle before any client can reach the session.
pub(crate) fn spawn_session(
    registry: Arc<Registry>,
    id: u64,
    room_code: String,
    questions: Vec<QuestionBundle>,
    rules: GameRules,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = SessionHandle {
        id,
        room_code: room_code.clone(),
        cmd_tx,
        event_tx: event_tx.clone(),
        shutdown_tx,
    };

    let state = GameState::new(id, room_code, questions, rules);
    tokio::spawn(session_task(state, cmd_rx, shutdown_rx, event_tx, registry));

    handle
}

async fn session_task(
    mut state: GameState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    event_tx: broadcast::Sender<SessionEvent>,
    registry: Arc<Registry>,
) {
    tracing::info!(
        "Session {} started, room code {}",
        state.id,
        state.room_code
    );

    // Lobby phase entry.
    state.broadcast(&event_tx, ServerMsg::PhaseChanged {
        phase: Phase::Lobby,
        seconds: state.phase_timer,
        question: None,
        players: None,
    });

    let period = Duration::from_secs(1);
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut finished = false;
    while !finished {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Join { connection_id, gamertag, reply }) => {
                    let result = handle_join(&mut state, &event_tx, connection_id, gamertag);
                    let _ = reply.send(result);
                }
                Some(SessionCommand::SubmitAnswer { connection_id, question_id, value }) => {
                    handle_submit_answer(&mut state, &event_tx, &connection_id, question_id, value);
                }
                Some(SessionCommand::SetReady { connection_id }) => {
                    finished = handle_set_ready(&mut state, &event_tx, &connection_id);
                }
                Some(SessionCommand::GetTimer { connection_id }) => {
                    handle_get_timer(&state, &event_tx, &connection_id);
                }
                Some(SessionCommand::Snapshot { reply }) => {
                    let _ = reply.send(snapshot_without(&state, SENSITIVE_FIELDS));
                }
                None => break,
            },
            // Fires on external removal, and on the last handle dropping.
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {
                finished = handle_tick(&mut state, &event_tx);
            }
        }
    }

    // Dropping the loop drops the interval: no further ticks are scheduled.
    registry.remove_session(state.id);
    tracing::info!("Session {} ended", state.id);
}

fn handle_join(
    state: &mut GameState,
    tx: &broadcast::Sender<SessionEvent>,
    connection_id: String,
    gamertag: String,
) -> Result<(), GameError> {
    if state.phase != Phase::Lobby {
        return Err(GameError::GameAlreadyStarted);
    }
    state.roster.add(connection_id, &gamertag)?;
    state.broadcast_roster(tx);
    Ok(())
}

fn handle_submit_answer(
    state: &mut GameState,
    tx: &broadcast::Sender<SessionEvent>,
    connection_id: &str,
    question_id: usize,
    value: usize,
) {
    if !state.roster.record_answer(connection_id, question_id, value) {
        // Player may have legitimately disconnected; not an error.
        tracing::debug!(
            "Answer from unknown connection {} in session {}, ignoring",
            connection_id,
            state.id
        );
    }
    state.broadcast_roster(tx);
}

/// Returns true when the session finished (all-ready start with an empty
/// question set goes straight to Finished).
fn handle_set_ready(
    state: &mut GameState,
    tx: &broadcast::Sender<SessionEvent>,
    connection_id: &str,
) -> bool {
    if !state.roster.set_ready(connection_id) {
        tracing::debug!(
            "Ready from unknown connection {} in session {}, ignoring",
            connection_id,
            state.id
        );
    }
    state.broadcast_roster(tx);

    // Explicit start trigger: everyone in the lobby is ready.
    if state.phase == Phase::Lobby && state.roster.all_ready() {
        return begin_question(state, tx);
    }
    false
}

/// One second elapsed. Decrements the active countdown, broadcasts the new
/// value, and fires the phase transition exactly once when it hits zero.
/// Returns true when the session reached Finished.
fn handle_tick(state: &mut GameState, tx: &broadcast::Sender<SessionEvent>) -> bool {
    if state.phase == Phase::Finished {
        return true;
    }

    if state.phase_timer > 0 {
        state.phase_timer -= 1;
    }
    state.broadcast(tx, ServerMsg::TimerTick {
        name: state.phase.timer_name().to_string(),
        value: state.phase_timer,
    });

    if state.phase_timer == 0 {
        return advance(state, tx);
    }
    false
}

/// Fires the transition out of the current phase. The next phase's timer is
/// initialized here, before any further tick can run.
fn advance(state: &mut GameState, tx: &broadcast::Sender<SessionEvent>) -> bool {
    match state.phase {
        Phase::Lobby => begin_question(state, tx),
        Phase::Question => {
            enter_round_result(state, tx);
            false
        }
        Phase::RoundResult => {
            if state.next_question < state.questions.len() {
                begin_question(state, tx)
            } else {
                finish(state, tx);
                true
            }
        }
        Phase::Finished => true,
    }
}

/// Issues the next question: records its answer key, clears ready flags
/// (prior answers stay), and broadcasts the sanitized question. Finishes
/// the session instead when no questions remain.
fn begin_question(state: &mut GameState, tx: &broadcast::Sender<SessionEvent>) -> bool {
    let Some(question) = state.questions.get(state.next_question) else {
        finish(state, tx);
        return true;
    };

    state.answer_key.insert(question.id, question.answer_key);
    let view = question.view();
    state.next_question += 1;

    state.roster.reset_ready();
    state.phase = Phase::Question;
    state.phase_timer = state.rules.question_seconds;

    state.broadcast(tx, ServerMsg::PhaseChanged {
        phase: Phase::Question,
        seconds: state.phase_timer,
        question: Some(view),
        players: None,
    });
    false
}

/// Scores the just-finished question (at most once, even if re-entered)
/// and reveals the correct answer together with the updated roster.
fn enter_round_result(state: &mut GameState, tx: &broadcast::Sender<SessionEvent>) {
    state.phase = Phase::RoundResult;
    state.phase_timer = state.rules.result_seconds;

    let index = state.current_question_index();
    let question_id = state.questions[index].id;
    let correct = state
        .answer_key
        .get(&question_id)
        .copied()
        .unwrap_or(state.questions[index].answer_key);

    if state.scored.insert(question_id) {
        state
            .roster
            .score_round(question_id, correct, state.rules.points_per_correct);
    }

    state.broadcast(tx, ServerMsg::PhaseChanged {
        phase: Phase::RoundResult,
        seconds: state.phase_timer,
        question: None,
        players: None,
    });
    state.broadcast(tx, ServerMsg::RoundResult {
        question_id,
        correct_answer: correct,
        players: state.roster.views(),
    });
}

fn finish(state: &mut GameState, tx: &broadcast::Sender<SessionEvent>) {
    state.phase = Phase::Finished;
    state.phase_timer = 0;
    state.broadcast(tx, ServerMsg::PhaseChanged {
        phase: Phase::Finished,
        seconds: 0,
        question: None,
        players: Some(state.roster.views()),
    });
}

/// Replies with the active countdown, only to the requesting connection.
fn handle_get_timer(
    state: &GameState,
    tx: &broadcast::Sender<SessionEvent>,
    connection_id: &str,
) {
    let prop = timer_property(state);
    state.send_to(tx, connection_id, ServerMsg::TimerProperty {
        name: prop.name.to_string(),
        value: prop.value,
    });
}

fn timer_property(state: &GameState) -> TimerProperty {
    TimerProperty {
        name: state.phase.timer_name(),
        value: state.phase_timer,
    }
}

/// Serializes the full session state, then strips the named fields before
/// the value can leave the process.
fn snapshot_without(state: &GameState, fields: &[&str]) -> serde_json::Value {
    let snapshot = SessionSnapshot {
        id: state.id,
        room_code: state.room_code.clone(),
        phase: state.phase,
        phase_timer: state.phase_timer,
        current_question_index: state.current_question_index(),
        players: state.roster.views(),
        questions: state.questions.clone(),
        answer_key: state.answer_key.clone(),
    };
    let mut value = serde_json::to_value(&snapshot)
        .unwrap_or_else(|_| serde_json::json!({}));
    if let Some(map) = value.as_object_mut() {
        for field in fields {
            map.remove(*field);
        }
    }
    value
}
