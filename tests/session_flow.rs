//! End-to-end session tests driving real session tasks on a paused clock.
//!
//! With `start_paused`, Tokio auto-advances time whenever every task is
//! idle, so the one-second game clock runs deterministically and the
//! tests never sleep for real.

use std::time::Duration;

use quizhive::registry::Registry;
use quizhive::session::SessionEvent;
use quizhive::types::{GameRules, Phase, QuestionBundle, ServerMsg};
use tokio::sync::broadcast;
use tokio::time::timeout;

fn question(id: usize, answer_key: usize) -> QuestionBundle {
    QuestionBundle {
        id,
        prompt: format!("question {}", id),
        options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        answer_key,
    }
}

fn rules() -> GameRules {
    GameRules {
        lobby_seconds: 2,
        question_seconds: 2,
        result_seconds: 1,
        points_per_correct: 10,
        default_question_count: 5,
    }
}

/// Waits for the next room-wide broadcast, skipping per-player sends.
async fn next_broadcast(rx: &mut broadcast::Receiver<SessionEvent>) -> ServerMsg {
    let fut = async {
        loop {
            match rx.recv().await.expect("event stream closed") {
                SessionEvent::Broadcast { msg } => return msg,
                SessionEvent::SendTo { .. } => continue,
            }
        }
    };
    timeout(Duration::from_secs(120), fut)
        .await
        .expect("no broadcast within the clock budget")
}

/// Waits until the given phase is entered, returning the message.
async fn wait_for_phase(rx: &mut broadcast::Receiver<SessionEvent>, wanted: Phase) -> ServerMsg {
    loop {
        let msg = next_broadcast(rx).await;
        if let ServerMsg::PhaseChanged { phase, .. } = &msg {
            if *phase == wanted {
                return msg;
            }
        }
    }
}

fn score_of(players: &[quizhive::types::PlayerView], tag: &str) -> u32 {
    players
        .iter()
        .find(|p| p.gamertag == tag)
        .map(|p| p.score)
        .expect("player missing from roster")
}

#[tokio::test(start_paused = true)]
async fn two_players_two_questions_scores_accumulate() {
    let registry = Registry::new();
    let handle = registry
        .create_session(None, vec![question(0, 1), question(1, 3)], rules())
        .unwrap();
    let mut rx = handle.subscribe();

    handle.join("conn-a".into(), "ada".into()).await.unwrap();
    handle.join("conn-b".into(), "bob".into()).await.unwrap();

    // Lobby runs out; the first question is issued.
    let msg = wait_for_phase(&mut rx, Phase::Question).await;
    let ServerMsg::PhaseChanged { question: Some(view), .. } = msg else {
        panic!("question entry carried no question");
    };
    assert_eq!(view.id, 0);

    // Only ada answers, correctly. bob stays silent.
    handle.submit_answer("conn-a".into(), 0, 1).await.unwrap();

    wait_for_phase(&mut rx, Phase::RoundResult).await;
    let result = loop {
        match next_broadcast(&mut rx).await {
            ServerMsg::RoundResult { question_id, correct_answer, players } => {
                break (question_id, correct_answer, players);
            }
            _ => continue,
        }
    };
    assert_eq!(result.0, 0);
    assert_eq!(result.1, 1);
    assert_eq!(score_of(&result.2, "ada"), 10);
    assert_eq!(score_of(&result.2, "bob"), 0);

    // Second round: both answer correctly.
    let msg = wait_for_phase(&mut rx, Phase::Question).await;
    let ServerMsg::PhaseChanged { question: Some(view), .. } = msg else {
        panic!("question entry carried no question");
    };
    assert_eq!(view.id, 1);

    handle.submit_answer("conn-a".into(), 1, 3).await.unwrap();
    handle.submit_answer("conn-b".into(), 1, 3).await.unwrap();

    let msg = wait_for_phase(&mut rx, Phase::Finished).await;
    let ServerMsg::PhaseChanged { players: Some(players), .. } = msg else {
        panic!("final phase carried no roster");
    };
    assert_eq!(score_of(&players, "ada"), 20);
    assert_eq!(score_of(&players, "bob"), 10);
}

#[tokio::test(start_paused = true)]
async fn phase_broadcasts_never_skip_a_state() {
    let registry = Registry::new();
    let handle = registry
        .create_session(None, vec![question(0, 0)], rules())
        .unwrap();
    let mut rx = handle.subscribe();

    let mut seen = Vec::new();
    while !matches!(seen.last(), Some(Phase::Finished)) {
        if let ServerMsg::PhaseChanged { phase, .. } = next_broadcast(&mut rx).await {
            seen.push(phase);
        }
    }

    assert_eq!(
        seen,
        vec![Phase::Lobby, Phase::Question, Phase::RoundResult, Phase::Finished]
    );
}

#[tokio::test(start_paused = true)]
async fn join_after_lobby_is_rejected_with_started_error() {
    let registry = Registry::new();
    let handle = registry
        .create_session(None, vec![question(0, 0)], rules())
        .unwrap();
    let mut rx = handle.subscribe();

    handle.join("conn-a".into(), "ada".into()).await.unwrap();
    wait_for_phase(&mut rx, Phase::Question).await;

    let err = handle.join("conn-b".into(), "bob".into()).await.unwrap_err();
    assert_eq!(err.kind(), "game-already-started");
}

/// Waits for the next per-connection send addressed to `conn`.
async fn next_send_to(rx: &mut broadcast::Receiver<SessionEvent>, conn: &str) -> ServerMsg {
    let fut = async {
        loop {
            match rx.recv().await.expect("event stream closed") {
                SessionEvent::SendTo { connection_id, msg } if connection_id == conn => {
                    return msg;
                }
                _ => continue,
            }
        }
    };
    timeout(Duration::from_secs(120), fut)
        .await
        .expect("no reply within the clock budget")
}

#[tokio::test(start_paused = true)]
async fn timer_resync_reports_the_active_countdown_to_the_requester() {
    let registry = Registry::new();
    let handle = registry
        .create_session(None, vec![question(0, 0)], rules())
        .unwrap();
    let mut rx = handle.subscribe();

    handle.join("conn-a".into(), "ada".into()).await.unwrap();

    handle.get_timer("conn-a".into()).await.unwrap();
    let ServerMsg::TimerProperty { name, .. } = next_send_to(&mut rx, "conn-a").await else {
        panic!("expected a timer property reply");
    };
    assert_eq!(name, "lobbyCountdown");

    wait_for_phase(&mut rx, Phase::Question).await;
    handle.get_timer("conn-a".into()).await.unwrap();
    let ServerMsg::TimerProperty { name, value } = next_send_to(&mut rx, "conn-a").await else {
        panic!("expected a timer property reply");
    };
    assert_eq!(name, "questionCountdown");
    assert!(value >= 1 && value <= rules().question_seconds);
}

#[tokio::test(start_paused = true)]
async fn finished_session_removes_itself_from_the_registry() {
    let registry = Registry::new();
    let handle = registry
        .create_session(Some("AB12".into()), Vec::new(), rules())
        .unwrap();
    let mut rx = handle.subscribe();

    wait_for_phase(&mut rx, Phase::Finished).await;

    // Give the task a moment to run its cleanup.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(registry.lookup_by_id(handle.id).is_none());
    assert!(registry.lookup_by_room_code("AB12").is_none());
}

#[tokio::test(start_paused = true)]
async fn countdown_ticks_are_broadcast_each_second() {
    let registry = Registry::new();
    let handle = registry
        .create_session(None, vec![question(0, 0)], rules())
        .unwrap();
    let mut rx = handle.subscribe();

    // Lobby of 2 seconds: expect values 1 then 0.
    let mut ticks = Vec::new();
    while ticks.len() < 2 {
        if let ServerMsg::TimerTick { name, value } = next_broadcast(&mut rx).await {
            assert_eq!(name, "lobbyCountdown");
            ticks.push(value);
        }
    }
    assert_eq!(ticks, vec![1, 0]);
}
