use rand::Rng;

use crate::error::GameError;
use crate::types::{AnswerEntry, Player, PlayerView};

/// The set of players joined to one session, plus their answer ledger.
///
/// Vec-backed with linear scans: rosters stay small (well under twenty
/// players), so no index structures are kept. The invariants that matter
/// are unique gamertags and at most one stored answer per question.
#[derive(Debug, Default)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Adds a player with a fresh score and no answers. A blank gamertag is
    /// replaced with a generated one; a taken gamertag is rejected.
    pub fn add(&mut self, connection_id: String, gamertag: &str) -> Result<(), GameError> {
        let tag = if gamertag.trim().is_empty() {
            self.generate_tag()
        } else {
            gamertag.trim().to_string()
        };

        if self.by_tag(&tag).is_some() {
            return Err(GameError::DuplicateTag(tag));
        }

        self.players.push(Player {
            connection_id,
            gamertag: tag,
            ready: false,
            score: 0,
            answers: Vec::new(),
        });
        Ok(())
    }

    pub fn by_tag(&self, tag: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.gamertag == tag)
    }

    pub fn by_connection(&self, connection_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.connection_id == connection_id)
    }

    fn by_connection_mut(&mut self, connection_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.connection_id == connection_id)
    }

    /// The stored answer value for one player's take on a question.
    pub fn answer_for(&self, connection_id: &str, question_id: usize) -> Option<usize> {
        self.by_connection(connection_id)?
            .answers
            .iter()
            .find(|a| a.question_id == question_id)
            .map(|a| a.value)
    }

    /// Upserts an answer: an existing entry for the question is overwritten,
    /// never duplicated. Returns false if the player is unknown.
    pub fn record_answer(&mut self, connection_id: &str, question_id: usize, value: usize) -> bool {
        let Some(player) = self.by_connection_mut(connection_id) else {
            return false;
        };
        match player.answers.iter_mut().find(|a| a.question_id == question_id) {
            Some(entry) => entry.value = value,
            None => player.answers.push(AnswerEntry { question_id, value }),
        }
        true
    }

    /// Marks a player ready. Idempotent; returns false if unknown.
    pub fn set_ready(&mut self, connection_id: &str) -> bool {
        match self.by_connection_mut(connection_id) {
            Some(player) => {
                player.ready = true;
                true
            }
            None => false,
        }
    }

    /// True when the roster is non-empty and everyone is ready.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.ready)
    }

    /// Clears every ready flag; called at each question entry.
    pub fn reset_ready(&mut self) {
        for player in &mut self.players {
            player.ready = false;
        }
    }

    /// Awards points to every player whose stored answer for the question
    /// matches the correct value. A missing answer scores zero.
    pub fn score_round(&mut self, question_id: usize, correct_value: usize, points: u32) {
        for player in &mut self.players {
            let answered_correctly = player
                .answers
                .iter()
                .any(|a| a.question_id == question_id && a.value == correct_value);
            if answered_correctly {
                player.score += points;
            }
        }
    }

    /// Client-facing roster projection.
    pub fn views(&self) -> Vec<PlayerView> {
        self.players
            .iter()
            .map(|p| PlayerView {
                connection_id: p.connection_id.clone(),
                gamertag: p.gamertag.clone(),
                ready: p.ready,
                score: p.score,
            })
            .collect()
    }

    fn generate_tag(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let tag = format!("player-{:04}", rng.random_range(0..10_000));
            if self.by_tag(&tag).is_none() {
                return tag;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_gamertag_is_rejected_and_roster_unchanged() {
        let mut roster = Roster::new();
        roster.add("c1".into(), "ada").unwrap();

        let err = roster.add("c2".into(), "ada").unwrap_err();
        assert_eq!(err.kind(), "duplicate-tag");
        assert_eq!(roster.len(), 1);
        assert!(roster.by_connection("c2").is_none());
    }

    #[test]
    fn blank_gamertag_gets_generated_unique_tag() {
        let mut roster = Roster::new();
        roster.add("c1".into(), "  ").unwrap();

        let player = roster.by_connection("c1").unwrap();
        assert!(player.gamertag.starts_with("player-"));
    }

    #[test]
    fn second_answer_overwrites_first() {
        let mut roster = Roster::new();
        roster.add("c1".into(), "ada").unwrap();

        assert!(roster.record_answer("c1", 0, 2));
        assert!(roster.record_answer("c1", 0, 3));

        let player = roster.by_connection("c1").unwrap();
        assert_eq!(player.answers.len(), 1);
        assert_eq!(roster.answer_for("c1", 0), Some(3));
    }

    #[test]
    fn answers_for_other_questions_are_kept() {
        let mut roster = Roster::new();
        roster.add("c1".into(), "ada").unwrap();

        roster.record_answer("c1", 0, 1);
        roster.record_answer("c1", 1, 2);

        assert_eq!(roster.answer_for("c1", 0), Some(1));
        assert_eq!(roster.answer_for("c1", 1), Some(2));
    }

    #[test]
    fn record_answer_for_unknown_player_is_a_noop() {
        let mut roster = Roster::new();
        assert!(!roster.record_answer("ghost", 0, 1));
    }

    #[test]
    fn scoring_awards_points_only_for_matching_answers() {
        let mut roster = Roster::new();
        roster.add("c1".into(), "ada").unwrap();
        roster.add("c2".into(), "bob").unwrap();

        roster.record_answer("c1", 0, 2);
        // bob never answers
        roster.score_round(0, 2, 10);

        assert_eq!(roster.by_connection("c1").unwrap().score, 10);
        assert_eq!(roster.by_connection("c2").unwrap().score, 0);
    }

    #[test]
    fn ready_flags_reset_between_questions() {
        let mut roster = Roster::new();
        roster.add("c1".into(), "ada").unwrap();
        roster.add("c2".into(), "bob").unwrap();

        assert!(roster.set_ready("c1"));
        assert!(!roster.all_ready());
        assert!(roster.set_ready("c2"));
        assert!(roster.all_ready());

        roster.reset_ready();
        assert!(!roster.all_ready());
    }

    #[test]
    fn empty_roster_is_never_all_ready() {
        let roster = Roster::new();
        assert!(!roster.all_ready());
    }
}
