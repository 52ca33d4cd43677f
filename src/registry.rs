use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;

use crate::error::GameError;
use crate::session::{self, SessionHandle};
use crate::types::{GameRules, QuestionBundle};

const ROOM_CODE_LEN: usize = 4;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Holds all live sessions. The only state shared across the process;
/// everything else is owned by the individual session tasks.
pub struct Registry {
    next_id: AtomicU64,
    /// session id -> handle
    sessions: DashMap<u64, SessionHandle>,
    /// room code -> session id
    room_codes: DashMap<String, u64>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            sessions: DashMap::new(),
            room_codes: DashMap::new(),
        })
    }

    /// Allocates a session with a strictly increasing id and a unique room
    /// code, then spawns its task. A caller-supplied code that is already
    /// held by another live session is rejected before anything is created.
    pub fn create_session(
        self: &Arc<Self>,
        room_code: Option<String>,
        questions: Vec<QuestionBundle>,
        rules: GameRules,
    ) -> Result<SessionHandle, GameError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let code = match room_code {
            Some(code) => match self.room_codes.entry(code.clone()) {
                Entry::Occupied(_) => return Err(GameError::RoomCodeTaken(code)),
                Entry::Vacant(slot) => {
                    slot.insert(id);
                    code
                }
            },
            None => self.claim_generated_code(id),
        };

        let handle = session::spawn_session(self.clone(), id, code, questions, rules);
        self.sessions.insert(id, handle.clone());

        tracing::info!("Session {} registered with room code {}", id, handle.room_code);
        Ok(handle)
    }

    pub fn lookup_by_room_code(&self, code: &str) -> Option<SessionHandle> {
        let id = *self.room_codes.get(code)?;
        self.lookup_by_id(id)
    }

    pub fn lookup_by_id(&self, id: u64) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|h| h.clone())
    }

    /// Removes a session and stops its timer. Idempotent: removing an
    /// already-removed id is a no-op.
    pub fn remove_session(&self, id: u64) {
        if let Some((_, handle)) = self.sessions.remove(&id) {
            self.room_codes.remove(&handle.room_code);
            handle.shutdown();
            tracing::info!("Session {} removed", id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Resamples codes until one is free, claiming it atomically.
    fn claim_generated_code(&self, id: u64) -> String {
        loop {
            let code = generate_room_code();
            if let Entry::Vacant(slot) = self.room_codes.entry(code.clone()) {
                slot.insert(id);
                return code;
            }
        }
    }
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let i = rng.random_range(0..ROOM_CODE_CHARSET.len());
            char::from(ROOM_CODE_CHARSET[i])
        })
        .collect()
}
