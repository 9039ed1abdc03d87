use std::collections::HashMap;

use cardassist_core::{ConversationSession, ConversationTurn, Intent};
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

const MAX_TURNS_PER_SESSION: usize = 40;
const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Ordered chat history per session, kept for the chat surfaces only. The
/// router never reads it.
///
/// Only ids issued by [`ConversationLog::open`] are honoured. Once
/// `max_sessions` is reached the least recently active session is evicted.
#[derive(Debug)]
pub struct ConversationLog {
    inner: RwLock<SessionTable>,
    max_sessions: usize,
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<String, TrackedSession>,
    clock: u64,
}

#[derive(Debug)]
struct TrackedSession {
    session: ConversationSession,
    last_seen: u64,
}

impl SessionTable {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let idle = self
            .sessions
            .iter()
            .min_by_key(|(_, tracked)| tracked.last_seen)
            .map(|(id, _)| id.clone())?;
        self.sessions.remove(&idle);
        Some(idle)
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            inner: RwLock::new(SessionTable::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Returns the given id when it names a live session, otherwise issues a
    /// fresh one. Client-chosen ids never create sessions.
    pub fn open(&self, session_id: Option<&str>) -> String {
        if let Some(id) = session_id {
            if self.inner.read().sessions.contains_key(id) {
                return id.to_string();
            }
            debug!(session_id = id, "unknown session id, issuing a new one");
        }

        let id = Uuid::new_v4().to_string();
        let mut table = self.inner.write();
        while table.sessions.len() >= self.max_sessions {
            let Some(idle) = table.evict_least_recent() else {
                break;
            };
            debug!(session_id = %idle, "evicted idle session");
        }
        let last_seen = table.tick();
        table.sessions.insert(
            id.clone(),
            TrackedSession {
                session: ConversationSession {
                    session_id: id.clone(),
                    started_at: Utc::now(),
                    turns: Vec::new(),
                },
                last_seen,
            },
        );
        id
    }

    /// Appends a turn to a live session. Turns for unknown or evicted
    /// sessions are dropped.
    pub fn record(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        intent: Option<Intent>,
        failed: bool,
    ) {
        let mut table = self.inner.write();
        let now = table.tick();
        let Some(tracked) = table.sessions.get_mut(session_id) else {
            debug!(session_id, "dropping turn for unknown session");
            return;
        };
        tracked.last_seen = now;
        let session = &mut tracked.session;

        session.turns.push(ConversationTurn {
            at: Utc::now(),
            user_text: user_text.to_string(),
            assistant_text: assistant_text.to_string(),
            intent,
            failed,
        });

        if session.turns.len() > MAX_TURNS_PER_SESSION {
            let keep_from = session.turns.len() - MAX_TURNS_PER_SESSION;
            session.turns = session.turns.split_off(keep_from);
        }
    }

    pub fn history(&self, session_id: &str) -> Option<Vec<ConversationTurn>> {
        self.inner
            .read()
            .sessions
            .get(session_id)
            .map(|tracked| tracked.session.turns.clone())
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }
}
