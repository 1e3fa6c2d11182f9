//! Player sessions with sliding expiry.
//!
//! Injected into the casino facade as a `SessionStore`, so a deployment can
//! swap the in-process map for a shared store without touching the engines.

use crate::games::types::GameType;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: u64,
    pub game: GameType,
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub rounds: u64,
}

pub trait SessionStore: Send + Sync {
    /// Create or refresh the user's session and count one round
    fn touch(&self, user_id: u64, game: GameType) -> Session;

    fn get(&self, session_id: Uuid) -> Option<Session>;

    fn for_user(&self, user_id: u64) -> Option<Session>;

    fn end(&self, session_id: Uuid) -> Option<Session>;

    /// Drop sessions idle longer than the TTL, returning how many went
    fn purge_expired(&self) -> usize;
}

/// In-process store keyed by session id, with a per-user index
pub struct TtlSessionStore {
    sessions: DashMap<Uuid, Session>,
    by_user: DashMap<u64, Uuid>,
    ttl: chrono::Duration,
}

impl TtlSessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1)),
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        now - session.last_seen > self.ttl
    }

    pub fn touch_at(&self, user_id: u64, game: GameType, now: DateTime<Utc>) -> Session {
        if let Some(id) = self.by_user.get(&user_id).map(|e| *e.value()) {
            if let Some(mut session) = self.sessions.get_mut(&id) {
                if !self.is_expired(&session, now) {
                    session.last_seen = now;
                    session.game = game;
                    session.rounds += 1;
                    return session.clone();
                }
            }
            self.sessions.remove(&id);
        }

        let session = Session {
            session_id: Uuid::new_v4(),
            user_id,
            game,
            started_at: now,
            last_seen: now,
            rounds: 1,
        };
        self.sessions.insert(session.session_id, session.clone());
        self.by_user.insert(user_id, session.session_id);
        tracing::debug!(user_id, session_id = %session.session_id, game = %game, "Session started");
        session
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| now - session.last_seen <= self.ttl);
        self.by_user.retain(|_, id| self.sessions.contains_key(id));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for TtlSessionStore {
    fn touch(&self, user_id: u64, game: GameType) -> Session {
        self.touch_at(user_id, game, Utc::now())
    }

    fn get(&self, session_id: Uuid) -> Option<Session> {
        let session = self.sessions.get(&session_id)?.clone();
        if self.is_expired(&session, Utc::now()) {
            return None;
        }
        Some(session)
    }

    fn for_user(&self, user_id: u64) -> Option<Session> {
        let id = *self.by_user.get(&user_id)?.value();
        self.get(id)
    }

    fn end(&self, session_id: Uuid) -> Option<Session> {
        let (_, session) = self.sessions.remove(&session_id)?;
        self.by_user.remove_if(&session.user_id, |_, id| *id == session_id);
        Some(session)
    }

    fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }
}
