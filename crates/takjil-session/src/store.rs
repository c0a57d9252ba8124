//! Persistence collaborator.
//!
//! The session layer only needs a handful of row operations: create a
//! session, look it up by code, move its status forward, and the leaderboard
//! insert/top-N pair. [`MemoryStore`] keeps everything in process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use takjil_core::{SessionCode, SessionStatus};

/// A persisted session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_code: SessionCode,
    pub status: SessionStatus,
    pub host_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(session_code: SessionCode, host_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            session_code,
            status: SessionStatus::Waiting,
            host_id: host_id.into(),
            created_at,
            started_at: None,
        }
    }

    /// Whole seconds since the round started, if it has.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|started| u64::try_from((now - started).num_seconds()).unwrap_or(0))
    }
}

/// A leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Session code already in use: {0}")]
    DuplicateCode(SessionCode),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub trait SessionStore: Send + Sync {
    fn insert_session(
        &self,
        record: SessionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn find_session(
        &self,
        code: &SessionCode,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    /// Moves the status forward and stamps `started_at` the first time it is
    /// given. Returns the stored row, or `None` when no row matches.
    fn update_status(
        &self,
        code: &SessionCode,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    fn insert_score(
        &self,
        record: ScoreRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Highest scores first.
    fn top_scores(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ScoreRecord>, StoreError>> + Send;
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionCode, SessionRecord>,
    scores: Vec<ScoreRecord>,
}

/// In-process store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    offline: Arc<RwLock<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until cleared.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write() = offline;
    }

    pub fn session_count(&self) -> usize {
        self.tables.read().sessions.len()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if *self.offline.read() {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }
}

impl SessionStore for MemoryStore {
    async fn insert_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write();
        if tables.sessions.contains_key(&record.session_code) {
            return Err(StoreError::DuplicateCode(record.session_code));
        }
        tables.sessions.insert(record.session_code.clone(), record);
        Ok(())
    }

    async fn find_session(&self, code: &SessionCode) -> Result<Option<SessionRecord>, StoreError> {
        self.check_online()?;
        Ok(self.tables.read().sessions.get(code).cloned())
    }

    async fn update_status(
        &self,
        code: &SessionCode,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write();
        let Some(record) = tables.sessions.get_mut(code) else {
            return Ok(None);
        };
        record.status = record.status.max(status);
        if record.started_at.is_none() {
            record.started_at = started_at;
        }
        Ok(Some(record.clone()))
    }

    async fn insert_score(&self, record: ScoreRecord) -> Result<(), StoreError> {
        self.check_online()?;
        self.tables.write().scores.push(record);
        Ok(())
    }

    async fn top_scores(&self, limit: usize) -> Result<Vec<ScoreRecord>, StoreError> {
        self.check_online()?;
        let mut scores = self.tables.read().scores.clone();
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores.truncate(limit);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn code(s: &str) -> SessionCode {
        SessionCode::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_session(SessionRecord::new(code("K7P4M2"), "h1", now)).await.unwrap();
        let err = store
            .insert_session(SessionRecord::new(code("K7P4M2"), "h2", now))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCode(_)));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_session(SessionRecord::new(code("K7P4M2"), "h", now)).await.unwrap();

        let playing = store
            .update_status(&code("K7P4M2"), SessionStatus::Playing, Some(now))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(playing.started_at, Some(now));

        let later = now + TimeDelta::seconds(5);
        store.update_status(&code("K7P4M2"), SessionStatus::Finished, None).await.unwrap();
        let record = store
            .update_status(&code("K7P4M2"), SessionStatus::Playing, Some(later))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, SessionStatus::Finished);
        assert_eq!(record.started_at, Some(now));
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let store = MemoryStore::new();
        let result = store
            .update_status(&code("AAAAAA"), SessionStatus::Playing, None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_top_scores() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for score in [30, 120, 10, 80, 50, 90] {
            store.insert_score(ScoreRecord { score, created_at: now }).await.unwrap();
        }
        let top: Vec<u32> = store.top_scores(5).await.unwrap().iter().map(|r| r.score).collect();
        assert_eq!(top, vec![120, 90, 80, 50, 30]);
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.find_session(&code("K7P4M2")).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_offline(false);
        assert!(store.find_session(&code("K7P4M2")).await.unwrap().is_none());
    }

    #[test]
    fn test_elapsed_secs() {
        let now = Utc::now();
        let mut record = SessionRecord::new(code("K7P4M2"), "h", now);
        assert_eq!(record.elapsed_secs(now), None);
        record.started_at = Some(now - TimeDelta::seconds(12));
        assert_eq!(record.elapsed_secs(now), Some(12));
    }
}
