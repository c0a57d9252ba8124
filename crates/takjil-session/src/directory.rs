//! Session directory: create, look up and advance session records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use takjil_core::{SessionCode, SessionStatus};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::store::{ScoreRecord, SessionRecord, SessionStore};

pub struct SessionDirectory<S> {
    store: Arc<S>,
    config: SessionConfig,
}

impl<S> Clone for SessionDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: SessionStore> SessionDirectory<S> {
    pub fn new(store: Arc<S>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a session hosted by `host_id` under a fresh random code.
    pub async fn create_session(&self, host_id: &str) -> Result<SessionCode, SessionError> {
        let code = SessionCode::random();
        self.create_session_with_code(host_id, code).await
    }

    /// Create a session under a caller-chosen code. A code that is already
    /// taken fails with a persistence error rather than being retried.
    pub async fn create_session_with_code(
        &self,
        host_id: &str,
        code: SessionCode,
    ) -> Result<SessionCode, SessionError> {
        let record = SessionRecord::new(code.clone(), host_id, Utc::now());
        self.store.insert_session(record).await.inspect_err(|err| {
            tracing::warn!(session_code = %code, error = %err, "Failed to create session");
        })?;
        tracing::info!(session_code = %code, host_id, "Session created");
        Ok(code)
    }

    /// Look up a joinable session. Finished and unknown codes are both
    /// [`SessionError::NotFound`].
    pub async fn join_session(&self, code: &SessionCode) -> Result<SessionRecord, SessionError> {
        match self.store.find_session(code).await? {
            Some(record) if record.status.is_joinable() => {
                tracing::debug!(session_code = %code, status = %record.status, "Session found");
                Ok(record)
            }
            _ => Err(SessionError::NotFound(code.clone())),
        }
    }

    /// Like [`SessionDirectory::join_session`], for a code typed by a user.
    pub async fn join_with_input(&self, input: &str) -> Result<SessionRecord, SessionError> {
        let code = SessionCode::normalize(input)?;
        self.join_session(&code).await
    }

    /// Mark the session as playing. Repeat calls keep the first start time.
    pub async fn start_game(&self, code: &SessionCode) -> Result<DateTime<Utc>, SessionError> {
        let now = Utc::now();
        let record = self
            .store
            .update_status(code, SessionStatus::Playing, Some(now))
            .await?
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        tracing::info!(session_code = %code, "Game started");
        Ok(record.started_at.unwrap_or(now))
    }

    /// Mark the session as finished. Nobody is told over the relay.
    pub async fn finish_session(&self, code: &SessionCode) -> Result<(), SessionError> {
        self.store
            .update_status(code, SessionStatus::Finished, None)
            .await?
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        tracing::info!(session_code = %code, "Session finished");
        Ok(())
    }

    pub async fn record_score(&self, score: u32) -> Result<(), SessionError> {
        self.store
            .insert_score(ScoreRecord {
                score,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Leaderboard, best first, capped at the configured size.
    pub async fn top_scores(&self) -> Result<Vec<ScoreRecord>, SessionError> {
        Ok(self.store.top_scores(self.config.leaderboard_size).await?)
    }

    pub fn join_url(&self, code: &SessionCode) -> String {
        self.config.join_url(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn directory() -> SessionDirectory<MemoryStore> {
        SessionDirectory::new(Arc::new(MemoryStore::new()), SessionConfig::default())
    }

    fn code(s: &str) -> SessionCode {
        SessionCode::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_join() {
        let directory = directory();
        let code = directory.create_session("player_host").await.unwrap();
        let record = directory.join_session(&code).await.unwrap();
        assert_eq!(record.status, SessionStatus::Waiting);
        assert_eq!(record.host_id, "player_host");
        assert!(record.started_at.is_none());
    }

    #[tokio::test]
    async fn test_join_unknown_code() {
        let err = directory().join_session(&code("ZZZZZZ")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_join_by_status() {
        let directory = directory();
        let code = directory.create_session_with_code("h", code("K7P4M2")).await.unwrap();

        directory.start_game(&code).await.unwrap();
        let record = directory.join_session(&code).await.unwrap();
        assert_eq!(record.status, SessionStatus::Playing);
        assert!(record.started_at.is_some());

        directory.finish_session(&code).await.unwrap();
        assert!(matches!(
            directory.join_session(&code).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_start_game_is_idempotent() {
        let directory = directory();
        let code = directory.create_session("h").await.unwrap();
        let first = directory.start_game(&code).await.unwrap();
        let second = directory.start_game(&code).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_persistence_error() {
        let directory = directory();
        directory.create_session_with_code("h1", code("K7P4M2")).await.unwrap();
        let err = directory
            .create_session_with_code("h2", code("K7P4M2"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let directory = directory();
        directory.store().set_offline(true);
        let err = directory.create_session("h").await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_join_with_typed_input() {
        let directory = directory();
        directory.create_session_with_code("h", code("K7P4M2")).await.unwrap();
        assert!(directory.join_with_input(" k7p-4m2 ").await.is_ok());
        assert!(matches!(
            directory.join_with_input("k7p4").await,
            Err(SessionError::InvalidCode(_))
        ));
    }

    #[tokio::test]
    async fn test_leaderboard_respects_size() {
        let directory = directory();
        for score in [10, 60, 20, 50, 40, 30] {
            directory.record_score(score).await.unwrap();
        }
        let top: Vec<u32> = directory.top_scores().await.unwrap().iter().map(|s| s.score).collect();
        assert_eq!(top, vec![60, 50, 40, 30, 20]);
    }

    #[tokio::test]
    async fn test_missing_session_cannot_start() {
        let err = directory().start_game(&code("ZZZZZZ")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }
}
