// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use grov_store::{SessionRepository, StoreResult};
use grov_types::{Session, TaskType};
use tokio::sync::Mutex;

/// Result of `get_or_create`: either the project's one active session, or
/// a freshly minted placeholder plus the lineage hint needed by the task
/// orchestrator.
pub struct SessionLookup {
    pub session: Session,
    pub is_new: bool,
    pub most_recent_completed: Option<Session>,
}

/// Owns the per-project locks that make `get_or_create` race-free: if two
/// requests for the same project arrive simultaneously, only one creates
/// the placeholder session.
pub struct SessionManager<R: SessionRepository> {
    repo: Arc<R>,
    project_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: SessionRepository> SessionManager<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo, project_locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, project_path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.project_locks.lock().await;
        locks.entry(project_path.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn get_or_create(&self, project_path: &str) -> StoreResult<SessionLookup> {
        let project_lock = self.lock_for(project_path).await;
        let _guard = project_lock.lock().await;

        if let Some(session) = self.repo.get_active(project_path).await? {
            return Ok(SessionLookup { session, is_new: false, most_recent_completed: None });
        }

        let most_recent_completed = self.repo.get_most_recent_completed(project_path).await?;
        let placeholder = Session::new_active(project_path, "", TaskType::Main);
        self.repo.insert(&placeholder).await?;
        Ok(SessionLookup { session: placeholder, is_new: true, most_recent_completed })
    }

    pub async fn mark_completed(&self, session: &mut Session) -> StoreResult<()> {
        session.mark_completed();
        self.repo.update(session).await
    }

    pub async fn sweep_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> StoreResult<Vec<String>> {
        self.repo.sweep_stale(now, stale_after_secs).await
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>, retention_secs: i64) -> StoreResult<Vec<String>> {
        self.repo.sweep_expired_completed(now, retention_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grov_store::SqliteStore;

    async fn manager() -> SessionManager<SqliteStore> {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("t.sqlite3")).await.unwrap();
        SessionManager::new(Arc::new(store))
    }

    #[tokio::test]
    async fn get_or_create_creates_placeholder_on_first_call() {
        let mgr = manager().await;
        let lookup = mgr.get_or_create("/proj").await.unwrap();
        assert!(lookup.is_new);
        assert_eq!(lookup.session.original_goal, "");
    }

    #[tokio::test]
    async fn get_or_create_returns_existing_active_session() {
        let mgr = manager().await;
        let first = mgr.get_or_create("/proj").await.unwrap();
        let second = mgr.get_or_create("/proj").await.unwrap();
        assert!(!second.is_new);
        assert_eq!(first.session.id, second.session.id);
    }

    #[tokio::test]
    async fn get_or_create_surfaces_most_recent_completed_for_lineage() {
        let mgr = manager().await;
        let lookup = mgr.get_or_create("/proj").await.unwrap();
        let mut session = lookup.session;
        mgr.mark_completed(&mut session).await.unwrap();

        let next = mgr.get_or_create("/proj").await.unwrap();
        assert!(next.is_new);
        assert_eq!(next.most_recent_completed.unwrap().id, session.id);
    }
}
