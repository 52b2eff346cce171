// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grov_types::{DriftLogEntry, Session, Step};

use crate::error::StoreResult;

/// Repository for `Session` rows: atomic single-row updates and a
/// transactional multi-statement update.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_active(&self, project_path: &str) -> StoreResult<Option<Session>>;

    async fn get_most_recent_completed(&self, project_path: &str) -> StoreResult<Option<Session>>;

    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>>;

    async fn insert(&self, session: &Session) -> StoreResult<()>;

    /// Atomic single-row replace, used for most state transitions.
    async fn update(&self, session: &Session) -> StoreResult<()>;

    /// Transactional multi-statement update: replaces the session row and
    /// appends a drift-log entry in the same transaction.
    async fn update_session_state(&self, session: &Session, drift_entry: Option<&DriftLogEntry>) -> StoreResult<()>;

    /// Deletes the session and its steps/drift-log rows. RESTRICT
    /// semantics: fails if a non-completed child session still references
    /// it.
    async fn delete_cascade(&self, session_id: &str) -> StoreResult<()>;

    /// Sessions with status=active and `updated_at` older than
    /// `stale_after_secs` become `abandoned`; returns the affected ids.
    async fn sweep_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> StoreResult<Vec<String>>;

    /// Completed sessions older than `retention_secs` are deleted (with
    /// their steps/drift-log rows), skipping any with a non-completed
    /// child; returns the deleted ids.
    async fn sweep_expired_completed(&self, now: DateTime<Utc>, retention_secs: i64) -> StoreResult<Vec<String>>;
}

/// Repository for `Step` rows, append-only aside from the reasoning
/// back-fill: step_reasoning back-fills empty reasoning with the
/// analyzer's per-id texts.
#[async_trait]
pub trait StepRepository: Send + Sync {
    async fn insert(&self, step: &Step) -> StoreResult<()>;

    async fn recent(&self, session_id: &str, limit: usize) -> StoreResult<Vec<Step>>;

    /// Back-fills reasoning for at most 10 of the most recent steps whose
    /// reasoning is currently empty.
    async fn backfill_reasoning(&self, texts_by_step_id: &[(String, String)]) -> StoreResult<()>;
}

/// Repository for drift-log rows: logged to the drift log (not to steps)
/// when the drift score is low.
#[async_trait]
pub trait DriftLogRepository: Send + Sync {
    async fn insert(&self, entry: &DriftLogEntry) -> StoreResult<()>;
}
