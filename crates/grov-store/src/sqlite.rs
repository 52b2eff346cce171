// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grov_types::{
    ActionType, DriftLogEntry, Session, SessionMode, SessionStatus, Step, TaskType,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DriftLogRepository, SessionRepository, StepRepository};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_path TEXT NOT NULL,
    original_goal TEXT NOT NULL,
    status TEXT NOT NULL,
    task_type TEXT NOT NULL,
    parent_session_id TEXT,
    context_tokens INTEGER NOT NULL DEFAULT 0,
    mode TEXT NOT NULL,
    waiting_for_recovery INTEGER NOT NULL DEFAULT 0,
    escalation_count INTEGER NOT NULL DEFAULT 0,
    last_checked_at TEXT,
    pending_correction TEXT,
    pending_forced_recovery TEXT,
    pending_clear_summary TEXT,
    final_response TEXT,
    prompt_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_project_status ON sessions(project_path, status);

CREATE TABLE IF NOT EXISTS steps (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    files TEXT NOT NULL DEFAULT '[]',
    folders TEXT NOT NULL DEFAULT '[]',
    command TEXT,
    reasoning TEXT,
    drift_score INTEGER,
    is_validated INTEGER NOT NULL DEFAULT 0,
    is_key_decision INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_steps_session ON steps(session_id, timestamp);

CREATE TABLE IF NOT EXISTS drift_log (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    diagnostic TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
"#;

/// SQLite-backed session/step/drift-log store. The repository contract
/// requires atomic single-row updates and a transactional multi-statement
/// update; a single connection guarded by a mutex keeps
/// writes serialized; reads and writes both run on the blocking pool since
/// `rusqlite` is synchronous.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA foreign_keys = OFF; PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await??;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn run_blocking<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("sqlite store mutex poisoned");
            f(&mut conn)
        })
        .await?;
        Ok(result?)
    }
}

fn status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Abandoned => "abandoned",
    }
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "completed" => SessionStatus::Completed,
        "abandoned" => SessionStatus::Abandoned,
        _ => SessionStatus::Active,
    }
}

fn task_type_str(t: TaskType) -> &'static str {
    match t {
        TaskType::Main => "main",
        TaskType::Subtask => "subtask",
        TaskType::Parallel => "parallel",
    }
}

fn parse_task_type(s: &str) -> TaskType {
    match s {
        "subtask" => TaskType::Subtask,
        "parallel" => TaskType::Parallel,
        _ => TaskType::Main,
    }
}

fn mode_str(m: SessionMode) -> &'static str {
    match m {
        SessionMode::Normal => "normal",
        SessionMode::Drifted => "drifted",
        SessionMode::Forced => "forced",
    }
}

fn parse_mode(s: &str) -> SessionMode {
    match s {
        "drifted" => SessionMode::Drifted,
        "forced" => SessionMode::Forced,
        _ => SessionMode::Normal,
    }
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get("id")?,
        project_path: row.get("project_path")?,
        original_goal: row.get("original_goal")?,
        status: parse_status(&row.get::<_, String>("status")?),
        task_type: parse_task_type(&row.get::<_, String>("task_type")?),
        parent_session_id: row.get("parent_session_id")?,
        context_tokens: row.get::<_, i64>("context_tokens")? as u64,
        mode: parse_mode(&row.get::<_, String>("mode")?),
        waiting_for_recovery: row.get::<_, i64>("waiting_for_recovery")? != 0,
        escalation_count: row.get::<_, i64>("escalation_count")? as u8,
        last_checked_at: row.get("last_checked_at")?,
        pending_correction: row.get("pending_correction")?,
        pending_forced_recovery: row.get("pending_forced_recovery")?,
        pending_clear_summary: row.get("pending_clear_summary")?,
        final_response: row.get("final_response")?,
        prompt_count: row.get::<_, i64>("prompt_count")? as u32,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

const SESSION_COLUMNS: &str = "id, project_path, original_goal, status, task_type, parent_session_id, \
    context_tokens, mode, waiting_for_recovery, escalation_count, last_checked_at, pending_correction, \
    pending_forced_recovery, pending_clear_summary, final_response, prompt_count, created_at, updated_at, completed_at";

fn upsert_session(conn: &Connection, s: &Session) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19) \
             ON CONFLICT(id) DO UPDATE SET project_path=excluded.project_path, original_goal=excluded.original_goal, \
             status=excluded.status, task_type=excluded.task_type, parent_session_id=excluded.parent_session_id, \
             context_tokens=excluded.context_tokens, mode=excluded.mode, waiting_for_recovery=excluded.waiting_for_recovery, \
             escalation_count=excluded.escalation_count, last_checked_at=excluded.last_checked_at, \
             pending_correction=excluded.pending_correction, pending_forced_recovery=excluded.pending_forced_recovery, \
             pending_clear_summary=excluded.pending_clear_summary, final_response=excluded.final_response, \
             prompt_count=excluded.prompt_count, created_at=excluded.created_at, updated_at=excluded.updated_at, \
             completed_at=excluded.completed_at"
        ),
        params![
            s.id,
            s.project_path,
            s.original_goal,
            status_str(s.status),
            task_type_str(s.task_type),
            s.parent_session_id,
            s.context_tokens as i64,
            mode_str(s.mode),
            s.waiting_for_recovery as i64,
            s.escalation_count as i64,
            s.last_checked_at,
            s.pending_correction,
            s.pending_forced_recovery,
            s.pending_clear_summary,
            s.final_response,
            s.prompt_count as i64,
            s.created_at,
            s.updated_at,
            s.completed_at,
        ],
    )?;
    Ok(())
}

fn has_non_completed_child(conn: &Connection, session_id: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE parent_session_id = ?1 AND status != 'completed'",
        params![session_id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn delete_session_rows(conn: &Connection, session_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM drift_log WHERE session_id = ?1", params![session_id])?;
    conn.execute("DELETE FROM steps WHERE session_id = ?1", params![session_id])?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
    Ok(())
}

#[async_trait]
impl SessionRepository for SqliteStore {
    async fn get_active(&self, project_path: &str) -> StoreResult<Option<Session>> {
        let project_path = project_path.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE project_path = ?1 AND status = 'active' LIMIT 1"),
                params![project_path],
                session_from_row,
            )
            .optional()
        })
        .await
    }

    async fn get_most_recent_completed(&self, project_path: &str) -> StoreResult<Option<Session>> {
        let project_path = project_path.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE project_path = ?1 AND status = 'completed' \
                     ORDER BY completed_at DESC LIMIT 1"
                ),
                params![project_path],
                session_from_row,
            )
            .optional()
        })
        .await
    }

    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            conn.query_row(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"), params![session_id], session_from_row)
                .optional()
        })
        .await
    }

    async fn insert(&self, session: &Session) -> StoreResult<()> {
        let session = session.clone();
        self.run_blocking(move |conn| upsert_session(conn, &session)).await
    }

    async fn update(&self, session: &Session) -> StoreResult<()> {
        let session = session.clone();
        self.run_blocking(move |conn| upsert_session(conn, &session)).await
    }

    async fn update_session_state(&self, session: &Session, drift_entry: Option<&DriftLogEntry>) -> StoreResult<()> {
        let session = session.clone();
        let drift_entry = drift_entry.cloned();
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            upsert_session(&tx, &session)?;
            if let Some(entry) = &drift_entry {
                tx.execute(
                    "INSERT INTO drift_log (id, session_id, score, diagnostic, timestamp) VALUES (?1,?2,?3,?4,?5)",
                    params![entry.id, entry.session_id, entry.score as i64, entry.diagnostic, entry.timestamp],
                )?;
            }
            tx.commit()
        })
        .await
    }

    async fn delete_cascade(&self, session_id: &str) -> StoreResult<()> {
        let session_id = session_id.to_string();
        let id_for_error = session_id.clone();
        let blocked = self.run_blocking(move |conn| has_non_completed_child(conn, &session_id)).await?;
        if blocked {
            return Err(StoreError::HasActiveChild(id_for_error));
        }
        let session_id = id_for_error;
        self.run_blocking(move |conn| delete_session_rows(conn, &session_id)).await
    }

    async fn sweep_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> StoreResult<Vec<String>> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE status = 'active'"))?;
            let rows = stmt.query_map([], session_from_row)?;
            let mut abandoned = Vec::new();
            for row in rows {
                let mut s = row?;
                if s.is_stale(now, stale_after_secs) {
                    s.mark_abandoned();
                    upsert_session(conn, &s)?;
                    abandoned.push(s.id);
                }
            }
            Ok(abandoned)
        })
        .await
    }

    async fn sweep_expired_completed(&self, now: DateTime<Utc>, retention_secs: i64) -> StoreResult<Vec<String>> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE status = 'completed'"))?;
            let rows = stmt.query_map([], session_from_row)?;
            let mut deleted = Vec::new();
            for row in rows {
                let s = row?;
                if s.is_completed_expired(now, retention_secs) && !has_non_completed_child(conn, &s.id)? {
                    delete_session_rows(conn, &s.id)?;
                    deleted.push(s.id);
                }
            }
            Ok(deleted)
        })
        .await
    }
}

fn action_type_str(a: ActionType) -> &'static str {
    match a {
        ActionType::Edit => "edit",
        ActionType::Write => "write",
        ActionType::Bash => "bash",
        ActionType::Read => "read",
        ActionType::Glob => "glob",
        ActionType::Grep => "grep",
        ActionType::Task => "task",
        ActionType::Other => "other",
    }
}

fn parse_action_type(s: &str) -> ActionType {
    match s {
        "edit" => ActionType::Edit,
        "write" => ActionType::Write,
        "bash" => ActionType::Bash,
        "read" => ActionType::Read,
        "glob" => ActionType::Glob,
        "grep" => ActionType::Grep,
        "task" => ActionType::Task,
        _ => ActionType::Other,
    }
}

fn step_from_row(row: &Row) -> rusqlite::Result<Step> {
    let files_json: String = row.get("files")?;
    let folders_json: String = row.get("folders")?;
    Ok(Step {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        action_type: parse_action_type(&row.get::<_, String>("action_type")?),
        files: serde_json::from_str(&files_json).unwrap_or_default(),
        folders: serde_json::from_str(&folders_json).unwrap_or_default(),
        command: row.get("command")?,
        reasoning: row.get("reasoning")?,
        drift_score: row.get::<_, Option<i64>>("drift_score")?.map(|v| v as u8),
        is_validated: row.get::<_, i64>("is_validated")? != 0,
        is_key_decision: row.get::<_, i64>("is_key_decision")? != 0,
        timestamp: row.get("timestamp")?,
    })
}

#[async_trait]
impl StepRepository for SqliteStore {
    async fn insert(&self, step: &Step) -> StoreResult<()> {
        let step = step.clone();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO steps (id, session_id, action_type, files, folders, command, reasoning, drift_score, \
                 is_validated, is_key_decision, timestamp) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    step.id,
                    step.session_id,
                    action_type_str(step.action_type),
                    serde_json::to_string(&step.files).unwrap_or_else(|_| "[]".into()),
                    serde_json::to_string(&step.folders).unwrap_or_else(|_| "[]".into()),
                    step.command,
                    step.reasoning,
                    step.drift_score.map(|v| v as i64),
                    step.is_validated as i64,
                    step.is_key_decision as i64,
                    step.timestamp,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent(&self, session_id: &str, limit: usize) -> StoreResult<Vec<Step>> {
        let session_id = session_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, action_type, files, folders, command, reasoning, drift_score, \
                 is_validated, is_key_decision, timestamp FROM steps WHERE session_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit as i64], step_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn backfill_reasoning(&self, texts_by_step_id: &[(String, String)]) -> StoreResult<()> {
        let texts = texts_by_step_id.to_vec();
        self.run_blocking(move |conn| {
            let tx = conn.transaction()?;
            for (id, text) in texts.iter().take(10) {
                tx.execute("UPDATE steps SET reasoning = ?1 WHERE id = ?2 AND reasoning IS NULL", params![text, id])?;
            }
            tx.commit()
        })
        .await
    }
}

#[async_trait]
impl DriftLogRepository for SqliteStore {
    async fn insert(&self, entry: &DriftLogEntry) -> StoreResult<()> {
        let entry = entry.clone();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO drift_log (id, session_id, score, diagnostic, timestamp) VALUES (?1,?2,?3,?4,?5)",
                params![entry.id, entry.session_id, entry.score as i64, entry.diagnostic, entry.timestamp],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grov_types::TaskType;

    async fn temp_store() -> SqliteStore {
        let dir = tempfile::tempdir().unwrap();
        SqliteStore::open(dir.path().join("grov-test.sqlite3")).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_active_round_trips() {
        let store = temp_store().await;
        let session = Session::new_active("/proj", "goal", TaskType::Main);
        store.insert(&session).await.unwrap();
        let fetched = store.get_active("/proj").await.unwrap().unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn get_active_ignores_completed_sessions() {
        let store = temp_store().await;
        let mut session = Session::new_active("/proj", "goal", TaskType::Main);
        session.mark_completed();
        store.insert(&session).await.unwrap();
        assert!(store.get_active("/proj").await.unwrap().is_none());
        assert!(store.get_most_recent_completed("/proj").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_overwrites_existing_row() {
        let store = temp_store().await;
        let mut session = Session::new_active("/proj", "goal", TaskType::Main);
        store.insert(&session).await.unwrap();
        session.prompt_count = 5;
        store.update(&session).await.unwrap();
        let fetched = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.prompt_count, 5);
    }

    #[tokio::test]
    async fn delete_cascade_removes_steps_and_drift_log() {
        let store = temp_store().await;
        let session = Session::new_active("/proj", "goal", TaskType::Main);
        store.insert(&session).await.unwrap();
        let step = Step::new(session.id.clone(), ActionType::Edit);
        StepRepository::insert(&store, &step).await.unwrap();
        let entry = DriftLogEntry::new(session.id.clone(), 10, "low drift");
        DriftLogRepository::insert(&store, &entry).await.unwrap();

        store.delete_cascade(&session.id).await.unwrap();
        assert!(store.get(&session.id).await.unwrap().is_none());
        assert!(StepRepository::recent(&store, &session.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascade_refuses_when_non_completed_child_exists() {
        let store = temp_store().await;
        let parent = Session::new_active("/proj", "goal", TaskType::Main);
        store.insert(&parent).await.unwrap();
        let mut child = Session::new_active("/proj", "child goal", TaskType::Subtask);
        child.parent_session_id = Some(parent.id.clone());
        store.insert(&child).await.unwrap();

        assert!(store.delete_cascade(&parent.id).await.is_err());
        assert!(store.get(&parent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_stale_marks_old_active_sessions_abandoned() {
        let store = temp_store().await;
        let mut session = Session::new_active("/proj", "goal", TaskType::Main);
        session.updated_at = Utc::now() - chrono::Duration::seconds(4000);
        store.insert(&session).await.unwrap();

        let abandoned = store.sweep_stale(Utc::now(), 3600).await.unwrap();
        assert_eq!(abandoned, vec![session.id.clone()]);
        assert_eq!(store.get(&session.id).await.unwrap().unwrap().status, SessionStatus::Abandoned);
    }

    #[tokio::test]
    async fn sweep_expired_completed_deletes_old_rows() {
        let store = temp_store().await;
        let mut session = Session::new_active("/proj", "goal", TaskType::Main);
        session.mark_completed();
        session.completed_at = Some(Utc::now() - chrono::Duration::days(2));
        store.insert(&session).await.unwrap();

        let deleted = store.sweep_expired_completed(Utc::now(), 86_400).await.unwrap();
        assert_eq!(deleted, vec![session.id.clone()]);
        assert!(store.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backfill_reasoning_only_touches_empty_reasoning() {
        let store = temp_store().await;
        let session = Session::new_active("/proj", "goal", TaskType::Main);
        store.insert(&session).await.unwrap();
        let mut step = Step::new(session.id.clone(), ActionType::Edit);
        step.reasoning = Some("already set".into());
        StepRepository::insert(&store, &step).await.unwrap();

        store.backfill_reasoning(&[(step.id.clone(), "new reasoning".into())]).await.unwrap();
        let fetched = &StepRepository::recent(&store, &session.id, 1).await.unwrap()[0];
        assert_eq!(fetched.reasoning.as_deref(), Some("already set"));
    }
}
