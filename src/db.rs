use std::sync::Mutex;

use chrono::Utc;
use lazy_static::lazy_static;
use rusqlite::{params, Connection};

use crate::error::{AppError, AppResult};
use crate::schema::Plan;

/// Append-only history of terminal task outcomes, independent of Semantic Memory.
/// A `rusqlite::Connection` is not `Sync`, so access is serialized behind a
/// global mutex.
lazy_static! {
    static ref DB_CONN: Mutex<Option<Connection>> = Mutex::new(None);
}

fn get_db_lock() -> std::sync::MutexGuard<'static, Option<Connection>> {
    match DB_CONN.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("audit db mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

pub struct AuditStore;

impl AuditStore {
    pub fn open(db_path: impl Into<String>) -> AppResult<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_history (
                task_id TEXT PRIMARY KEY,
                goal TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                plan TEXT NOT NULL,
                finished_at TEXT NOT NULL
            )",
            [],
        )?;
        *get_db_lock() = Some(conn);
        Ok(Self)
    }

    pub async fn record(
        &self,
        task_id: &str,
        goal: &str,
        status: &str,
        reason: Option<&str>,
        plan: &Plan,
    ) -> AppResult<()> {
        let task_id = task_id.to_string();
        let goal = goal.to_string();
        let status = status.to_string();
        let reason = reason.map(str::to_string);
        let plan_json = serde_json::to_string(plan)?;
        let finished_at = Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let guard = get_db_lock();
            let conn = guard
                .as_ref()
                .ok_or_else(|| AppError::Unknown("audit db not initialized".to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO task_history (task_id, goal, status, reason, plan, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![task_id, goal, status, reason, plan_json, finished_at],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Unknown(format!("audit write task panicked: {e}")))??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_allows_duplicate_task_id_overwrite() {
        let path = std::env::temp_dir()
            .join(format!("steer_audit_test_{}.db", uuid::Uuid::new_v4()))
            .to_str()
            .unwrap()
            .to_string();
        let store = AuditStore::open(&path).unwrap();
        let plan: Plan = vec![];
        store.record("t1", "goal", "done", None, &plan).await.unwrap();
        store.record("t1", "goal", "failed", Some("oops"), &plan).await.unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
