use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::schema::{LogEntry, StatePayload, TaskEvent, TaskRecord, TaskState};

pub type TaskHandle = Arc<Mutex<TaskRecord>>;

struct Subscriber {
    tx: mpsc::Sender<TaskEvent>,
}

/// In-memory table of task records plus best-effort broadcast of their events.
/// A subscriber that falls behind its bounded queue is dropped rather than
/// stalling the lifecycle worker: `try_send`, never `send().await`.
pub struct TaskRegistry {
    tasks: StdMutex<HashMap<String, TaskHandle>>,
    cancellations: StdMutex<HashMap<String, CancellationToken>>,
    subscribers: StdMutex<Vec<Subscriber>>,
    backlog: usize,
}

impl TaskRegistry {
    pub fn new(backlog: usize) -> Self {
        Self {
            tasks: StdMutex::new(HashMap::new()),
            cancellations: StdMutex::new(HashMap::new()),
            subscribers: StdMutex::new(Vec::new()),
            backlog,
        }
    }

    pub fn allocate(&self, goal: String) -> (String, TaskHandle, CancellationToken) {
        let id = Uuid::new_v4().to_string();
        let record = Arc::new(Mutex::new(TaskRecord::new(id.clone(), goal)));
        let cancel = CancellationToken::new();
        self.tasks.lock().unwrap().insert(id.clone(), record.clone());
        self.cancellations.lock().unwrap().insert(id.clone(), cancel.clone());
        (id, record, cancel)
    }

    pub fn get(&self, id: &str) -> Option<TaskHandle> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.cancellations.lock().unwrap().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// True if any task currently has a pending or acted-upon cancellation. Backs
    /// the Host Monitor's informational `abort_status`.
    pub fn any_aborting(&self) -> bool {
        self.cancellations.lock().unwrap().values().any(|token| token.is_cancelled())
    }

    pub fn subscribe(&self) -> mpsc::Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel(self.backlog);
        self.subscribers.lock().unwrap().push(Subscriber { tx });
        rx
    }

    fn broadcast(&self, event: TaskEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| sub.tx.try_send(event.clone()).is_ok());
    }

    pub async fn transition(&self, handle: &TaskHandle, task_id: &str, state: TaskState) {
        {
            let mut record = handle.lock().await;
            record.status = state;
        }
        self.broadcast(TaskEvent::State {
            task_id: task_id.to_string(),
            data: StatePayload { status: state },
        });
    }

    pub async fn log(&self, handle: &TaskHandle, task_id: &str, entry: LogEntry) {
        {
            let mut record = handle.lock().await;
            record.logs.push(entry.clone());
        }
        self.broadcast(TaskEvent::Log {
            task_id: task_id.to_string(),
            data: entry,
        });
    }

    pub async fn set_error(&self, handle: &TaskHandle, reason: impl Into<String>) {
        let mut record = handle.lock().await;
        record.error = Some(reason.into());
    }

    pub async fn set_plan(&self, handle: &TaskHandle, plan: crate::schema::Plan) {
        let mut record = handle.lock().await;
        record.plan = plan;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogLevel;

    #[tokio::test]
    async fn subscriber_receives_state_and_log_in_order() {
        let registry = TaskRegistry::new(8);
        let (id, handle, _cancel) = registry.allocate("test goal".to_string());
        let mut rx = registry.subscribe();

        registry.transition(&handle, &id, TaskState::Planning).await;
        registry
            .log(&handle, &id, LogEntry::new("planner", "thinking", LogLevel::Info))
            .await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TaskEvent::State { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, TaskEvent::Log { .. }));
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_without_blocking_broadcast() {
        let registry = TaskRegistry::new(1);
        let (id, handle, _cancel) = registry.allocate("goal".to_string());
        let _rx = registry.subscribe();

        for i in 0..10 {
            registry
                .log(&handle, &id, LogEntry::new("x", format!("msg {i}"), LogLevel::Info))
                .await;
        }

        assert!(registry.subscribers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_task_returns_false() {
        let registry = TaskRegistry::new(8);
        assert!(!registry.cancel("nonexistent"));
    }
}
