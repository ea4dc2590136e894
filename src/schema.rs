use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Lifecycle states. `Observe` is part of the external vocabulary but is never
/// entered by the current control loop (reserved for a future pre-action gate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Planning,
    ModelCheck,
    SandboxSetup,
    Observe,
    Act,
    Verify,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// One atomic step. Each variant carries only the fields its action needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Command { value: String },
    Type { value: String },
    Hotkey { value: String },
    Click {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default)]
        value: Option<String>,
    },
    Wait { value: String },
    Browse {
        #[serde(alias = "value")]
        url: String,
    },
    ClickBrowser { selector: String },
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Step::Command { value } => format!("run command `{value}`"),
            Step::Type { value } => format!("type `{value}`"),
            Step::Hotkey { value } => format!("press hotkey `{value}`"),
            Step::Click { x, y, value } => match (x, y) {
                (Some(x), Some(y)) => format!("click at ({x}, {y})"),
                _ => format!("click `{}`", value.clone().unwrap_or_default()),
            },
            Step::Wait { value } => format!("wait {value}s"),
            Step::Browse { url } => format!("browse to {url}"),
            Step::ClickBrowser { selector } => format!("click browser element `{selector}`"),
        }
    }
}

pub type Plan = Vec<Step>;

/// Unwraps the planner's loosely-typed JSON response into a `Plan`.
///
/// Tolerates three shapes: `{"plan": [...]}`, a bare sequence, or a single
/// step mapping (wrapped as a one-element sequence).
pub fn parse_plan(raw: &Value) -> AppResult<Plan> {
    let steps_value = match raw {
        Value::Object(map) if map.contains_key("plan") => map.get("plan").unwrap().clone(),
        other => other.clone(),
    };

    let entries: Vec<Value> = match steps_value {
        Value::Array(items) => items,
        single @ Value::Object(_) => vec![single],
        other => {
            return Err(AppError::Inference(format!(
                "planner response was neither a plan array nor a step object: {other}"
            )))
        }
    };

    entries
        .into_iter()
        .map(|entry| serde_json::from_value(entry).map_err(AppError::from))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: String,
    pub agent: String,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(agent: &str, message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            agent: agent.to_string(),
            message: message.into(),
            level,
        }
    }
}

/// A task as held by the registry. Mutated only by the worker bound to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub goal: String,
    pub status: TaskState,
    pub plan: Plan,
    pub logs: Vec<LogEntry>,
    pub created_at: String,
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(id: String, goal: String) -> Self {
        Self {
            id,
            goal,
            status: TaskState::Idle,
            plan: Vec::new(),
            logs: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
            error: None,
        }
    }
}

/// An event broadcast to subscribers of a task's stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskEvent {
    State { task_id: String, data: StatePayload },
    Log { task_id: String, data: LogEntry },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePayload {
    pub status: TaskState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_plan_wrapper() {
        let raw = serde_json::json!({"plan": [{"action": "WAIT", "value": "1"}]});
        let plan = parse_plan(&raw).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn unwraps_bare_array() {
        let raw = serde_json::json!([{"action": "WAIT", "value": "1"}]);
        let plan = parse_plan(&raw).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn unwraps_single_step_object() {
        let raw = serde_json::json!({"action": "WAIT", "value": "1"});
        let plan = parse_plan(&raw).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(matches!(plan[0], Step::Wait { .. }));
    }

    #[test]
    fn rejects_malformed_step() {
        let raw = serde_json::json!([{"action": "COMMAND"}]);
        assert!(parse_plan(&raw).is_err());
    }
}
