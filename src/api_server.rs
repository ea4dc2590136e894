use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::lifecycle::LifecycleEngine;
use crate::monitor::HostMonitor;
use crate::registry::TaskRegistry;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub engine: Arc<LifecycleEngine>,
    pub monitor: Arc<HostMonitor>,
    pub scheduler: Arc<Scheduler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/task/submit", post(submit_task))
        .route("/task/state/:id", get(task_state))
        .route("/task/cancel/:id", post(cancel_task))
        .route("/task/schedule", post(schedule_task))
        .route("/ws/logs", get(ws_logs))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
struct SubmitRequest {
    goal: String,
}

#[derive(Serialize)]
struct SubmitResponse {
    task_id: String,
    status: &'static str,
}

async fn submit_task(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> impl IntoResponse {
    let task_id = spawn_task(&state, req.goal);
    Json(SubmitResponse {
        task_id,
        status: "accepted",
    })
}

fn spawn_task(state: &AppState, goal: String) -> String {
    let (task_id, handle, cancel) = state.registry.allocate(goal.clone());
    let engine = state.engine.clone();
    let spawned_id = task_id.clone();
    tokio::spawn(async move {
        engine.run(spawned_id, handle, goal, cancel).await;
    });
    task_id
}

async fn task_state(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.registry.get(&id) {
        Some(handle) => {
            let record = handle.lock().await;
            Json(json!(*record)).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "task not found" }))).into_response(),
    }
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if state.registry.cancel(&id) {
        Json(json!({ "status": "acknowledged" })).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "task not found" }))).into_response()
    }
}

#[derive(Deserialize)]
struct ScheduleRequest {
    goal: String,
    cron: String,
}

#[derive(Serialize)]
struct ScheduleResponse {
    status: &'static str,
    job_id: Option<String>,
}

async fn schedule_task(State(state): State<AppState>, Json(req): Json<ScheduleRequest>) -> impl IntoResponse {
    match state.scheduler.schedule(req.goal, &req.cron) {
        Ok(job_id) => Json(ScheduleResponse {
            status: "scheduled",
            job_id: Some(job_id),
        })
        .into_response(),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(ScheduleResponse {
                status: "rejected",
                job_id: None,
            }),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.sample())
}

async fn ws_logs(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.registry.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_response_serializes_accepted() {
        let resp = SubmitResponse {
            task_id: "abc".to_string(),
            status: "accepted",
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("accepted"));
        assert!(json.contains("abc"));
    }
}
