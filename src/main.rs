mod action;
mod api_server;
mod browser;
mod config;
mod db;
mod error;
mod inference_client;
mod lifecycle;
mod memory;
mod monitor;
mod planner;
mod registry;
mod research;
mod scheduler;
mod schema;
mod screen;
mod security;
mod sandbox;
mod verifier;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::action::ActionRunner;
use crate::config::Config;
use crate::db::AuditStore;
use crate::inference_client::InferenceClient;
use crate::lifecycle::LifecycleEngine;
use crate::memory::SemanticMemory;
use crate::monitor::HostMonitor;
use crate::planner::Planner;
use crate::registry::TaskRegistry;
use crate::research::Research;
use crate::scheduler::Scheduler;
use crate::security::SecurityScreen;
use crate::verifier::Verifier;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    tracing::info!(bind_addr = %config.bind_addr, "starting task execution daemon");

    let inference = Arc::new(InferenceClient::new(config.inference_endpoint.clone()));
    let registry = Arc::new(TaskRegistry::new(config.subscriber_backlog));
    let memory = Arc::new(SemanticMemory::load(
        &config.memory_path,
        inference.clone(),
        config.embedding_model.clone(),
        Duration::from_secs(config.step_verify_timeout),
        config.verify_threshold,
    ));
    let audit = Arc::new(
        AuditStore::open(&config.audit_db_path).expect("failed to open audit store"),
    );
    let planner = Arc::new(Planner::new(inference.clone(), memory.clone(), &config));
    let security = Arc::new(SecurityScreen::new((*inference).clone(), &config));
    let screen: &'static dyn crate::screen::ScreenCapability = &**crate::screen::SCREEN;
    let action = Arc::new(ActionRunner::new(screen, &config));
    let verifier = Arc::new(Verifier::new(inference.clone(), screen, &config));
    let research = Arc::new(Research::new(inference.clone(), &config));

    let engine = Arc::new(LifecycleEngine::new(
        registry.clone(),
        planner,
        security,
        action,
        verifier,
        research,
        memory,
        audit,
        &config,
    ));

    let scheduler = Scheduler::new(registry.clone());
    let submit_registry = registry.clone();
    let submit_engine = engine.clone();
    scheduler.clone().start(Arc::new(move |goal: String| {
        let (task_id, handle, cancel) = submit_registry.allocate(goal.clone());
        let engine = submit_engine.clone();
        tokio::spawn(async move {
            engine.run(task_id, handle, goal, cancel).await;
        });
    }));

    let host_monitor = Arc::new(HostMonitor::new(registry.clone()));

    let state = api_server::AppState {
        registry,
        engine,
        monitor: host_monitor,
        scheduler,
    };

    let app = api_server::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind HTTP listener");
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await.expect("server error");
}
