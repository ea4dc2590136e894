use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::action::ActionRunner;
use crate::config::Config;
use crate::db::AuditStore;
use crate::memory::SemanticMemory;
use crate::planner::Planner;
use crate::registry::{TaskHandle, TaskRegistry};
use crate::research::Research;
use crate::schema::{LogEntry, LogLevel, Plan, TaskState};
use crate::security::{SecurityScreen, SecurityVerdict};
use crate::verifier::Verifier;

/// The per-task state machine driving a goal from submission to a terminal state.
/// One worker per task, spawned by the submission surface and run to completion
/// independently of other tasks.
pub struct LifecycleEngine {
    pub registry: Arc<TaskRegistry>,
    pub planner: Arc<Planner>,
    pub security: Arc<SecurityScreen>,
    pub action: Arc<ActionRunner>,
    pub verifier: Arc<Verifier>,
    pub research: Arc<Research>,
    pub memory: Arc<SemanticMemory>,
    pub audit: Arc<AuditStore>,
    pub max_replans: u32,
    pub step_verify_timeout: Duration,
}

impl LifecycleEngine {
    pub fn new(
        registry: Arc<TaskRegistry>,
        planner: Arc<Planner>,
        security: Arc<SecurityScreen>,
        action: Arc<ActionRunner>,
        verifier: Arc<Verifier>,
        research: Arc<Research>,
        memory: Arc<SemanticMemory>,
        audit: Arc<AuditStore>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            planner,
            security,
            action,
            verifier,
            research,
            memory,
            audit,
            max_replans: config.max_replans,
            step_verify_timeout: Duration::from_secs(config.step_verify_timeout),
        }
    }

    pub async fn run(self: Arc<Self>, task_id: String, handle: TaskHandle, goal: String, cancel: CancellationToken) {
        if let Err(reason) = self.drive(&task_id, &handle, &goal, &cancel).await {
            self.registry.set_error(&handle, reason.clone()).await;
            self.registry
                .log(&handle, &task_id, LogEntry::new("lifecycle", reason, LogLevel::Error))
                .await;
            self.registry.transition(&handle, &task_id, TaskState::Failed).await;
        }
    }

    async fn drive(
        &self,
        task_id: &str,
        handle: &TaskHandle,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        self.registry.transition(handle, task_id, TaskState::Planning).await;
        let mut plan = self
            .planner
            .plan(goal, cancel)
            .await
            .map_err(|e| format!("planning failed: {e}"))?;

        self.enforce_security(task_id, handle, &plan, cancel).await?;
        self.registry.set_plan(handle, plan.clone()).await;
        self.registry
            .log(
                handle,
                task_id,
                LogEntry::new("planner", format!("generated and secured {} steps", plan.len()), LogLevel::Info),
            )
            .await;

        self.registry.transition(handle, task_id, TaskState::ModelCheck).await;
        self.registry.transition(handle, task_id, TaskState::SandboxSetup).await;

        let mut step_index = 0usize;
        let mut retry_count = 0u32;
        let mut research_fragments: Vec<String> = Vec::new();

        while step_index < plan.len() && retry_count < self.max_replans {
            if cancel.is_cancelled() {
                return Err("CANCELLED".to_string());
            }

            self.registry.transition(handle, task_id, TaskState::Act).await;
            let step = &plan[step_index];
            let action_result = self.action.execute(step, cancel).await;

            let action_outcome = match action_result {
                Ok(outcome) => outcome,
                Err(crate::error::AppError::Cancelled) => return Err("CANCELLED".to_string()),
                Err(e) => {
                    self.registry
                        .log(handle, task_id, LogEntry::new("action", format!("{e}"), LogLevel::Warning))
                        .await;
                    crate::action::ActionOutcome {
                        succeeded: false,
                        detail: e.to_string(),
                        content: None,
                    }
                }
            };

            if let Some(content) = &action_outcome.content {
                research_fragments.push(content.clone());
            }
            self.registry
                .log(
                    handle,
                    task_id,
                    LogEntry::new("action", format!("{}: {}", step.describe(), action_outcome.detail), LogLevel::Info),
                )
                .await;

            self.registry.transition(handle, task_id, TaskState::Verify).await;
            let expectation = format!("the step '{}' completed successfully", step.describe());
            let verify_outcome = if !action_outcome.succeeded {
                crate::verifier::VerifyOutcome {
                    verified: false,
                    details: action_outcome.detail.clone(),
                }
            } else {
                match self.verifier.verify(&expectation, cancel).await {
                    Ok(outcome) => outcome,
                    Err(crate::error::AppError::Cancelled) => return Err("CANCELLED".to_string()),
                    Err(e) => crate::verifier::VerifyOutcome {
                        verified: false,
                        details: e.to_string(),
                    },
                }
            };

            if verify_outcome.verified {
                step_index += 1;
                retry_count = 0;
                continue;
            }

            retry_count += 1;
            self.registry
                .log(
                    handle,
                    task_id,
                    LogEntry::new(
                        "verifier",
                        format!("step {step_index} failed verification ({}): {}", retry_count, verify_outcome.details),
                        LogLevel::Warning,
                    ),
                )
                .await;

            self.registry.transition(handle, task_id, TaskState::Planning).await;
            let vision_context = self
                .verifier
                .describe_screen(cancel)
                .await
                .unwrap_or_else(|_| String::new());

            let replanned = self
                .planner
                .replan(goal, &step.describe(), &verify_outcome.details, &vision_context, cancel)
                .await
                .map_err(|e| format!("re-plan failed: {e}"))?;

            self.enforce_security(task_id, handle, &replanned, cancel).await?;
            plan = replanned;
            self.registry.set_plan(handle, plan.clone()).await;
            step_index = 0;
        }

        if retry_count >= self.max_replans {
            return Err("max re-plans exceeded".to_string());
        }

        if !research_fragments.is_empty() {
            match self.research.synthesize(goal, &research_fragments, cancel).await {
                Ok(summary) => {
                    self.registry
                        .log(handle, task_id, LogEntry::new("research", summary, LogLevel::Info))
                        .await;
                }
                Err(e) => {
                    self.registry
                        .log(handle, task_id, LogEntry::new("research", format!("synthesis failed: {e}"), LogLevel::Warning))
                        .await;
                }
            }
        }

        self.registry.transition(handle, task_id, TaskState::Done).await;

        if let Err(e) = self.memory.add(goal, &plan, cancel).await {
            tracing::warn!(task_id, error = %e, "failed to persist task to semantic memory");
        }
        if let Err(e) = self.audit.record(task_id, goal, "done", None, &plan).await {
            tracing::error!(task_id, error = %e, "failed to write audit record");
        }

        Ok(())
    }

    async fn enforce_security(
        &self,
        task_id: &str,
        handle: &TaskHandle,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        match self.security.screen(plan, cancel).await {
            SecurityVerdict::Safe => Ok(()),
            SecurityVerdict::Blocked(reason) => {
                self.registry
                    .log(handle, task_id, LogEntry::new("security", reason.clone(), LogLevel::Error))
                    .await;
                let _ = self.audit.record(task_id, "", "failed", Some(reason.as_str()), plan).await;
                Err(reason)
            }
        }
    }
}
