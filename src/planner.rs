use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AppResult;
use crate::inference_client::InferenceClient;
use crate::memory::SemanticMemory;
use crate::schema::{parse_plan, Plan};

const ACTION_CATALOG: &str = r#"
Available actions, one step per JSON object:
- {"action": "COMMAND", "value": "<shell command>"}
- {"action": "TYPE", "value": "<text to type>"}
- {"action": "HOTKEY", "value": "<keys joined with +>"}
- {"action": "CLICK", "x": <number>, "y": <number>}
- {"action": "WAIT", "value": "<seconds>"}
- {"action": "BROWSE", "url": "<url>"}
- {"action": "CLICK_BROWSER", "selector": "<css selector>"}

Respond with a JSON object of the shape {"plan": [<step>, ...]}. Output only JSON.
"#;

/// Produces plans from a goal, consulting Semantic Memory for few-shot context
/// and re-planning with failure context when a step fails verification.
pub struct Planner {
    inference: Arc<InferenceClient>,
    memory: Arc<SemanticMemory>,
    model: String,
    timeout: Duration,
}

impl Planner {
    pub fn new(inference: Arc<InferenceClient>, memory: Arc<SemanticMemory>, config: &Config) -> Self {
        Self {
            inference,
            memory,
            model: config.planner_model.clone(),
            timeout: Duration::from_secs(config.plan_call_timeout),
        }
    }

    pub async fn plan(&self, goal: &str, cancel: &CancellationToken) -> AppResult<Plan> {
        let similar = self.memory.retrieve(goal, 3, cancel).await.unwrap_or_default();
        let few_shot = if similar.is_empty() {
            String::new()
        } else {
            let examples: Vec<String> = similar
                .iter()
                .map(|e| {
                    format!(
                        "Goal: {}\nPlan: {}",
                        e.goal,
                        serde_json::to_string(&e.plan).unwrap_or_default()
                    )
                })
                .collect();
            format!("\nSimilar past goals and the plans that worked:\n{}\n", examples.join("\n\n"))
        };

        let prompt = format!(
            "You are a task automation planner.\n{ACTION_CATALOG}{few_shot}\nGOAL: {goal}\n"
        );

        let response = self
            .inference
            .complete(&self.model, &prompt, true, self.timeout, cancel)
            .await?;
        let value: Value = serde_json::from_str(&response)?;
        parse_plan(&value)
    }

    pub async fn replan(
        &self,
        goal: &str,
        failed_step_description: &str,
        failure_detail: &str,
        vision_context: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Plan> {
        let prompt = format!(
            "You are a task automation planner recovering from a failed step.\n{ACTION_CATALOG}\n\
             GOAL: {goal}\n\
             FAILED STEP: {failed_step_description}\n\
             FAILURE DETAIL: {failure_detail}\n\
             CURRENT SCREEN: {vision_context}\n\
             Produce a fresh plan that takes a structurally different approach.\n"
        );

        let response = self
            .inference
            .complete(&self.model, &prompt, true, self.timeout, cancel)
            .await?;
        let value: Value = serde_json::from_str(&response)?;
        parse_plan(&value)
    }
}
