use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AppResult;
use crate::inference_client::InferenceClient;

/// Synthesizes a summary of `Browse` fragments collected during a task, relative
/// to the original goal. Invoked once per task, only when fragments exist.
pub struct Research {
    inference: Arc<InferenceClient>,
    model: String,
    timeout: Duration,
}

impl Research {
    pub fn new(inference: Arc<InferenceClient>, config: &Config) -> Self {
        Self {
            inference,
            model: config.planner_model.clone(),
            timeout: Duration::from_secs(config.plan_call_timeout),
        }
    }

    pub async fn synthesize(
        &self,
        goal: &str,
        fragments: &[String],
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        let joined = fragments
            .iter()
            .enumerate()
            .map(|(i, f)| format!("--- page {} ---\n{}", i + 1, f))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Summarize the following page fragments with respect to the goal \"{goal}\". \
             Respond with a JSON object {{\"summary\": \"...\"}}.\n\n{joined}"
        );
        let response = self
            .inference
            .complete(&self.model, &prompt, true, self.timeout, cancel)
            .await?;
        let value: serde_json::Value = serde_json::from_str(&response)?;
        Ok(value
            .get("summary")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&response)
            .to_string())
    }
}
