use std::time::Duration;

use once_cell::sync::Lazy;
use regex::RegexSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::inference_client::InferenceClient;
use crate::schema::{Plan, Step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityVerdict {
    Safe,
    Blocked(String),
}

/// Stage-1 regex denylist, evaluated case-insensitively against every step value
/// and against the plan as a whole.
static DENYLIST: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)rm\s+-rf",
        r"(?i)del\s+/s",
        r"(?i)rd\s+/s",
        r"(?i)\bformat\b",
        r"(?i)\bmkfs",
        r"(?i)\bsudo\s",
        r"(?i)dd\s+if=",
        r":\(\)\{\s*:\|:&\s*\};:",
    ])
    .expect("denylist patterns are valid regexes")
});

fn step_text(step: &Step) -> String {
    match step {
        Step::Command { value } => value.clone(),
        Step::Type { value } => value.clone(),
        Step::Hotkey { value } => value.clone(),
        Step::Click { value, .. } => value.clone().unwrap_or_default(),
        Step::Wait { value } => value.clone(),
        Step::Browse { url } => url.clone(),
        Step::ClickBrowser { selector } => selector.clone(),
    }
}

fn denylist_match(plan: &Plan) -> Option<String> {
    for step in plan {
        let text = step_text(step);
        if DENYLIST.is_match(&text) {
            return Some(format!("denylisted pattern in step: {}", step.describe()));
        }
    }
    None
}

/// Two-stage security screen: a regex denylist that always runs, followed by an
/// optional LLM classification pass for plans containing a `Command` step. Stage 2
/// fails open to the stage-1 verdict (Safe) on timeout or error.
pub struct SecurityScreen {
    inference: InferenceClient,
    model: String,
    timeout: Duration,
    llm_enabled: bool,
}

impl SecurityScreen {
    pub fn new(inference: InferenceClient, config: &Config) -> Self {
        Self {
            inference,
            model: config.planner_model.clone(),
            timeout: Duration::from_secs(config.step_verify_timeout),
            llm_enabled: config.security_llm_enabled,
        }
    }

    pub async fn screen(&self, plan: &Plan, cancel: &CancellationToken) -> SecurityVerdict {
        if let Some(reason) = denylist_match(plan) {
            return SecurityVerdict::Blocked(reason);
        }

        let has_command = plan.iter().any(|s| matches!(s, Step::Command { .. }));
        if !has_command || !self.llm_enabled {
            return SecurityVerdict::Safe;
        }

        let commands: Vec<String> = plan
            .iter()
            .filter_map(|s| match s {
                Step::Command { value } => Some(value.clone()),
                _ => None,
            })
            .collect();
        let prompt = format!(
            "Classify whether executing these shell commands is safe or malicious. \
             Respond with exactly one word, SAFE or MALICIOUS.\n\nCommands:\n{}",
            commands.join("\n")
        );

        match self
            .inference
            .complete(&self.model, &prompt, false, self.timeout, cancel)
            .await
        {
            Ok(text) if text.to_uppercase().contains("MALICIOUS") => {
                SecurityVerdict::Blocked("LLM classifier flagged plan as malicious".to_string())
            }
            _ => SecurityVerdict::Safe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_of(values: &[&str]) -> Plan {
        values
            .iter()
            .map(|v| Step::Command { value: v.to_string() })
            .collect()
    }

    #[test]
    fn denylist_blocks_recursive_delete() {
        let plan = plan_of(&["rm -rf /var"]);
        assert!(denylist_match(&plan).is_some());
    }

    #[test]
    fn denylist_blocks_sudo() {
        let plan = plan_of(&["sudo apt install x"]);
        assert!(denylist_match(&plan).is_some());
    }

    #[test]
    fn denylist_allows_plain_commands() {
        let plan = plan_of(&["ls -la", "echo hello"]);
        assert!(denylist_match(&plan).is_none());
    }

    #[test]
    fn denylist_blocks_fork_bomb() {
        let plan = plan_of(&[":(){ :|:& };:"]);
        assert!(denylist_match(&plan).is_some());
    }
}
