use std::env;

/// Daemon configuration, loaded from the environment (optionally via a `.env` file).
///
/// Every field has a documented default so the daemon starts with no configuration present.
#[derive(Debug, Clone)]
pub struct Config {
    pub inference_endpoint: String,
    pub planner_model: String,
    pub vision_model: String,
    pub embedding_model: String,
    pub max_replans: u32,
    pub step_verify_timeout: u64,
    pub plan_call_timeout: u64,
    pub verify_threshold: f32,
    pub subscriber_backlog: usize,
    pub browse_content_chars: usize,
    pub bind_addr: String,
    pub memory_path: String,
    pub audit_db_path: String,
    pub security_llm_enabled: bool,
}

impl Config {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            inference_endpoint: env_or("STEER_INFERENCE_ENDPOINT", "http://localhost:11434"),
            planner_model: env_or("STEER_PLANNER_MODEL", "llama3"),
            vision_model: env_or("STEER_VISION_MODEL", "llava"),
            embedding_model: env_or("STEER_EMBEDDING_MODEL", "nomic-embed-text"),
            max_replans: env_parsed("STEER_MAX_REPLANS", 10),
            step_verify_timeout: env_parsed("STEER_STEP_VERIFY_TIMEOUT", 30),
            plan_call_timeout: env_parsed("STEER_PLAN_CALL_TIMEOUT", 60),
            verify_threshold: env_parsed("STEER_VERIFY_THRESHOLD", 0.7),
            subscriber_backlog: env_parsed("STEER_SUBSCRIBER_BACKLOG", 64),
            browse_content_chars: env_parsed("STEER_BROWSE_CONTENT_CHARS", 5000),
            bind_addr: env_or("STEER_BIND_ADDR", "0.0.0.0:8000"),
            memory_path: env_or("STEER_MEMORY_PATH", "vector_memory.json"),
            audit_db_path: env_or("STEER_AUDIT_DB_PATH", "steer.db"),
            security_llm_enabled: env_parsed("STEER_SECURITY_LLM_ENABLED", true),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_env_unset() {
        env::remove_var("STEER_MAX_REPLANS");
        let cfg = Config::load();
        assert_eq!(cfg.max_replans, 10);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn env_override_is_parsed() {
        env::set_var("STEER_MAX_REPLANS", "3");
        let cfg = Config::load();
        assert_eq!(cfg.max_replans, 3);
        env::remove_var("STEER_MAX_REPLANS");
    }
}
