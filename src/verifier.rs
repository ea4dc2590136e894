use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AppResult;
use crate::inference_client::InferenceClient;
use crate::screen::ScreenCapability;

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub details: String,
}

/// Vision-mediated post-condition check: captures the screen and asks the vision
/// model whether the expectation holds.
pub struct Verifier {
    inference: Arc<InferenceClient>,
    screen: &'static dyn ScreenCapability,
    model: String,
    timeout: Duration,
}

impl Verifier {
    pub fn new(inference: Arc<InferenceClient>, screen: &'static dyn ScreenCapability, config: &Config) -> Self {
        Self {
            inference,
            screen,
            model: config.vision_model.clone(),
            timeout: Duration::from_secs(config.step_verify_timeout),
        }
    }

    pub async fn verify(&self, expectation: &str, cancel: &CancellationToken) -> AppResult<VerifyOutcome> {
        let image = self.screen.capture_png_base64().await?;
        let prompt = format!(
            "Does the screen satisfy this expectation: \"{expectation}\"? Answer YES or NO, then a short reason."
        );
        let response = self
            .inference
            .vision(&self.model, &prompt, &image, self.timeout, cancel)
            .await?;
        let upper = response.to_uppercase();
        let verified = upper.contains("YES") || upper.contains("TRUE");
        Ok(VerifyOutcome {
            verified,
            details: response,
        })
    }

    pub async fn describe_screen(&self, cancel: &CancellationToken) -> AppResult<String> {
        let image = self.screen.capture_png_base64().await?;
        self.inference
            .vision(&self.model, "Describe what is currently on screen.", &image, self.timeout, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn affirmative_substrings_are_recognized() {
        for text in ["YES, the window is open", "true, it matches", "Yes."] {
            let upper = text.to_uppercase();
            assert!(upper.contains("YES") || upper.contains("TRUE"));
        }
    }

    #[test]
    fn negative_text_is_not_recognized() {
        let upper = "No, nothing changed".to_uppercase();
        assert!(!(upper.contains("YES") || upper.contains("TRUE")));
    }
}
