use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::BROWSER;
use crate::config::Config;
use crate::error::AppResult;
use crate::sandbox::Sandbox;
use crate::schema::Step;
use crate::screen::ScreenCapability;

/// Result of executing one step. `content` carries page text for `Browse` steps,
/// feeding the research synthesis pass.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub detail: String,
    pub content: Option<String>,
}

/// Dispatches a `Step` to the collaborator that owns its side effect: the sandbox
/// for `Command`, the screen capability for input injection, the browser context
/// for navigation.
pub struct ActionRunner {
    sandbox: Sandbox,
    screen: &'static dyn ScreenCapability,
    command_timeout: Duration,
    browse_content_chars: usize,
}

impl ActionRunner {
    pub fn new(screen: &'static dyn ScreenCapability, config: &Config) -> Self {
        Self {
            sandbox: Sandbox::new(),
            screen,
            command_timeout: Duration::from_secs(config.step_verify_timeout),
            browse_content_chars: config.browse_content_chars,
        }
    }

    pub async fn execute(&self, step: &Step, cancel: &CancellationToken) -> AppResult<ActionOutcome> {
        match step {
            Step::Command { value } => {
                let outcome = self.sandbox.run(value, self.command_timeout, cancel).await?;
                Ok(ActionOutcome {
                    succeeded: outcome.succeeded(),
                    detail: if outcome.succeeded() {
                        outcome.stdout
                    } else {
                        outcome.stderr
                    },
                    content: None,
                })
            }
            Step::Type { value } => {
                self.screen.type_text(value).await?;
                Ok(ActionOutcome {
                    succeeded: true,
                    detail: format!("typed `{value}`"),
                    content: None,
                })
            }
            Step::Hotkey { value } => {
                self.screen.hotkey(value).await?;
                Ok(ActionOutcome {
                    succeeded: true,
                    detail: format!("pressed `{value}`"),
                    content: None,
                })
            }
            Step::Click { x, y, value } => {
                let (cx, cy) = resolve_click_coords(*x, *y, value.as_deref());
                self.screen.click(cx, cy).await?;
                Ok(ActionOutcome {
                    succeeded: true,
                    detail: format!("clicked ({cx}, {cy})"),
                    content: None,
                })
            }
            Step::Wait { value } => {
                let seconds: u64 = value.parse().unwrap_or(1);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(crate::error::AppError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                }
                Ok(ActionOutcome {
                    succeeded: true,
                    detail: format!("waited {seconds}s"),
                    content: None,
                })
            }
            Step::Browse { url } => {
                let browser = BROWSER.lock().await;
                let body = browser.navigate(url).await?;
                let truncated: String = body.chars().take(self.browse_content_chars).collect();
                Ok(ActionOutcome {
                    succeeded: true,
                    detail: format!("opened {url}"),
                    content: Some(truncated),
                })
            }
            Step::ClickBrowser { selector } => {
                let browser = BROWSER.lock().await;
                browser.click(selector).await?;
                Ok(ActionOutcome {
                    succeeded: true,
                    detail: format!("clicked `{selector}`"),
                    content: None,
                })
            }
        }
    }
}

fn resolve_click_coords(x: Option<f64>, y: Option<f64>, value: Option<&str>) -> (f64, f64) {
    if let (Some(x), Some(y)) = (x, y) {
        return (x, y);
    }
    if let Some(v) = value {
        let mut parts = v.split_whitespace();
        if let (Some(x), Some(y)) = (parts.next(), parts.next()) {
            if let (Ok(x), Ok(y)) = (x.parse(), y.parse()) {
                return (x, y);
            }
        }
    }
    (0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_coords_from_xy_fields() {
        assert_eq!(resolve_click_coords(Some(5.0), Some(6.0), None), (5.0, 6.0));
    }

    #[test]
    fn resolves_coords_from_value_string() {
        assert_eq!(resolve_click_coords(None, None, Some("10 20")), (10.0, 20.0));
    }

    #[test]
    fn falls_back_to_origin_when_unparseable() {
        assert_eq!(resolve_click_coords(None, None, Some("nonsense")), (0.0, 0.0));
    }
}
