use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use once_cell::sync::Lazy;

use crate::error::{AppError, AppResult};

/// Boundary capability for screen capture and input injection.
///
/// The concrete driver (platform screen capture, pointer/keyboard injection) is an
/// external collaborator outside this daemon's scope; this trait is the seam a real
/// driver plugs into, and the default implementation below is a no-op stand-in that
/// keeps the lifecycle engine runnable without one.
#[async_trait]
pub trait ScreenCapability: Send + Sync {
    async fn capture_png_base64(&self) -> AppResult<String>;
    async fn click(&self, x: f64, y: f64) -> AppResult<()>;
    async fn type_text(&self, text: &str) -> AppResult<()>;
    async fn hotkey(&self, combo: &str) -> AppResult<()>;
}

/// Stand-in driver: captures a 1x1 transparent PNG and logs input it would inject.
/// Swap for a real platform driver without touching the lifecycle engine.
pub struct NullScreenDriver {
    last_click: Mutex<Option<(f64, f64)>>,
}

const BLANK_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNk+A8AAQUBAScY42YAAAAASUVORK5CYII=";

impl NullScreenDriver {
    pub fn new() -> Self {
        Self {
            last_click: Mutex::new(None),
        }
    }
}

impl Default for NullScreenDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScreenCapability for NullScreenDriver {
    async fn capture_png_base64(&self) -> AppResult<String> {
        Ok(BLANK_PNG_B64.to_string())
    }

    async fn click(&self, x: f64, y: f64) -> AppResult<()> {
        *self.last_click.lock().map_err(|_| AppError::Action("screen driver mutex poisoned".into()))? = Some((x, y));
        tracing::debug!(x, y, "click injected");
        Ok(())
    }

    async fn type_text(&self, text: &str) -> AppResult<()> {
        tracing::debug!(chars = text.len(), "text typed");
        Ok(())
    }

    async fn hotkey(&self, combo: &str) -> AppResult<()> {
        tracing::debug!(combo, "hotkey pressed");
        Ok(())
    }
}

pub static SCREEN: Lazy<Box<dyn ScreenCapability>> = Lazy::new(|| Box::new(NullScreenDriver::new()));

pub fn decode_png_len(b64: &str) -> usize {
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map(|v| v.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_driver_captures_and_records_clicks() {
        let driver = NullScreenDriver::new();
        let png = driver.capture_png_base64().await.unwrap();
        assert!(decode_png_len(&png) > 0);
        driver.click(10.0, 20.0).await.unwrap();
        assert_eq!(*driver.last_click.lock().unwrap(), Some((10.0, 20.0)));
    }
}
