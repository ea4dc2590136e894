use std::sync::Mutex;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::error::AppResult;

/// Boundary capability for browser navigation. The concrete driver (a real browser
/// automation backend) is an external collaborator; this is the seam it plugs into.
/// Access is serialized behind a single shared context so two tasks cannot interleave
/// navigations in the same browser.
#[async_trait]
pub trait BrowserCapability: Send + Sync {
    async fn navigate(&self, url: &str) -> AppResult<String>;
    async fn click(&self, selector: &str) -> AppResult<()>;
}

pub struct NullBrowserDriver {
    last_url: Mutex<Option<String>>,
}

impl NullBrowserDriver {
    pub fn new() -> Self {
        Self {
            last_url: Mutex::new(None),
        }
    }
}

impl Default for NullBrowserDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserCapability for NullBrowserDriver {
    async fn navigate(&self, url: &str) -> AppResult<String> {
        *self.last_url.lock().expect("browser driver mutex poisoned") = Some(url.to_string());
        tracing::debug!(url, "navigated");
        Ok(format!("(stand-in browser driver) page body for {url}"))
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        tracing::debug!(selector, "browser click");
        Ok(())
    }
}

/// Shared browser context, singleton for the daemon's lifetime, accessed behind a
/// tokio mutex so navigations across concurrent tasks never interleave.
pub static BROWSER: Lazy<tokio::sync::Mutex<Box<dyn BrowserCapability>>> =
    Lazy::new(|| tokio::sync::Mutex::new(Box::new(NullBrowserDriver::new())));

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_driver_records_last_url() {
        let driver = NullBrowserDriver::new();
        let body = driver.navigate("http://example.com").await.unwrap();
        assert!(body.contains("example.com"));
        assert_eq!(
            *driver.last_url.lock().unwrap(),
            Some("http://example.com".to_string())
        );
    }
}
