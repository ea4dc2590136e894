use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Client for the locally hosted inference server (Ollama-shaped API surface:
/// `/api/generate`, `/api/embeddings`, `/api/tags`).
///
/// Every call carries a timeout and races against a per-task cancellation
/// token so an in-flight request never outlives a cancelled task.
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    endpoint: String,
}

impl InferenceClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client build");
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn post_with_retry(&self, path: &str, body: &Value) -> AppResult<Value> {
        let max_retries = 3;
        let mut attempt = 0;
        let mut backoff = Duration::from_secs(1);
        let url = format!("{}{}", self.endpoint, path);

        loop {
            attempt += 1;
            match self.client.post(&url).json(body).send().await {
                Ok(resp) => {
                    let retryable = resp.status().is_server_error()
                        || resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    if retryable && attempt <= max_retries {
                        tracing::warn!(%url, attempt, "inference endpoint returned retryable status");
                    } else if !resp.status().is_success() {
                        let text = resp.text().await.unwrap_or_default();
                        return Err(AppError::Inference(format!(
                            "{url} returned non-success status: {text}"
                        )));
                    } else {
                        return resp.json::<Value>().await.map_err(|e| {
                            AppError::Inference(format!("failed to decode response from {url}: {e}"))
                        });
                    }
                }
                Err(e) => {
                    if attempt > max_retries {
                        return Err(AppError::Inference(format!(
                            "max retries exceeded calling {url}: {e}"
                        )));
                    }
                    tracing::warn!(%url, attempt, error = %e, "network error calling inference endpoint, retrying");
                }
            }
            sleep(backoff).await;
            backoff *= 2;
        }
    }

    async fn call_with_cancel<F, T>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        fut: F,
    ) -> AppResult<T>
    where
        F: std::future::Future<Output = AppResult<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = tokio::time::timeout(timeout, fut) => {
                result.map_err(|_| AppError::Timeout("inference call".to_string()))?
            }
        }
    }

    pub async fn complete(
        &self,
        model: &str,
        prompt: &str,
        json_mode: bool,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });
        if json_mode {
            body["format"] = json!("json");
        }
        self.call_with_cancel(timeout, cancel, async {
            let value = self.post_with_retry("/api/generate", &body).await?;
            value
                .get("response")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AppError::Inference("response missing `response` field".to_string()))
        })
        .await
    }

    pub async fn vision(
        &self,
        model: &str,
        prompt: &str,
        image_b64: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AppResult<String> {
        let body = json!({
            "model": model,
            "prompt": prompt,
            "images": [image_b64],
            "stream": false,
        });
        self.call_with_cancel(timeout, cancel, async {
            let value = self.post_with_retry("/api/generate", &body).await?;
            value
                .get("response")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AppError::Vision("response missing `response` field".to_string()))
        })
        .await
    }

    pub async fn embed(
        &self,
        model: &str,
        text: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<f32>> {
        let body = json!({ "model": model, "prompt": text });
        self.call_with_cancel(timeout, cancel, async {
            let value = self.post_with_retry("/api/embeddings", &body).await?;
            let arr = value
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| AppError::Inference("response missing `embedding` field".to_string()))?;
            Ok(arr.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
        })
        .await
    }

    pub async fn list_tags(&self) -> AppResult<Vec<String>> {
        let url = format!("{}/api/tags", self.endpoint);
        let value: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Inference(format!("failed to reach {url}: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Inference(format!("failed to decode tags response: {e}")))?;

        let models = value
            .get("models")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_endpoint() {
        let client = InferenceClient::new("http://localhost:11434");
        assert_eq!(client.endpoint, "http://localhost:11434");
    }
}
