use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[cfg(test)]
use mockall::automock;

use crate::config::RetryConfig;
use crate::error::{EarthGuardError, Result};
use crate::models::{GenerateContentRequest, GenerateContentResponse};

/// Seam between the core and the generative-language backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn generate(&self, req: &GenerateContentRequest) -> Result<GenerateContentResponse>;
}

pub struct GeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl GeminiTransport {
    pub fn new(
        api_key: String,
        base_url: String,
        request_timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    async fn attempt(&self, req: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let response = self
            .client
            .post(self.endpoint(&req.model))
            .header("x-goog-api-key", &self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EarthGuardError::Backend { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Client errors will fail the same way again; everything else may be transient.
fn is_retryable(err: &EarthGuardError) -> bool {
    match err {
        EarthGuardError::Http(e) => match e.status() {
            Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            None => true,
        },
        EarthGuardError::Backend { status, .. } => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        }
        _ => false,
    }
}

/// Exponential backoff for the given (1-based) attempt, before jitter, capped.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = retry.backoff_base.powi(attempt.saturating_sub(1) as i32);
    let millis = (retry.initial_delay_ms as f64 * exp).min(retry.max_delay_ms as f64);
    Duration::from_millis(millis as u64)
}

/// Runs `attempt` until it succeeds, fails permanently, or attempts run out.
async fn with_retry<T, F, Fut>(retry: &RetryConfig, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempts >= max_attempts || !is_retryable(&err) {
            return Err(err);
        }

        let base_delay = backoff_delay(retry, attempts);
        let spread = retry.jitter_factor.clamp(0.0, 1.0);
        let jitter = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        let delay = Duration::from_millis((base_delay.as_millis() as f64 * jitter) as u64);

        tracing::warn!(
            "Gemini request attempt {}/{} failed: {} - retrying in {:?}",
            attempts,
            max_attempts,
            err,
            delay
        );
        sleep(delay).await;
    }
}

#[async_trait]
impl Transport for GeminiTransport {
    async fn generate(&self, req: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        tracing::debug!(model = %req.model, "Sending generateContent request");
        with_retry(&self.retry, || self.attempt(req)).await
    }
}
