use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{PipeDefinition, PipeInfo, PipeRequest, PipeResponse};
use super::ReasoningService;
use crate::config::{AdvisorConfig, RequestConfig};
use crate::error::{AdvisorError, AdvisorResult};

/// Advisor backed by a hosted pipe API (`/v1/pipes/run`).
#[derive(Clone)]
pub struct PipeAdvisor {
    client: Client,
    base_url: String,
    api_key: String,
    pipe_name: String,
    request_config: RequestConfig,
}

impl PipeAdvisor {
    /// Create a new advisor client
    pub fn new(config: &AdvisorConfig, request_config: RequestConfig) -> AdvisorResult<Self> {
        let client = Client::builder().build().map_err(AdvisorError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            pipe_name: config.pipe.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured pipe name
    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    /// Backoff before attempt `attempt` (1-based retry count).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.request_config.retry_delay_ms.saturating_mul(factor))
    }

    /// Run the pipe. Transient failures are retried up to `max_retries`
    /// times with doubling backoff; anything else ends the attempt loop.
    /// Every failure surfaces as [`AdvisorError::Unavailable`] carrying the
    /// last cause and the number of attempts made.
    pub async fn call_pipe(
        &self,
        request: PipeRequest,
        timeout: Duration,
    ) -> AdvisorResult<PipeResponse> {
        let mut attempts = 0;
        let mut last_error: Option<AdvisorError> = None;

        for attempt in 0..=self.request_config.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(
                    pipe = %request.name,
                    retry = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying advisor request"
                );
                tokio::time::sleep(delay).await;
            }

            attempts += 1;
            let start = Instant::now();
            match self.run_once(&request, timeout).await {
                Ok(response) => {
                    info!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis() as u64,
                        total_tokens = ?response.total_tokens(),
                        "Advisor pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %request.name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retry = attempt,
                        "Advisor pipe call failed"
                    );
                    let transient = e.is_transient();
                    last_error = Some(e);
                    if !transient {
                        break;
                    }
                }
            }
        }

        Err(AdvisorError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
            retries: attempts,
        })
    }

    /// One attempt, bounded by `timeout` end to end.
    async fn run_once(&self, request: &PipeRequest, timeout: Duration) -> AdvisorResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Calling advisor pipe"
        );

        let timeout_ms = timeout.as_millis() as u64;
        let exchange = async {
            let response = self.post("/v1/pipes/run", request, timeout).await?;
            response
                .json::<PipeResponse>()
                .await
                .map_err(|e| AdvisorError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })
        };

        let reply = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| AdvisorError::Timeout { timeout_ms })??;

        if !reply.success {
            return Err(AdvisorError::InvalidResponse {
                message: "Pipe reported an unsuccessful run".to_string(),
            });
        }
        Ok(reply)
    }

    /// Authenticated JSON POST; non-2xx statuses become [`AdvisorError::Api`].
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> AdvisorResult<Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdvisorError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    AdvisorError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdvisorError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Create or update a pipe from its full definition
    pub async fn upsert_pipe(&self, definition: &PipeDefinition) -> AdvisorResult<PipeInfo> {
        info!(pipe = %definition.name, model = %definition.model, "Upserting advisor pipe");

        let response = self
            .post("/v1/pipes", definition, self.request_config.timeout())
            .await?;
        let info: PipeInfo = response
            .json()
            .await
            .map_err(|e| AdvisorError::InvalidResponse {
                message: format!("Failed to parse pipe definition reply: {}", e),
            })?;

        debug!(pipe = %info.name, status = ?info.status, url = ?info.url, "Pipe upserted");
        Ok(info)
    }

    /// Make sure the configured pipe exists. A 409 means another writer
    /// got there first, which is as good as success.
    pub async fn ensure_pipe(&self) -> AdvisorResult<()> {
        match self.upsert_pipe(&PipeDefinition::advisor(&self.pipe_name)).await {
            Ok(_) => {
                info!(pipe = %self.pipe_name, "Advisor pipe ready");
                Ok(())
            }
            Err(AdvisorError::Api { status: 409, .. }) => {
                info!(pipe = %self.pipe_name, "Advisor pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ReasoningService for PipeAdvisor {
    async fn generate(&self, prompt: &str, timeout: Duration) -> AdvisorResult<String> {
        let response = self
            .call_pipe(PipeRequest::round(&self.pipe_name, prompt), timeout)
            .await?;
        Ok(response.completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AdvisorConfig {
        AdvisorConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
            pipe: "forecast-advisor-v1".to_string(),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = PipeAdvisor::new(&test_config(), RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://api.langbase.com");
        assert_eq!(client.pipe_name(), "forecast-advisor-v1");
    }

    #[test]
    fn test_backoff_doubles() {
        let client = PipeAdvisor::new(
            &test_config(),
            RequestConfig {
                timeout_ms: 1000,
                max_retries: 3,
                retry_delay_ms: 100,
            },
        )
        .unwrap();
        assert_eq!(client.backoff(1), Duration::from_millis(100));
        assert_eq!(client.backoff(2), Duration::from_millis(200));
        assert_eq!(client.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_client_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<PipeAdvisor>();
    }
}
