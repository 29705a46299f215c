//! Uniform client over both generation providers.

use std::time::Duration;

use async_trait::async_trait;
use genflow_core::{GenerationItem, ProviderKind, RetryPolicy, with_retry};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::adapter::{ProviderAdapter, envelope_data, parse_created_task_id};
use crate::error::ProviderError;
use crate::flux::FluxKontextAdapter;
use crate::gpt4o::Gpt4oAdapter;
use crate::status::{ProviderJob, ProviderStatus};

/// Provider contract the orchestration layer depends on.
#[async_trait]
pub trait GenerationApi: Send + Sync + 'static {
    /// Create a provider job for `item` using the item's provider.
    ///
    /// Transient failures are retried in-process; fatal ones propagate immediately.
    async fn create_job(&self, item: &GenerationItem) -> Result<ProviderJob, ProviderError>;

    /// Query a job once. Retrying status queries is the poller's business.
    async fn query_status(
        &self,
        provider_task_id: &str,
        provider: ProviderKind,
    ) -> Result<ProviderStatus, ProviderError>;
}

/// Generation client configuration.
#[derive(Debug, Clone)]
pub struct GenerationClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Retry policy for create-job calls.
    pub retry: RetryPolicy,
}

impl Default for GenerationClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kie.ai".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::linear(2, Duration::from_secs(2), Duration::from_secs(5)),
        }
    }
}

impl GenerationClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// HTTP client for both providers.
pub struct GenerationClient {
    http: reqwest::Client,
    config: GenerationClientConfig,
    gpt4o: Gpt4oAdapter,
    flux: FluxKontextAdapter,
}

impl GenerationClient {
    pub fn new(config: GenerationClientConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("genflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            gpt4o: Gpt4oAdapter,
            flux: FluxKontextAdapter::default(),
        })
    }

    pub fn config(&self) -> &GenerationClientConfig {
        &self.config
    }

    fn adapter(&self, provider: ProviderKind) -> &dyn ProviderAdapter {
        match provider {
            ProviderKind::Gpt4o => &self.gpt4o,
            ProviderKind::FluxKontext => &self.flux,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl GenerationApi for GenerationClient {
    async fn create_job(&self, item: &GenerationItem) -> Result<ProviderJob, ProviderError> {
        let adapter = self.adapter(item.provider);
        let url = self.url(adapter.create_path());
        let body = adapter.create_body(item);

        let url = url.as_str();
        let body = &body;
        let provider_task_id = with_retry(&self.config.retry, "provider.create_job", move |attempt| async move {
            debug!(provider = %item.provider, item_id = %item.id, attempt, "creating provider job");
            let response = self
                .http
                .post(url)
                .bearer_auth(&self.config.api_key)
                .json(body)
                .send()
                .await?;
            let json = read_json(response).await?;
            parse_created_task_id(&json)
        })
        .await?;

        info!(
            provider = %item.provider,
            item_id = %item.id,
            provider_task_id = %provider_task_id,
            "provider job created"
        );
        Ok(ProviderJob::new(provider_task_id, item.provider))
    }

    async fn query_status(
        &self,
        provider_task_id: &str,
        provider: ProviderKind,
    ) -> Result<ProviderStatus, ProviderError> {
        let adapter = self.adapter(provider);
        let response = self
            .http
            .get(self.url(adapter.status_path()))
            .query(&[("taskId", provider_task_id)])
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let json = read_json(response).await?;
        let data = envelope_data(&json)?;
        adapter.parse_status(data)
    }
}

/// Read a provider response as JSON, mapping bare HTTP failures when the
/// body is not a provider envelope.
async fn read_json(response: reqwest::Response) -> Result<JsonValue, ProviderError> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str::<JsonValue>(&text) {
        Ok(body) if status.is_success() || body.get("code").is_some() => Ok(body),
        Ok(body) => {
            let message = body
                .get("msg")
                .or_else(|| body.get("message"))
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| preview(&text));
            Err(ProviderError::from_code(status.as_u16(), message))
        }
        Err(_) if status.is_success() => Err(ProviderError::MalformedResponse(format!(
            "non-JSON body: {}",
            preview(&text)
        ))),
        Err(_) => Err(ProviderError::from_code(status.as_u16(), preview(&text))),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
