//! Google Cloud Pub/Sub transport over the REST API.
//!
//! Publishes go to `POST /v1/projects/{project}/topics/{topic}:publish`, one
//! message per call, and resolve with the message id the broker assigns on
//! acknowledgment. Credentials come from `gcp_auth` (metadata server, workload
//! identity or `GOOGLE_APPLICATION_CREDENTIALS`). When pointed at the Pub/Sub
//! emulator no credentials are sent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gcp_auth::TokenProvider;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{MessageId, MessageQueue, PublishError};

/// Production Pub/Sub endpoint
pub const PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";
/// OAuth2 scope needed to publish and manage topics
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";
/// Upper bound for a single HTTP exchange with the API
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Where and what to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    /// Project that owns the topic
    pub project_id: String,
    /// Topic short name
    pub topic: String,
    /// API base URL
    pub endpoint: String,
    /// Whether `endpoint` is an emulator (no authentication)
    pub emulator: bool,
}

impl PubSubConfig {
    pub fn new(project_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            topic: topic.into(),
            endpoint: PUBSUB_ENDPOINT.to_string(),
            emulator: false,
        }
    }

    /// Target a local emulator at `host` (`host:port`, as in
    /// `PUBSUB_EMULATOR_HOST`).
    #[must_use]
    pub fn with_emulator(mut self, host: &str) -> Self {
        self.endpoint = format!("http://{}", host.trim_end_matches('/'));
        self.emulator = true;
        self
    }

    /// Fully qualified topic name.
    pub fn topic_path(&self) -> String {
        format!("projects/{}/topics/{}", self.project_id, self.topic)
    }

    fn topic_url(&self) -> String {
        format!("{}/v1/{}", self.endpoint, self.topic_path())
    }

    fn publish_url(&self) -> String {
        format!("{}:publish", self.topic_url())
    }
}

/// Publish request body.
#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PubsubMessage>,
}

/// A single message; `data` is base64 encoded.
#[derive(Debug, Serialize)]
struct PubsubMessage {
    data: String,
}

impl PublishRequest {
    fn single(payload: &[u8]) -> Self {
        Self {
            messages: vec![PubsubMessage {
                data: STANDARD.encode(payload),
            }],
        }
    }
}

/// Publish success response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    status: String,
}

/// Turn an error body into a readable message, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) if parsed.error.status.is_empty() => parsed.error.message,
        Ok(parsed) => format!("{}: {}", parsed.error.status, parsed.error.message),
        Err(_) => body.trim().to_string(),
    }
}

/// Pub/Sub topic client, created once at startup and shared by all requests.
pub struct PubSubQueue {
    config: PubSubConfig,
    token_provider: Option<Arc<dyn TokenProvider>>,
    client: reqwest::Client,
}

// Manual Debug implementation since TokenProvider doesn't implement Debug
impl std::fmt::Debug for PubSubQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubQueue")
            .field("config", &self.config)
            .field("token_provider", &self.token_provider.as_ref().map(|_| "<TokenProvider>"))
            .finish()
    }
}

impl PubSubQueue {
    /// Create a client for `config`.
    ///
    /// `token_provider` is required unless `config.emulator` is set.
    pub fn new(
        config: PubSubConfig,
        token_provider: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self, PublishError> {
        if !config.emulator && token_provider.is_none() {
            return Err(PublishError::Auth(
                "a token provider is required outside the emulator".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            token_provider,
            client,
        })
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    /// Attach a bearer token unless talking to the emulator.
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, PublishError> {
        if self.config.emulator {
            return Ok(request);
        }
        let provider = self.token_provider.as_ref().ok_or_else(|| {
            PublishError::Auth("no token provider configured".to_string())
        })?;
        let token = provider
            .token(&[PUBSUB_SCOPE])
            .await
            .map_err(|e| PublishError::Auth(format!("Failed to get GCP access token: {e}")))?;
        Ok(request.bearer_auth(token.as_str()))
    }

    async fn rejection(response: reqwest::Response) -> PublishError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        PublishError::Rejected {
            status,
            message: error_message(&body),
        }
    }

    /// Make sure the topic exists, creating it when the API reports it missing.
    pub async fn ensure_topic(&self) -> Result<(), PublishError> {
        let topic = self.config.topic_path();
        let response = self
            .authorize(self.client.get(self.config.topic_url()))
            .await?
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!(topic = %topic, "Topic exists");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                info!(topic = %topic, "Topic not found, creating");
                let response = self
                    .authorize(self.client.put(self.config.topic_url()))
                    .await?
                    .json(&serde_json::json!({}))
                    .send()
                    .await?;
                if response.status().is_success() {
                    info!(topic = %topic, "Topic created");
                    Ok(())
                } else {
                    Err(Self::rejection(response).await)
                }
            }
            _ => Err(Self::rejection(response).await),
        }
    }
}

#[async_trait]
impl MessageQueue for PubSubQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<MessageId, PublishError> {
        let response = self
            .authorize(self.client.post(self.config.publish_url()))
            .await?
            .json(&PublishRequest::single(&payload))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let status = response.status().as_u16();
        let body: PublishResponse = response.json().await?;
        body.message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::Rejected {
                status,
                message: "publish response carried no message id".to_string(),
            })
    }
}
