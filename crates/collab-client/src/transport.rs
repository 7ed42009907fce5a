//! Transport trait for talking to the collaboration server.
//!
//! Implementations:
//! - HTTP: long-polling over reqwest against `<server>/docs/<name>`
//! - In-memory servers in the integration tests

use async_trait::async_trait;
use collab_core::{EventsResponse, RequestError, SendAck, SendRequest, Snapshot, Step};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl From<TransportError> for RequestError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Status { status, body } => RequestError::Status {
                status,
                message: body,
            },
            TransportError::Decode(e) => RequestError::Decode(e.to_string()),
            TransportError::Http(e) => RequestError::Network(e.to_string()),
        }
    }
}

/// The three requests the sync client makes.
///
/// Implementations must not retry on their own: every failure is reported so
/// the sync state can decide between polling, backing off and reloading.
#[async_trait]
pub trait Transport<S: Step>: Send + Sync + 'static {
    /// Fetch the current document and version.
    async fn fetch_snapshot(&self) -> std::result::Result<Snapshot<S::Doc>, RequestError>;

    /// Wait for steps after `version`. May return an empty response when the
    /// server's long poll times out.
    async fn poll(
        &self,
        version: u64,
        comment_version: u64,
    ) -> std::result::Result<EventsResponse<S>, RequestError>;

    /// Submit local steps on top of `request.version`.
    async fn send(&self, request: SendRequest<S>) -> std::result::Result<SendAck, RequestError>;
}

/// Long-polling HTTP transport for one document.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpTransport {
    pub fn new(server: &str, doc: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("collab-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: document_url(server, doc),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_snapshot<D: DeserializeOwned>(&self) -> Result<Snapshot<D>> {
        let response = self.client.get(&self.base).send().await?;
        Self::decode(response).await
    }

    async fn get_events<S: DeserializeOwned>(
        &self,
        version: u64,
        comment_version: u64,
    ) -> Result<EventsResponse<S>> {
        let url = events_url(&self.base, Some((version, comment_version)));
        debug!(%url, "polling");
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn post_events<S: Step>(&self, request: &SendRequest<S>) -> Result<SendAck> {
        let url = events_url(&self.base, None);
        let response = self.client.post(&url).json(request).send().await?;
        Self::decode(response).await
    }
}

#[async_trait]
impl<S: Step> Transport<S> for HttpTransport {
    async fn fetch_snapshot(&self) -> std::result::Result<Snapshot<S::Doc>, RequestError> {
        Ok(self.get_snapshot().await?)
    }

    async fn poll(
        &self,
        version: u64,
        comment_version: u64,
    ) -> std::result::Result<EventsResponse<S>, RequestError> {
        Ok(self.get_events(version, comment_version).await?)
    }

    async fn send(&self, request: SendRequest<S>) -> std::result::Result<SendAck, RequestError> {
        Ok(self.post_events(&request).await?)
    }
}

fn document_url(server: &str, doc: &str) -> String {
    format!(
        "{}/docs/{}",
        server.trim_end_matches('/'),
        urlencoding::encode(doc)
    )
}

fn events_url(base: &str, query: Option<(u64, u64)>) -> String {
    match query {
        Some((version, comment_version)) => format!(
            "{}/events?version={}&commentVersion={}",
            base, version, comment_version
        ),
        None => format!("{}/events", base),
    }
}

/// Servers answer errors either as plain text or as `{"error": "..."}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
