//! Wire shapes of the collaboration server's HTTP API.
//!
//! - `GET <base>` returns a [`Snapshot`].
//! - `GET <base>/events?version=<v>&commentVersion=<cv>` long-polls for an
//!   [`EventsResponse`].
//! - `POST <base>/events` with a [`SendRequest`] body answers with a
//!   [`SendAck`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::client_id::ClientId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<D> {
    pub doc: D,
    pub version: u64,
    #[serde(default)]
    pub users: Option<u32>,
    #[serde(default)]
    pub comments: Vec<Value>,
    #[serde(default)]
    pub comment_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse<S> {
    #[serde(default = "Vec::new")]
    pub steps: Vec<S>,
    #[serde(rename = "clientIDs", default)]
    pub client_ids: Vec<ClientId>,
    #[serde(default)]
    pub comment: Vec<Value>,
    #[serde(default)]
    pub comment_version: u64,
    #[serde(default)]
    pub users: Option<u32>,
}

impl<S> EventsResponse<S> {
    /// Whether the long poll returned without news.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.comment.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest<S> {
    pub version: u64,
    pub steps: Vec<S>,
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    pub comment: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    #[serde(default)]
    pub comment_version: u64,
}

/// Why a request failed, as far as the sync client cares.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 409: the server has steps we have not seen yet.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// 410, or a 400 complaining about the version: our version is no longer
    /// usable and the document must be reloaded.
    pub fn is_stale(&self) -> bool {
        match self {
            RequestError::Status { status: 410, .. } => true,
            RequestError::Status {
                status: 400,
                message,
            } => message.to_ascii_lowercase().contains("invalid version"),
            _ => false,
        }
    }

    /// Client errors other than the ones above cannot be retried.
    pub fn is_fatal(&self) -> bool {
        self.status().is_some_and(|s| s < 500)
    }
}
