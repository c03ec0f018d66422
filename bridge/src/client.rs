//! HTTP client for the bridge, the single upstream document service.
//!
//! The bridge is reachable only as one URL taking query-string RPC:
//! `?action=...&alias=...&token=...`. Responses are untrusted and partially
//! malformed; everything goes through [`crate::normalize`].

use crate::normalize::{self, NormalizedRecord, is_truthy};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug)]
pub enum BridgeError {
    Transport(reqwest::Error),

    Html {
        status: u16,
        content_type: String,
        body_preview: String,
    },

    // `source` here is the upstream JSON body, not an error cause; a
    // thiserror derive would misread the field name as Error::source(),
    // so Display/Error are implemented by hand.
    Failed { status: u16, source: Value },
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::Transport(err) => write!(f, "bridge unreachable: {err}"),
            BridgeError::Html { content_type, .. } => {
                write!(f, "bridge returned non-JSON content ({content_type})")
            }
            BridgeError::Failed { status, .. } => {
                write!(f, "bridge failed with status {status}")
            }
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the shared secret; strip it before the
        // error can reach a response body or a log line.
        BridgeError::Transport(err.without_url())
    }
}

impl BridgeError {
    /// Upstream HTTP status, when one was received at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Transport(err) => err.status().map(|s| s.as_u16()),
            BridgeError::Html { status, .. } | BridgeError::Failed { status, .. } => Some(*status),
        }
    }
}

/// Lookup key for a document: a client-facing alias or a raw upstream id.
/// The two map to distinct cache namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKey {
    Alias(String),
    Id(String),
}

impl FileKey {
    pub fn label(&self) -> &str {
        match self {
            FileKey::Alias(alias) => alias,
            FileKey::Id(id) => id,
        }
    }

    fn query_param(&self) -> (&'static str, &str) {
        match self {
            FileKey::Alias(alias) => ("alias", alias),
            FileKey::Id(id) => ("id", id),
        }
    }
}

/// Response from the raw diagnostic pass-through.
#[derive(Debug)]
pub struct RawBridgeResponse {
    pub status: u16,
    pub content_type: String,
    pub body_preview: String,
}

#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        BridgeClient {
            base_url: base_url.to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetches one document and normalizes it. Transport, shape, and
    /// status failures all surface as [`BridgeError`].
    pub async fn fetch_text(&self, key: &FileKey) -> Result<NormalizedRecord, BridgeError> {
        let (param, value) = key.query_param();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "fileText"),
                (param, value),
                ("token", self.token.as_str()),
            ])
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let content_type = content_type_of(&response);
        let body = response.text().await?;

        normalize::normalize_payload(key.label(), status, &content_type, &body)
    }

    /// Asks the bridge to push a document to the owner's mailbox. Side
    /// effecting, so callers must never cache the result. Success requires
    /// a success status and a truthy `ok` in the body.
    pub async fn push_mail(&self, alias: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "pushtogmail"),
                ("alias", alias),
                ("token", self.token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let payload: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::Object(Default::default()));

        if !status.is_success() || !is_truthy(payload.get("ok")) {
            return Err(BridgeError::Failed {
                status: status.as_u16(),
                source: payload,
            });
        }
        Ok(())
    }

    /// Dependency probe with a hard deadline. The probe is abandoned and
    /// reported down if the deadline elapses; nothing else is affected.
    pub async fn ping(&self, deadline: Duration) -> bool {
        let probe = self
            .client
            .get(&self.base_url)
            .query(&[("action", "ping"), ("token", self.token.as_str())])
            .send();

        match tokio::time::timeout(deadline, probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(err)) => {
                tracing::warn!("bridge ping failed: {}", err.without_url());
                false
            }
            Err(_) => {
                tracing::warn!("bridge ping timed out after {deadline:?}");
                false
            }
        }
    }

    /// Diagnostic pass-through: forwards the given query parameters
    /// unmodified, injecting the token only when the caller did not supply
    /// one. Returns transport facts and a truncated body preview.
    pub async fn raw(&self, params: &[(String, String)]) -> Result<RawBridgeResponse, BridgeError> {
        let mut query: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if !query.iter().any(|(k, _)| *k == "token") {
            query.push(("token", self.token.as_str()));
        }

        let response = self.client.get(&self.base_url).query(&query).send().await?;

        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let body = response.text().await?;

        Ok(RawBridgeResponse {
            status,
            content_type,
            body_preview: normalize::preview(&body),
        })
    }
}

fn content_type_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
