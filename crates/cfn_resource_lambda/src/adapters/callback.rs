use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tokio::runtime::Handle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Connection, timeout and request-build failures may succeed on retry.
    pub transient: bool,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

pub trait CallbackTransport: Send + Sync {
    fn put(&self, url: &str, body: &[u8]) -> Result<CallbackReply, TransportError>;
}

/// PUTs response bodies to pre-signed URLs with `reqwest`.
///
/// The blocking `put` drives the async client on the stored runtime handle,
/// so it must be called from a blocking thread, never from an async task.
#[derive(Debug, Clone)]
pub struct HttpCallbackTransport {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpCallbackTransport {
    pub fn new(timeout: Duration, runtime: Handle) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                TransportError::permanent(format!("failed to build callback client: {error}"))
            })?;
        Ok(Self { client, runtime })
    }
}

impl CallbackTransport for HttpCallbackTransport {
    fn put(&self, url: &str, body: &[u8]) -> Result<CallbackReply, TransportError> {
        // The pre-signed S3 URL is signed with an empty content type. The
        // sized body makes the client send the exact Content-Length.
        let request = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body.to_vec());

        self.runtime.block_on(async move {
            let response = request.send().await.map_err(classify_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Ok(CallbackReply { status, body })
        })
    }
}

fn classify_error(error: reqwest::Error) -> TransportError {
    let message = format!("callback request failed: {error}");
    if error.is_timeout() || error.is_connect() || error.is_request() {
        TransportError::transient(message)
    } else {
        TransportError::permanent(message)
    }
}
