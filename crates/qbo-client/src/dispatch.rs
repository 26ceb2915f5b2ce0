//! Single HTTP round trip to the accounting API
//!
//! One request per call, no retries. HTTP 200 is parsed as JSON and returned
//! unchanged; any other status becomes `DispatchError::Remote` with the raw
//! body. Only a missing response is a `Transport` error.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::DispatchError;

/// Outcome of one dispatch: the remote payload or a classified failure.
pub type DispatchResult = std::result::Result<Value, DispatchError>;

#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Send one bearer-authenticated request.
    ///
    /// A JSON body sets `Content-Type: application/json`; every request
    /// carries `Accept: application/json`.
    #[instrument(skip_all, fields(method = %method, url = %url))]
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        access_token: &str,
        body: Option<&Value>,
    ) -> DispatchResult {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection"
            } else {
                "other"
            };
            warn!(error = %e, reason, "request failed before a response arrived");
            DispatchError::Transport(format!("{reason}: {e}"))
        })?;

        // A body cut off after the status line is still a transport failure.
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            warn!(status = status.as_u16(), error = %e, "response body truncated");
            DispatchError::Transport(format!(
                "reading response body after status {}: {e}",
                status.as_u16()
            ))
        })?;

        if status != reqwest::StatusCode::OK {
            debug!(status = status.as_u16(), "remote API returned an error status");
            return Err(DispatchError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| DispatchError::InvalidPayload {
            message: e.to_string(),
            body: text,
        })
    }
}
