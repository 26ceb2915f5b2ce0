//! Refresh-grant exchange against Intuit's token endpoint
//!
//! Intuit authenticates the app with HTTP Basic (`client_id:client_secret`)
//! and carries the refresh token in a form-encoded body. The exchange is
//! single-use: once the provider accepts a refresh token it is invalid, so
//! this module never retries.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Successful token endpoint response.
///
/// Intuit normally rotates the refresh token on every exchange, but the
/// field is optional: when it is absent the previous refresh token stays in
/// use.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Seconds until the refresh token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_refresh_token_expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// `Authorization` header value for HTTP Basic client authentication.
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{client_id}:{client_secret}"))
    )
}

/// A failed exchange and whether the provider answered it.
///
/// When `answered` is false the request never reached the provider, so the
/// refresh token it carried is still unspent.
#[derive(Debug)]
pub(crate) struct GrantFailure {
    pub error: Error,
    pub answered: bool,
}

/// Exchange a refresh token for a new token pair.
///
/// Any outcome other than HTTP 200 with an `access_token` is `RefreshDenied`,
/// network failures included.
pub async fn refresh_token(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    refresh_grant(client, endpoint, client_id, client_secret, refresh)
        .await
        .map_err(|failure| failure.error)
}

pub(crate) async fn refresh_grant(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
) -> std::result::Result<TokenResponse, GrantFailure> {
    let refused = |message: String| GrantFailure {
        error: Error::RefreshDenied(message),
        answered: true,
    };

    let response = client
        .post(endpoint)
        .header(AUTHORIZATION, basic_auth_header(client_id, client_secret))
        .header(ACCEPT, "application/json")
        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh)])
        .send()
        .await
        .map_err(|e| GrantFailure {
            error: Error::RefreshDenied(format!("token refresh request failed: {e}")),
            answered: false,
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| refused(format!("reading token response: {e}")))?;

    if status != reqwest::StatusCode::OK {
        return Err(refused(format!("token endpoint returned {status}: {body}")));
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| refused(format!("invalid refresh response: {e}")))?;

    if token.access_token.is_empty() {
        return Err(refused(
            "token endpoint returned an empty access_token".into(),
        ));
    }

    debug!(
        rotated = token.refresh_token.is_some(),
        expires_in = token.expires_in,
        "token endpoint accepted refresh"
    );
    Ok(token)
}
