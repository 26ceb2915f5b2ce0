//! Intuit OAuth constants
//!
//! The client ID and secret identify a developer app and come from
//! configuration; only the fixed endpoint and credential-file keys live here.

/// Token endpoint for refresh-grant exchanges
pub const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// Env-file key holding the current access token
pub const ACCESS_TOKEN_KEY: &str = "QB_ACCESS_TOKEN";

/// Env-file key holding the current refresh token
pub const REFRESH_TOKEN_KEY: &str = "QB_REFRESH_TOKEN";
