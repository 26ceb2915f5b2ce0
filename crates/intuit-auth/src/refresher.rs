//! Single-flight token refresh
//!
//! Refresh tokens are single-use, so concurrent exchanges with the same token
//! race and every loser is rejected. `TokenRefresher` serializes exchanges
//! behind one async mutex and is the only component that calls
//! `CredentialStore::save`.
//!
//! Callers that saw a 401/403 pass the access token they used. Once a caller
//! holds the guard it re-reads the store: if the token already changed, a
//! concurrent caller rotated it and the stored pair is returned without
//! touching the provider. A refresh token the provider refused is remembered
//! and answered with the same rejection, so N simultaneous failures cost
//! exactly one exchange and all N share its outcome. Failures that never
//! reached the provider are not remembered.
//!
//! A pair minted by an exchange whose save failed is kept in memory. The
//! next refresh retries the save with it rather than spending the consumed
//! refresh token a second time.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::constants::TOKEN_ENDPOINT;
use crate::credentials::{Credential, CredentialStore};
use crate::error::{Error, Result};
use crate::token;

/// State guarded by the refresh mutex.
#[derive(Default)]
struct RefreshState {
    /// Refresh token the provider refused, with the rejection message.
    rejected: Option<(String, String)>,
    /// Pair from an exchange whose save failed, keyed by the refresh token
    /// that exchange consumed.
    unsaved: Option<(String, Credential)>,
}

pub struct TokenRefresher {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: Secret<String>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<RefreshState>,
    /// Access-token expiry from the most recent exchange. In memory only;
    /// unknown until this process has refreshed at least once.
    expires_at: RwLock<Option<Instant>>,
}

impl TokenRefresher {
    pub fn new(
        client: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret,
            store,
            state: Mutex::new(RefreshState::default()),
            expires_at: RwLock::new(None),
        }
    }

    /// Point the refresher at a different token endpoint (tests, proxies).
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Refresh after `stale_access` was rejected by the API.
    ///
    /// Returns the stored credential untouched when another caller already
    /// rotated past `stale_access`. With `None` the exchange always happens.
    pub async fn refresh(&self, stale_access: Option<&str>) -> Result<Credential> {
        let mut state = self.state.lock().await;
        let current = self.store.load().await?;

        if let Some(stale) = stale_access
            && current.access_token != stale
        {
            debug!("credential already rotated by a concurrent refresh");
            return Ok(current);
        }

        self.exchange(&mut state, current).await
    }

    /// Unconditionally exchange the stored refresh token.
    pub async fn refresh_now(&self) -> Result<Credential> {
        self.refresh(None).await
    }

    /// Refresh only when the last known expiry falls within `margin`.
    ///
    /// Returns `Ok(None)` when the expiry is unknown or still far enough out.
    /// The expiry is re-checked under the guard so concurrent callers near
    /// expiry trigger a single exchange.
    pub async fn refresh_if_expiring(&self, margin: Duration) -> Result<Option<Credential>> {
        if !self.expires_within(margin) {
            return Ok(None);
        }

        let mut state = self.state.lock().await;
        if !self.expires_within(margin) {
            return Ok(None);
        }

        info!(margin_secs = margin.as_secs(), "access token expiring soon, refreshing");
        let current = self.store.load().await?;
        self.exchange(&mut state, current).await.map(Some)
    }

    /// Whether the last known expiry is within `margin` of now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        let expires_at = *self
            .expires_at
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        expires_at.is_some_and(|at| at <= Instant::now() + margin)
    }

    fn set_expiry(&self, expires_at: Option<Instant>) {
        *self
            .expires_at
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = expires_at;
    }

    async fn exchange(&self, state: &mut RefreshState, current: Credential) -> Result<Credential> {
        if let Some((consumed, minted)) = state.unsaved.take() {
            if consumed == current.refresh_token {
                info!("retrying save of a credential minted by an earlier exchange");
                return self.persist(state, consumed, minted).await;
            }
            debug!("stored credential changed since the unsaved exchange, discarding it");
        }

        if let Some((rejected, message)) = &state.rejected
            && *rejected == current.refresh_token
        {
            debug!("refresh token already rejected by the provider");
            return Err(Error::RefreshDenied(message.clone()));
        }

        let response = match token::refresh_grant(
            &self.client,
            &self.token_endpoint,
            &self.client_id,
            self.client_secret.expose(),
            &current.refresh_token,
        )
        .await
        {
            Ok(response) => response,
            Err(failure) => {
                warn!(
                    error = %failure.error,
                    answered = failure.answered,
                    "token refresh rejected"
                );
                metrics::counter!("qbo_token_refreshes_total", "outcome" => "denied")
                    .increment(1);
                if failure.answered {
                    state.rejected =
                        Some((current.refresh_token, failure.error.detail().to_string()));
                    self.set_expiry(None);
                }
                return Err(failure.error);
            }
        };
        state.rejected = None;

        let rotated = response
            .refresh_token
            .as_deref()
            .is_some_and(|r| !r.is_empty());
        let refresh = match response.refresh_token {
            Some(r) if !r.is_empty() => r,
            _ => current.refresh_token.clone(),
        };
        let credential = Credential::new(response.access_token, refresh);

        if let Some(secs) = response.expires_in {
            self.set_expiry(Some(Instant::now() + Duration::from_secs(secs)));
        }
        info!(rotated, expires_in = response.expires_in, "access token refreshed");

        self.persist(state, current.refresh_token, credential).await
    }

    /// Save a freshly minted pair. On failure the pair stays in `state` so
    /// the consumed refresh token is never exchanged again.
    async fn persist(
        &self,
        state: &mut RefreshState,
        consumed: String,
        credential: Credential,
    ) -> Result<Credential> {
        if let Err(e) = self.store.save(credential.clone()).await {
            error!(error = %e, "failed to persist refreshed credential");
            metrics::counter!("qbo_token_refreshes_total", "outcome" => "store_error")
                .increment(1);
            state.unsaved = Some((consumed, credential));
            return Err(e);
        }

        metrics::counter!("qbo_token_refreshes_total", "outcome" => "success").increment(1);
        Ok(credential)
    }
}
