//! Credential-owning request layer
//!
//! The `Session` is where the credential lifecycle meets dispatch. Each call
//! reads a fresh credential snapshot from the store, dispatches, and on a
//! 401/403 asks the single-flight `TokenRefresher` for a new pair and retries
//! exactly once. Store and refresh failures end the call chain.

use std::sync::Arc;
use std::time::Duration;

use intuit_auth::{CredentialStore, TokenRefresher};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::classify::{Classification, classify_status};
use crate::dispatch::RequestDispatcher;
use crate::error::{DispatchError, Result};

pub struct Session {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<TokenRefresher>,
    dispatcher: RequestDispatcher,
    /// Proactive refresh window; `None` keeps refresh purely reactive.
    refresh_margin: Option<Duration>,
}

impl Session {
    /// Reads credentials from the refresher's store, so the snapshot used for
    /// dispatch and the one the refresher rotates are always the same.
    pub fn new(refresher: Arc<TokenRefresher>, dispatcher: RequestDispatcher) -> Self {
        Self {
            store: refresher.store().clone(),
            refresher,
            dispatcher,
            refresh_margin: None,
        }
    }

    /// Refresh ahead of time when the tracked expiry is within `margin`.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = Some(margin);
        self
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Dispatch with the current credential, refreshing and retrying once on
    /// 401/403.
    pub async fn execute(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        if let Some(margin) = self.refresh_margin
            && let Err(e) = self.refresher.refresh_if_expiring(margin).await
        {
            warn!(error = %e, "proactive refresh failed, continuing with stored token");
        }

        let credential = self.store.load().await?;

        match self
            .dispatcher
            .execute(method.clone(), url, &credential.access_token, body)
            .await
        {
            Err(DispatchError::Remote { status, .. })
                if classify_status(status) == Classification::Unauthorized =>
            {
                info!(status, "access token rejected, refreshing");
                let fresh = self
                    .refresher
                    .refresh(Some(credential.access_token.as_str()))
                    .await?;
                debug!("retrying with refreshed token");
                Ok(self
                    .dispatcher
                    .execute(method, url, &fresh.access_token, body)
                    .await?)
            }
            other => Ok(other?),
        }
    }
}
