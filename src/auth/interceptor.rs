//! Bearer credential attachment and expiry recovery for one client.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Request, Response};
use tracing::{debug, warn};
use url::Url;

use super::RefreshCoordinator;
use crate::error::{Error, Result, is_expiry_status};
use crate::storage::TokenStore;

/// Retry state carried alongside one request.
///
/// Once `retried` is set the request is never replayed again, whatever the
/// server answers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub retried: bool,
}

/// Wraps a transport: attaches the stored access credential to each request
/// and, when the server rejects it, refreshes through the shared
/// [`RefreshCoordinator`] and replays the request once.
pub struct AuthInterceptor {
    http: reqwest::Client,
    store: TokenStore,
    coordinator: Arc<RefreshCoordinator>,
    refresh_url: Url,
}

impl AuthInterceptor {
    pub fn new(
        http: reqwest::Client,
        coordinator: Arc<RefreshCoordinator>,
        refresh_url: Url,
    ) -> Self {
        Self {
            http,
            store: coordinator.token_store().clone(),
            coordinator,
            refresh_url,
        }
    }

    /// The transport requests are sent with.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The coordinator shared with every other client of the application.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// URL of the refresh endpoint this interceptor uses when it starts an
    /// episode.
    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    /// Send a fresh request.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.execute_with(request, RetryContext::default()).await
    }

    /// Send a request with an explicit retry context.
    ///
    /// Responses whose status is not 401/403 are returned unchanged. A
    /// rejected request that was not yet retried triggers (or joins) a
    /// refresh and is replayed once with the new credential; a rejected
    /// request that was already retried fails with
    /// [`Error::RetryExhausted`].
    pub async fn execute_with(
        &self,
        mut request: Request,
        mut ctx: RetryContext,
    ) -> Result<Response> {
        if let Some(access) = self.store.get_access().await? {
            set_bearer(request.headers_mut(), &access)?;
        }

        loop {
            let replay = request.try_clone();
            let response = self
                .http
                .execute(request)
                .await
                .map_err(Error::from_transport)?;

            let status = response.status().as_u16();
            if !is_expiry_status(status) {
                return Ok(response);
            }

            if ctx.retried {
                let message = response.text().await.unwrap_or_default();
                warn!(status, "Credential rejected again after refresh");
                return Err(Error::RetryExhausted { status, message });
            }

            let Some(mut replay) = replay else {
                debug!(status, "Request body cannot be replayed, returning rejection");
                return Ok(response);
            };

            ctx.retried = true;
            debug!(status, url = %replay.url(), "Credential rejected, refreshing");
            let access = self.coordinator.refresh(&self.refresh_url).await?;

            set_bearer(replay.headers_mut(), &access)?;
            request = replay;
        }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("refresh_url", &self.refresh_url.as_str())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

fn set_bearer(headers: &mut HeaderMap, access: &str) -> Result<()> {
    let mut value = HeaderValue::from_str(&format!("Bearer {access}"))
        .map_err(|_| Error::InvalidHeader("access credential is not a valid header value".into()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
