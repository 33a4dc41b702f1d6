//! Single-flight credential refresh.
//!
//! Many requests can discover an expired access credential at the same time.
//! [`RefreshCoordinator`] makes sure only the first of them calls the refresh
//! endpoint; the others wait for that call to settle and receive the same
//! outcome. Once an episode settles the state is reset, so the next rejected
//! credential starts a fresh episode.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use super::hooks::AuthHooks;
use crate::error::RefreshError;
use crate::storage::{CredentialPair, TokenStore};

/// Outcome of one refresh episode: the new access credential or the failure
/// shared by every caller of that episode.
pub type RefreshOutcome = std::result::Result<String, RefreshError>;

/// Body of `POST <refresh path>`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Success body of the refresh endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    jwt: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// A caller that hit an expired credential while an episode was in flight.
struct PendingWaiter {
    tx: oneshot::Sender<RefreshOutcome>,
}

impl PendingWaiter {
    fn settle(self, outcome: &RefreshOutcome) {
        // Err means the caller stopped waiting; nothing to deliver.
        let _ = self.tx.send(outcome.clone());
    }
}

/// Shared state of the current episode.
///
/// `waiters` is only non-empty while `in_flight` is set.
#[derive(Default)]
struct RefreshEpisode {
    in_flight: bool,
    waiters: Vec<PendingWaiter>,
}

impl RefreshEpisode {
    /// Reset to idle and hand back everyone who was waiting, in arrival order.
    fn finish(&mut self) -> Vec<PendingWaiter> {
        self.in_flight = false;
        mem::take(&mut self.waiters)
    }
}

/// Coordinates credential refresh across every client of one application.
pub struct RefreshCoordinator {
    store: TokenStore,
    /// Plain transport, never wrapped by an interceptor.
    http: reqwest::Client,
    hooks: Arc<dyn AuthHooks>,
    episode: Mutex<RefreshEpisode>,
}

impl RefreshCoordinator {
    /// Create a coordinator.
    ///
    /// `http` is used for the refresh call itself and must not route through
    /// an [`AuthInterceptor`](super::AuthInterceptor).
    pub fn new(store: TokenStore, http: reqwest::Client, hooks: Arc<dyn AuthHooks>) -> Self {
        Self {
            store,
            http,
            hooks,
            episode: Mutex::new(RefreshEpisode::default()),
        }
    }

    /// The token store this coordinator reads and writes.
    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Whether a refresh episode is currently in flight.
    pub fn in_flight(&self) -> bool {
        self.episode().in_flight
    }

    /// Number of callers waiting on the in-flight episode.
    pub fn waiter_count(&self) -> usize {
        self.episode().waiters.len()
    }

    /// Obtain a new access credential.
    ///
    /// If no episode is in flight, this caller starts one and the refresh
    /// endpoint at `refresh_url` is called exactly once. Otherwise the caller
    /// joins the running episode and no network call is made. Either way the
    /// result is the episode's outcome.
    ///
    /// The episode runs on its own task: dropping the returned future does
    /// not abort it, so joined callers always get an answer.
    pub async fn refresh(self: &Arc<Self>, refresh_url: &Url) -> RefreshOutcome {
        let waiting = {
            let mut episode = self.episode();
            if episode.in_flight {
                let (tx, rx) = oneshot::channel();
                episode.waiters.push(PendingWaiter { tx });
                debug!(waiters = episode.waiters.len(), "Refresh in flight, joining episode");
                Some(rx)
            } else {
                episode.in_flight = true;
                None
            }
        };

        match waiting {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(aborted())),
            None => {
                let coordinator = Arc::clone(self);
                let url = refresh_url.clone();
                tokio::spawn(async move { coordinator.run_episode(&url).await })
                    .await
                    .unwrap_or_else(|_| Err(aborted()))
            }
        }
    }

    async fn run_episode(&self, refresh_url: &Url) -> RefreshOutcome {
        let mut settlement = Settlement::new(self);

        let outcome = self.exchange(refresh_url).await;
        if let Err(err) = &outcome {
            warn!(error = %err, "Credential refresh failed, ending session");
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "Failed to clear stored credentials");
            }
            self.hooks.logout();
        }

        settlement.settle(&outcome);
        outcome
    }

    /// Perform the refresh call and persist its result.
    async fn exchange(&self, refresh_url: &Url) -> RefreshOutcome {
        let refresh = match self.store.get_refresh().await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return Err(RefreshError::NoRefreshCredential),
            Err(e) => return Err(RefreshError::Storage(e.to_string())),
        };

        debug!(url = %refresh_url, "Requesting new credentials");
        let response = self
            .http
            .post(refresh_url.clone())
            .json(&RefreshRequest {
                refresh_token: &refresh,
            })
            .send()
            .await
            .map_err(|e| RefreshError::RefreshCallFailed {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RefreshError::RefreshCallFailed {
                status: Some(status),
                message,
            });
        }

        let body: RefreshResponse =
            response
                .json()
                .await
                .map_err(|e| RefreshError::RefreshCallFailed {
                    status: Some(status),
                    message: format!("invalid refresh response: {e}"),
                })?;

        let access = body.jwt.filter(|t| !t.is_empty()).ok_or_else(|| {
            RefreshError::RefreshCallFailed {
                status: Some(status),
                message: "refresh response has no access credential".into(),
            }
        })?;
        // The server may keep the refresh credential unchanged.
        let refresh = body
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or(refresh);

        let pair = CredentialPair { access, refresh };
        self.store
            .set_pair(&pair)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        self.hooks.credentials_updated(&pair.access, &pair.refresh);

        info!(storage = self.store.backend_name(), "Credentials refreshed");
        Ok(pair.access)
    }

    fn episode(&self) -> MutexGuard<'_, RefreshEpisode> {
        self.episode.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.store)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Resets the episode and notifies waiters exactly once, even if the
/// episode task unwinds before reaching a result.
struct Settlement<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl<'a> Settlement<'a> {
    fn new(coordinator: &'a RefreshCoordinator) -> Self {
        Self {
            coordinator,
            settled: false,
        }
    }

    fn settle(&mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        let waiters = self.coordinator.episode().finish();
        debug!(waiters = waiters.len(), success = outcome.is_ok(), "Refresh episode settled");
        for waiter in waiters {
            waiter.settle(outcome);
        }
    }
}

impl Drop for Settlement<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(&Err(aborted()));
        }
    }
}

fn aborted() -> RefreshError {
    RefreshError::RefreshCallFailed {
        status: None,
        message: "refresh episode aborted".into(),
    }
}
