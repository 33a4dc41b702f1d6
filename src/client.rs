//! Client factory and per-service clients.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::{AuthHooks, AuthInterceptor, RefreshCoordinator};
use crate::config::{Config, DEFAULT_REFRESH_PATH, StorageBackend};
use crate::error::{Error, Result};
use crate::net::HttpClient;
use crate::storage::{FileStore, KeyValueStore, MemoryStore, TokenStore};

/// Per-client options for [`ClientFactory::create_client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Refresh endpoint path, resolved against the client's base URL.
    pub refresh_path: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
        }
    }
}

impl ClientOptions {
    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }
}

/// Builds one client per backend service.
///
/// Every client created by one factory shares the factory's token store,
/// refresh coordinator and hooks, so an expired session is recovered (or
/// ended) once for all of them.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    http: HttpClient,
    coordinator: Arc<RefreshCoordinator>,
    default_options: ClientOptions,
}

impl ClientFactory {
    /// Create a factory with the default transport.
    pub fn new(store: TokenStore, hooks: Arc<dyn AuthHooks>) -> Self {
        Self::with_http_client(store, hooks, HttpClient::new())
    }

    /// Create a factory with a custom transport.
    pub fn with_http_client(
        store: TokenStore,
        hooks: Arc<dyn AuthHooks>,
        http: HttpClient,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(store, http.inner().clone(), hooks));
        Self {
            http,
            coordinator,
            default_options: ClientOptions::default(),
        }
    }

    /// Create a factory from configuration: storage backend, transport
    /// settings and default refresh path.
    pub fn from_config(config: &Config, hooks: Arc<dyn AuthHooks>) -> Result<Self> {
        let backend = storage_backend(config)?;
        let http = HttpClient::from_config(&config.client)?;

        let mut factory = Self::with_http_client(TokenStore::new(backend), hooks, http);
        factory.default_options =
            ClientOptions::default().refresh_path(&config.client.refresh_path);
        Ok(factory)
    }

    /// Options applied by [`create_default_client`](Self::create_default_client).
    pub fn default_options(&self) -> &ClientOptions {
        &self.default_options
    }

    /// The credential store shared by all clients of this factory.
    pub fn token_store(&self) -> &TokenStore {
        self.coordinator.token_store()
    }

    /// The refresh coordinator shared by all clients of this factory.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Create an authenticated client bound to `base_url`.
    pub fn create_client(&self, base_url: &str, options: ClientOptions) -> Result<ApiClient> {
        let base_url = parse_base_url(base_url)?;
        let refresh_url = join_url(&base_url, &options.refresh_path)?;
        debug!(base_url = %base_url, refresh_url = %refresh_url, "Creating authenticated client");

        let interceptor = AuthInterceptor::new(
            self.http.inner().clone(),
            Arc::clone(&self.coordinator),
            refresh_url,
        );
        Ok(ApiClient {
            base_url,
            interceptor: Arc::new(interceptor),
        })
    }

    /// Create an authenticated client with the factory's default options.
    pub fn create_default_client(&self, base_url: &str) -> Result<ApiClient> {
        self.create_client(base_url, self.default_options.clone())
    }

    /// Create a client for public routes. It never attaches credentials and
    /// never refreshes.
    pub fn public_client(&self, base_url: &str) -> Result<PublicClient> {
        Ok(PublicClient {
            base_url: parse_base_url(base_url)?,
            http: self.http.inner().clone(),
        })
    }
}

fn storage_backend(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => {
            let store = match &config.storage.path {
                Some(path) => FileStore::new(path),
                None => FileStore::default_path()?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(feature = "system-keyring")]
        StorageBackend::Keyring => Ok(Arc::new(crate::storage::KeyringStore::new())),
        #[cfg(not(feature = "system-keyring"))]
        StorageBackend::Keyring => Err(Error::Config(
            "keyring storage requires the `system-keyring` feature".into(),
        )),
    }
}

/// Authenticated client for one backend service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    interceptor: Arc<AuthInterceptor>,
}

impl ApiClient {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the refresh endpoint used when this client starts an episode.
    pub fn refresh_url(&self) -> &Url {
        self.interceptor.refresh_url()
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        join_url(&self.base_url, path)
    }

    /// Start building a request to `path`. Send it with [`send`](Self::send).
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.interceptor.http().request(method, self.url(path)?))
    }

    /// Send a built request through the interceptor.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(Error::Network)?;
        self.interceptor.execute(request).await
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send(self.request(Method::GET, path)?).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        self.send(self.request(Method::POST, path)?.json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        self.send(self.request(Method::PUT, path)?.json(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        self.send(self.request(Method::PATCH, path)?.json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.send(self.request(Method::DELETE, path)?).await
    }

    /// GET `path` and decode a JSON body. Non-2xx responses become
    /// [`Error::Api`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        read_json(self.get(path).await?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        read_json(self.post(path, body).await?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        read_json(self.put(path, body).await?).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        read_json(self.delete(path).await?).await
    }
}

/// Unauthenticated client for public routes.
#[derive(Debug, Clone)]
pub struct PublicClient {
    base_url: Url,
    http: reqwest::Client,
}

impl PublicClient {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self.http.request(method, join_url(&self.base_url, path)?))
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(Error::from_transport)
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send(self.request(Method::GET, path)?).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        self.send(self.request(Method::POST, path)?.json(body)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        read_json(self.get(path).await?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        read_json(self.post(path, body).await?).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(Error::from_transport)?;
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Parse a base URL, making sure relative paths resolve beneath it.
fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl(format!("{base_url}: cannot be a base URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve `path` beneath `base`. A leading slash does not escape the base
/// path; absolute URLs are used as-is.
fn join_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
}
