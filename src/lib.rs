//! # rota-client
//!
//! Authenticated HTTP client with single-flight bearer token refresh.
//!
//! Every client created by a [`ClientFactory`] attaches the stored access
//! credential to its requests. When a backend answers 401 or 403, the client
//! refreshes the credential pair through the refresh endpoint and replays the
//! request once. Concurrent rejections share a single refresh call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rota_client::{ClientFactory, ClientOptions, FnHooks, Result, TokenStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let hooks = FnHooks::new(|| eprintln!("session ended, please log in again"));
//!     let factory = ClientFactory::new(TokenStore::in_memory(), Arc::new(hooks));
//!
//!     // Credentials come from a login flow elsewhere.
//!     factory.token_store().set_access("access-token").await?;
//!     factory.token_store().set_refresh("refresh-token").await?;
//!
//!     let contracts =
//!         factory.create_client("https://api.example.com/v1", ClientOptions::default())?;
//!     let body: serde_json::Value = contracts.get_json("contracts").await?;
//!     println!("{body}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `system-keyring` - Enable system keyring credential storage

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod storage;

// Re-exports for ergonomic usage
pub use auth::{AuthHooks, AuthInterceptor, FnHooks, NoopHooks, RefreshCoordinator, RetryContext};
pub use client::{ApiClient, ClientFactory, ClientOptions, PublicClient};
pub use config::Config;
pub use error::{Error, RefreshError, Result};
pub use storage::{CredentialPair, KeyValueStore, TokenStore};
