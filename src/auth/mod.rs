//! Authentication for outgoing requests.
//!
//! - [`AuthInterceptor`] attaches the access credential and recovers from
//!   rejected credentials.
//! - [`RefreshCoordinator`] runs at most one refresh at a time and shares its
//!   result with every request that needed it.
//! - [`AuthHooks`] lets the application react to logout and credential
//!   updates.

mod hooks;
mod interceptor;
mod refresh;

pub use hooks::{AuthHooks, FnHooks, NoopHooks};
pub use interceptor::{AuthInterceptor, RetryContext};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
