//! Application-wide callbacks fired by the refresh protocol.

use std::fmt;

/// Callbacks the application supplies once, when building the client
/// factory.
///
/// `logout` runs at most once per failed refresh episode, after the token
/// store has been cleared. It is where the application sends the user back
/// to a login screen.
pub trait AuthHooks: Send + Sync {
    /// Called when the session cannot be recovered.
    fn logout(&self);

    /// Called after a refresh persisted a new credential pair.
    fn credentials_updated(&self, _access: &str, _refresh: &str) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl AuthHooks for NoopHooks {
    fn logout(&self) {}
}

type LogoutFn = dyn Fn() + Send + Sync;
type UpdatedFn = dyn Fn(&str, &str) + Send + Sync;

/// Hooks built from closures.
pub struct FnHooks {
    logout: Box<LogoutFn>,
    updated: Option<Box<UpdatedFn>>,
}

impl FnHooks {
    /// Create hooks with a logout callback.
    pub fn new(logout: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            logout: Box::new(logout),
            updated: None,
        }
    }

    /// Set the credentials-updated callback.
    pub fn on_credentials_updated(
        mut self,
        updated: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Self {
        self.updated = Some(Box::new(updated));
        self
    }
}

impl AuthHooks for FnHooks {
    fn logout(&self) {
        (self.logout)();
    }

    fn credentials_updated(&self, access: &str, refresh: &str) {
        if let Some(updated) = &self.updated {
            updated(access, refresh);
        }
    }
}

impl fmt::Debug for FnHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHooks")
            .field("has_credentials_updated", &self.updated.is_some())
            .finish()
    }
}
