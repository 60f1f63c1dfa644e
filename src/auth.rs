//! Bearer token access
//!
//! The client never owns the token. It asks a `TokenAccessor` for it when
//! building each request, and login/logout flows write it through the same
//! accessor.

use std::sync::Arc;
use tracing::warn;

use crate::storage::KeyValueStore;

/// Store key holding the bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// Read/write access to the bearer token
pub trait TokenAccessor: Send + Sync {
    /// Current token, if the user is logged in
    fn token(&self) -> Option<String>;

    /// Replaces the stored token
    fn set_token(&self, token: &str);

    /// Forgets the stored token
    fn clear_token(&self);
}

/// Token kept in a `KeyValueStore` under [`TOKEN_KEY`]
///
/// Storage failures are logged. A token that cannot be read is treated as
/// absent, so requests go out unauthenticated rather than failing.
#[derive(Clone)]
pub struct StoredToken {
    store: Arc<dyn KeyValueStore>,
}

impl StoredToken {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl TokenAccessor for StoredToken {
    fn token(&self) -> Option<String> {
        match self.store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read auth token");
                None
            }
        }
    }

    fn set_token(&self, token: &str) {
        if let Err(e) = self.store.set(TOKEN_KEY, token) {
            warn!(error = %e, "failed to store auth token");
        }
    }

    fn clear_token(&self) {
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            warn!(error = %e, "failed to clear auth token");
        }
    }
}
