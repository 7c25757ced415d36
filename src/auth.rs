use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::storage::{AUTH_TOKEN_KEY, KeyValueStore};

/// Where the bearer token of the signed-in session comes from.
///
/// `None` means there is no usable session right now; the services translate
/// that into `AuthRequired` for mutations and into a skipped refresh for
/// background synchronization.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// Reads the token the sign-in flow left in local storage.
#[derive(Clone)]
pub struct StoredCredentials {
    store: Arc<dyn KeyValueStore>,
}

impl StoredCredentials {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CredentialSource for StoredCredentials {
    async fn bearer_token(&self) -> Option<String> {
        let raw = match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(value) => value?,
            Err(err) => {
                warn!("failed to read stored auth token: {err}");
                return None;
            }
        };
        // A stored-but-blank token is treated the same as no token at all.
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_owned())
        }
    }
}

/// Fixed credential for embedding contexts that manage sign-in themselves.
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A source that never yields a token.
    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
