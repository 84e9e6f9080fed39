//! Per-pipeline access token slot

use crate::error::{AuthError, Result};
use crate::types::AccessToken;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the access token for the current run
///
/// Cloning yields another handle to the same slot. Each pipeline owns one
/// store; nothing here is process-wide. The slot is written once by the token
/// exchange, read by every later stage, and cleared when the run ends.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored token
    pub async fn set(&self, token: AccessToken) {
        tracing::debug!(token = %token, "Access token stored");
        *self.slot.write().await = Some(token);
    }

    /// The stored token, if any
    pub async fn current(&self) -> Option<AccessToken> {
        self.slot.read().await.clone()
    }

    /// The stored token, or [`AuthError::NotAuthenticated`]
    pub async fn require(&self) -> Result<AccessToken> {
        self.current()
            .await
            .ok_or_else(|| AuthError::NotAuthenticated.into())
    }

    /// Whether a token is present
    pub async fn is_authenticated(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Drop the stored token
    pub async fn clear(&self) {
        if self.slot.write().await.take().is_some() {
            tracing::debug!("Access token cleared");
        }
    }
}
