//! Redirect boundary for the authorization-code flow
//!
//! A browser host navigates to the authorization URL and later reads the
//! redirect-back location from its address bar. Other hosts (terminal, desktop,
//! server) implement [`NavigationContext`] with their own mechanism; the rest of
//! the pipeline only sees the trait.

use crate::error::Result;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Where the user is sent to authorize, and where they come back
pub trait NavigationContext: Send + Sync {
    /// Send the user to `url` (browser redirect, printed link, opened window, ...)
    fn navigate(&self, url: &Url) -> Result<()>;

    /// The location the provider redirected back to, if the user has returned
    fn current_url(&self) -> Option<Url>;
}

#[derive(Debug, Default)]
struct ManualState {
    pending: Option<Url>,
    redirect: Option<Url>,
}

/// In-memory navigation for hosts without a browser
///
/// `navigate` records the authorization URL for the host to show the user;
/// the host then hands back the redirect location with
/// [`complete_redirect`](Self::complete_redirect).
#[derive(Clone, Debug, Default)]
pub struct ManualNavigation {
    state: Arc<Mutex<ManualState>>,
}

impl ManualNavigation {
    /// Create a context with no pending authorization and no redirect
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that already holds a redirect-back location
    pub fn with_redirect(url: Url) -> Self {
        let nav = Self::new();
        nav.complete_redirect(url);
        nav
    }

    /// The last authorization URL passed to `navigate`
    pub fn pending_authorization(&self) -> Option<Url> {
        self.lock().pending.clone()
    }

    /// Record the location the provider redirected back to
    pub fn complete_redirect(&self, url: Url) {
        self.lock().redirect = Some(url);
    }

    /// Parse and record a redirect location pasted by the user
    pub fn complete_redirect_str(&self, location: &str) -> Result<()> {
        let url = Url::parse(location.trim()).map_err(|e| {
            crate::error::Error::Other(format!("invalid redirect location {location:?}: {e}"))
        })?;
        self.complete_redirect(url);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NavigationContext for ManualNavigation {
    fn navigate(&self, url: &Url) -> Result<()> {
        tracing::info!(url = %url, "Authorization required; open this URL to continue");
        let mut state = self.lock();
        state.pending = Some(url.clone());
        state.redirect = None;
        Ok(())
    }

    fn current_url(&self) -> Option<Url> {
        self.lock().redirect.clone()
    }
}
