//! OAuth2 authorization-code flow
//!
//! [`AuthSession`] builds the authorization URL, reads the code from the
//! redirect-back location, and exchanges it for an access token that it puts
//! in the pipeline's [`TokenStore`].

mod navigation;
mod token_store;

pub use navigation::{ManualNavigation, NavigationContext};
pub use token_store::TokenStore;

use crate::config::{AuthConfig, ClientCredentials};
use crate::error::{AuthError, Result, body_snippet};
use crate::types::{AccessToken, AuthorizationCode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// Length of the random `state` parameter
const STATE_LEN: usize = 32;

/// Successful token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Drives the authorization-code exchange for one pipeline
pub struct AuthSession {
    client: reqwest::Client,
    credentials: ClientCredentials,
    config: AuthConfig,
    tokens: TokenStore,
    issued_state: Arc<Mutex<Option<String>>>,
    consumed_code: Arc<Mutex<Option<String>>>,
}

impl AuthSession {
    /// Create a session that stores tokens in `tokens`
    pub fn new(
        client: reqwest::Client,
        credentials: ClientCredentials,
        config: AuthConfig,
        tokens: TokenStore,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
            tokens,
            issued_state: Arc::new(Mutex::new(None)),
            consumed_code: Arc::new(Mutex::new(None)),
        }
    }

    /// The token store this session writes to
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Build the provider authorization URL
    ///
    /// Each call issues a fresh `state` value; only the latest one is accepted
    /// on the way back.
    pub fn authorization_url(&self) -> Result<Url> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();

        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.credentials.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", self.config.scopes.join(" ").as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AuthError::InvalidEndpoint(e.to_string()))?;

        *lock(&self.issued_state) = Some(state);
        Ok(url)
    }

    /// Send the user to the provider's consent page
    ///
    /// This is a navigation side effect; the code arrives later through the
    /// same context's [`current_url`](NavigationContext::current_url).
    pub fn begin_authorization(&self, nav: &dyn NavigationContext) -> Result<Url> {
        let url = self.authorization_url()?;
        nav.navigate(&url)?;
        Ok(url)
    }

    /// Read the `code` query parameter from the redirect-back location
    ///
    /// Returns `None` when the user has not authorized yet, when the provider
    /// reported an error, when the `state` does not match the one issued, or
    /// when the code was already handed to the token endpoint.
    pub fn extract_authorization_code(
        &self,
        nav: &dyn NavigationContext,
    ) -> Option<AuthorizationCode> {
        let url = nav.current_url()?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            tracing::warn!(
                error = %error,
                description = error_description.as_deref().unwrap_or(""),
                "Provider declined authorization"
            );
            return None;
        }

        let code = code.filter(|c| !c.trim().is_empty())?;

        // A session that never issued a state (e.g. after a full page reload)
        // has nothing to compare against.
        if let Some(expected) = lock(&self.issued_state).as_deref()
            && state.as_deref() != Some(expected)
        {
            tracing::warn!("Authorization callback state mismatch; ignoring code");
            return None;
        }

        if lock(&self.consumed_code).as_deref() == Some(code.as_str()) {
            tracing::debug!("Authorization code already used; authorize again");
            return None;
        }

        Some(AuthorizationCode::from_redirect(code, url))
    }

    /// Exchange an authorization code for an access token
    ///
    /// Performs no request when the code or either client credential is empty.
    /// On success the token is stored and returned; on failure the store is
    /// left untouched. One attempt, no retry.
    pub async fn exchange_code_for_token(&self, code: &AuthorizationCode) -> Result<AccessToken> {
        if !self.credentials.is_complete() {
            return Err(AuthError::MissingCredentials.into());
        }
        if code.as_str().trim().is_empty() {
            return Err(AuthError::MissingCode.into());
        }

        tracing::debug!(token_url = %self.config.token_url, "Exchanging authorization code");

        // Codes are single-use at the provider, whatever the outcome.
        *lock(&self.consumed_code) = Some(code.as_str().to_string());

        let response = self
            .client
            .post(&self.config.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Token endpoint rejected the code");
            return Err(AuthError::TokenRejected {
                status,
                body: body_snippet(&body),
            }
            .into());
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|_| AuthError::MalformedTokenResponse)?;
        let value = parsed
            .access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MalformedTokenResponse)?;

        let mut token = AccessToken::new(value);
        token.token_type = parsed.token_type;
        token.expires_in = parsed.expires_in;

        self.tokens.set(token.clone()).await;
        *lock(&self.issued_state) = None;

        tracing::info!(token = %token, expires_in = ?token.expires_in, "Access token obtained");
        Ok(token)
    }
}

fn lock(slot: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
