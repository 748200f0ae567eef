//! Explicit credential context
//!
//! The bearer token lives in an [`AuthContext`] handed to the API client,
//! not in ambient global state. It is filled on sign-in, cleared on
//! sign-out, and cleared automatically when the server rejects it.

use std::sync::{Arc, Mutex};

/// Sends the user to the login entry point
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self, login_url: &str);
}

/// Shared handle to the current user's identity and credential
#[derive(Clone)]
pub struct AuthContext {
    user_id: String,
    login_url: String,
    token: Arc<Mutex<Option<String>>>,
    redirect: Arc<dyn LoginRedirect>,
}

impl AuthContext {
    /// Create a signed-out context for a user
    pub fn new(
        user_id: impl Into<String>,
        login_url: impl Into<String>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            login_url: login_url.into(),
            token: Arc::new(Mutex::new(None)),
            redirect,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        *self.slot() = Some(token.into());
        tracing::debug!("Signed in as user {}", self.user_id);
    }

    pub fn sign_out(&self) {
        if self.slot().take().is_some() {
            tracing::debug!("Signed out user {}", self.user_id);
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.slot().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.slot().clone()
    }

    /// Drop the credential and send the user to the login page
    pub(crate) fn expire(&self, status: Option<u16>) {
        match status {
            Some(code) => tracing::info!("Server rejected credential (HTTP {})", code),
            None => tracing::info!("No credential available"),
        }
        self.sign_out();
        self.redirect.redirect_to_login(&self.login_url);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &self.user_id)
            .field("login_url", &self.login_url)
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}
