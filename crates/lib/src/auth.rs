//! Sign-in state and the identity provider seam.
//!
//! Identity is delegated to a provider; only the outcome (`isLoggedIn`, `userEmail`) is kept
//! locally. No credentials are stored.

use crate::notice::Notice;
use crate::prefs::Prefs;
use anyhow::Result;
use async_trait::async_trait;

pub const LOGGED_IN_KEY: &str = "isLoggedIn";
pub const USER_EMAIL_KEY: &str = "userEmail";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginState {
    pub is_logged_in: bool,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in cancelled")]
    Cancelled,
    #[error("sign-in failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Identity, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Login state persisted in [`Prefs`].
pub struct LoginStore {
    prefs: Prefs,
}

impl LoginStore {
    pub fn new(prefs: Prefs) -> Self {
        Self { prefs }
    }

    pub async fn state(&self) -> LoginState {
        let is_logged_in = self.prefs.get_bool(LOGGED_IN_KEY).await.unwrap_or(false);
        LoginState {
            is_logged_in,
            user_email: if is_logged_in {
                self.prefs.get_string(USER_EMAIL_KEY).await
            } else {
                None
            },
        }
    }

    pub async fn record_sign_in(&self, email: &str) -> Result<()> {
        self.prefs.set_string(USER_EMAIL_KEY, email).await?;
        self.prefs.set_bool(LOGGED_IN_KEY, true).await?;
        log::info!("signed in as {}", email);
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.prefs.set_bool(LOGGED_IN_KEY, false).await?;
        self.prefs.remove(USER_EMAIL_KEY).await?;
        log::info!("signed out");
        Ok(())
    }
}

/// Provider for the terminal: the user types an address. `None` means the prompt was abandoned.
pub struct EmailIdentity {
    email: Option<String>,
}

impl EmailIdentity {
    pub fn new(email: Option<String>) -> Self {
        Self { email }
    }
}

fn valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[async_trait]
impl IdentityProvider for EmailIdentity {
    async fn sign_in(&self) -> Result<Identity, AuthError> {
        let email = match self.email.as_deref().map(str::trim) {
            None | Some("") => return Err(AuthError::Cancelled),
            Some(email) => email,
        };
        if !valid_email(email) {
            return Err(AuthError::Failed(format!("invalid email address: {}", email)));
        }
        Ok(Identity {
            email: email.to_string(),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Sign in through `provider`. On failure the stored state is left as it was and the
/// matching notice is returned.
pub async fn sign_in(
    provider: &dyn IdentityProvider,
    store: &LoginStore,
) -> Result<LoginState, Notice> {
    match provider.sign_in().await {
        Ok(identity) => {
            if let Err(e) = store.record_sign_in(&identity.email).await {
                log::warn!("failed to persist sign-in: {:#}", e);
                return Err(Notice::SignInFailed(e.to_string()));
            }
            Ok(store.state().await)
        }
        Err(AuthError::Cancelled) => Err(Notice::SignInCancelled),
        Err(AuthError::Failed(detail)) => {
            log::warn!("sign-in failed: {}", detail);
            Err(Notice::SignInFailed(detail))
        }
    }
}

/// Sign out of the provider (best effort) and clear the stored state.
pub async fn sign_out(provider: &dyn IdentityProvider, store: &LoginStore) -> Result<()> {
    if let Err(e) = provider.sign_out().await {
        log::warn!("provider sign-out failed: {}", e);
    }
    store.sign_out().await
}
