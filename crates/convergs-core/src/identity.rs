//! Signed-in user presence, delegated to an external identity provider.
//!
//! Only presence, a display name and the sign-in prompt toggle are modelled
//! here. OAuth flows belong to the provider.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    /// First letter of the name, for avatar badges.
    pub fn initial(&self) -> Option<char> {
        self.name.chars().next().map(|c| c.to_ascii_uppercase())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The user of the current provider session, if any.
    async fn current_user(&self) -> Result<Option<UserProfile>>;
    async fn sign_out(&self) -> Result<()>;
}

/// Provider for deployments without sign-in.
pub struct AnonymousIdentity;

#[async_trait]
impl IdentityProvider for AnonymousIdentity {
    async fn current_user(&self) -> Result<Option<UserProfile>> {
        Ok(None)
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

/// Provider holding a user set in-process (terminal playground, tests).
#[derive(Default)]
pub struct StaticIdentity {
    user: Mutex<Option<UserProfile>>,
}

impl StaticIdentity {
    pub fn new(user: Option<UserProfile>) -> Self {
        Self {
            user: Mutex::new(user),
        }
    }

    pub fn sign_in(&self, user: UserProfile) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<UserProfile>> {
        Ok(self
            .user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn sign_out(&self) -> Result<()> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// What the presentation layer reads about the signed-in user.
pub struct AuthContext {
    provider: Arc<dyn IdentityProvider>,
    user: Option<UserProfile>,
    loading: bool,
    prompt_open: bool,
}

impl AuthContext {
    /// Starts in the loading state until the first [`AuthContext::refresh`].
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            user: None,
            loading: true,
            prompt_open: false,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.name.as_str())
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn sign_in_prompt_open(&self) -> bool {
        self.prompt_open
    }

    pub fn open_sign_in_prompt(&mut self) {
        self.prompt_open = true;
    }

    pub fn close_sign_in_prompt(&mut self) {
        self.prompt_open = false;
    }

    /// Ask the provider who is signed in. A provider error counts as signed
    /// out. Finding a user closes the sign-in prompt.
    pub async fn refresh(&mut self) {
        self.user = match self.provider.current_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!("identity lookup failed, treating as signed out: {err:#}");
                None
            }
        };
        self.loading = false;
        if self.user.is_some() {
            self.prompt_open = false;
        }
    }

    /// On provider failure the current user is kept.
    pub async fn sign_out(&mut self) -> Result<()> {
        match self.provider.sign_out().await {
            Ok(()) => {
                self.user = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("sign out failed: {err:#}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenIdentity;

    #[async_trait]
    impl IdentityProvider for BrokenIdentity {
        async fn current_user(&self) -> Result<Option<UserProfile>> {
            anyhow::bail!("no provider session")
        }

        async fn sign_out(&self) -> Result<()> {
            anyhow::bail!("provider unreachable")
        }
    }

    #[tokio::test]
    async fn starts_loading_until_refreshed() {
        let mut ctx = AuthContext::new(Arc::new(AnonymousIdentity));
        assert!(ctx.is_loading());
        ctx.refresh().await;
        assert!(!ctx.is_loading());
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn refresh_finding_user_closes_prompt() {
        let provider = Arc::new(StaticIdentity::default());
        let mut ctx = AuthContext::new(provider.clone());
        ctx.open_sign_in_prompt();
        ctx.refresh().await;
        assert!(ctx.sign_in_prompt_open());

        provider.sign_in(UserProfile::new("u-1", "ada"));
        ctx.refresh().await;
        assert_eq!(ctx.display_name(), Some("ada"));
        assert_eq!(ctx.user().and_then(UserProfile::initial), Some('A'));
        assert!(!ctx.sign_in_prompt_open());
    }

    #[tokio::test]
    async fn provider_error_means_signed_out() {
        let mut ctx = AuthContext::new(Arc::new(BrokenIdentity));
        ctx.refresh().await;
        assert!(ctx.user().is_none());
        assert!(!ctx.is_loading());
    }

    #[tokio::test]
    async fn sign_out_clears_user() {
        let provider = Arc::new(StaticIdentity::new(Some(UserProfile::new("u-1", "Grace"))));
        let mut ctx = AuthContext::new(provider);
        ctx.refresh().await;
        assert!(ctx.user().is_some());
        ctx.sign_out().await.unwrap();
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn failed_sign_out_keeps_user() {
        let mut ctx = AuthContext::new(Arc::new(BrokenIdentity));
        ctx.user = Some(UserProfile::new("u-1", "Grace"));
        assert!(ctx.sign_out().await.is_err());
        assert_eq!(ctx.display_name(), Some("Grace"));
    }

    #[test]
    fn prompt_toggles() {
        let mut ctx = AuthContext::new(Arc::new(AnonymousIdentity));
        assert!(!ctx.sign_in_prompt_open());
        ctx.open_sign_in_prompt();
        assert!(ctx.sign_in_prompt_open());
        ctx.close_sign_in_prompt();
        assert!(!ctx.sign_in_prompt_open());
    }
}
