//! Provider customisation of the token lifecycle.

use async_trait::async_trait;
use bulwark_core::{OAuthConfig, OAuthToken};
use bulwark_error::BulwarkResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Mutable view of an outgoing refresh, handed to [`TokenHooks::before_refresh`].
///
/// Extra form fields and headers are applied to every grant attempted during
/// the refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshRequest {
    form: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    veto: Option<String>,
}

impl RefreshRequest {
    /// Add a form field to the token request.
    pub fn form_param(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.form.push((key.into(), value.into()));
        self
    }

    /// Add a header to the token request.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Cancel the refresh.
    pub fn veto(&mut self, reason: impl Into<String>) {
        self.veto = Some(reason.into());
    }

    /// Extra form fields.
    pub fn form(&self) -> &[(String, String)] {
        &self.form
    }

    /// Extra headers.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Veto reason, if the refresh was cancelled.
    pub fn vetoed(&self) -> Option<&str> {
        self.veto.as_deref()
    }
}

/// Provider hooks around a token refresh. Both default to no-ops.
#[async_trait]
pub trait TokenHooks: Send + Sync {
    /// Inspect or adjust the refresh before any grant is attempted.
    async fn before_refresh(
        &self,
        _config: &OAuthConfig,
        _current: Option<&OAuthToken>,
        _request: &mut RefreshRequest,
    ) {
    }

    /// Adjust a newly issued token before it is committed.
    async fn after_refresh(&self, _token: &mut OAuthToken) -> BulwarkResult<()> {
        Ok(())
    }
}

/// Hooks looked up by client name.
///
/// Constructed explicitly and handed to each [`crate::TokenManager`], so tests
/// can use isolated registries.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: Arc<RwLock<HashMap<String, Arc<dyn TokenHooks>>>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register hooks for `client`, returning any hooks they replace.
    pub fn register(
        &self,
        client: impl Into<String>,
        hooks: Arc<dyn TokenHooks>,
    ) -> Option<Arc<dyn TokenHooks>> {
        self.hooks.write().insert(client.into(), hooks)
    }

    /// Hooks registered for `client`.
    pub fn get(&self, client: &str) -> Option<Arc<dyn TokenHooks>> {
        self.hooks.read().get(client).cloned()
    }

    /// Unregister hooks for `client`.
    pub fn remove(&self, client: &str) -> Option<Arc<dyn TokenHooks>> {
        self.hooks.write().remove(client)
    }

    /// Client names with registered hooks.
    pub fn clients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("clients", &self.clients())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl TokenHooks for Noop {}

    #[test]
    fn registry_is_shared_between_clones() {
        let registry = HookRegistry::new();
        let clone = registry.clone();
        assert!(registry.register("trakt", Arc::new(Noop)).is_none());
        assert!(clone.get("trakt").is_some());
        assert!(clone.remove("trakt").is_some());
        assert!(registry.get("trakt").is_none());
    }

    #[test]
    fn veto_is_recorded() {
        let mut request = RefreshRequest::default();
        request.form_param("audience", "api").header("X-Trace", "1");
        assert!(request.vetoed().is_none());
        request.veto("maintenance");
        assert_eq!(request.vetoed(), Some("maintenance"));
        assert_eq!(request.form().len(), 1);
    }
}
