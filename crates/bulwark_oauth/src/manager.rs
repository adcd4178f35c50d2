//! Token manager: caching, refresh and persistence for one client.

use crate::{HookRegistry, MemoryTokenStorage, RefreshRequest, TokenHooks, TokenStorage};
use bulwark_core::{OAuthConfig, OAuthToken};
use bulwark_error::{BulwarkResult, OAuthError, OAuthErrorKind};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// OAuth2 grant types used against the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// `refresh_token`
    RefreshToken,
    /// `password`
    Password,
    /// `client_credentials`
    ClientCredentials,
    /// `authorization_code`
    AuthorizationCode,
}

impl Grant {
    /// Wire name of the grant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Grant::RefreshToken => "refresh_token",
            Grant::Password => "password",
            Grant::ClientCredentials => "client_credentials",
            Grant::AuthorizationCode => "authorization_code",
        }
    }
}

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Holds and refreshes the bearer token for one client.
///
/// The token lives behind its own reader/writer lock. Concurrent callers that
/// find the token stale queue on the write lock, so at most one network
/// refresh runs at a time and the rest observe its result.
pub struct TokenManager {
    client: String,
    config: OAuthConfig,
    http: reqwest::Client,
    token: RwLock<Option<OAuthToken>>,
    storage: Arc<dyn TokenStorage>,
    hooks: Option<Arc<dyn TokenHooks>>,
    registry: Option<HookRegistry>,
}

impl TokenManager {
    /// Create a manager with in-memory storage and no hooks.
    pub fn new(client: impl Into<String>, config: OAuthConfig, http: reqwest::Client) -> Self {
        Self {
            client: client.into(),
            config,
            http,
            token: RwLock::new(None),
            storage: Arc::new(MemoryTokenStorage::new()),
            hooks: None,
            registry: None,
        }
    }

    /// Use `storage` for persistence.
    pub fn with_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Use `hooks` for refresh customisation, ahead of any registry entry.
    pub fn with_hooks(mut self, hooks: Arc<dyn TokenHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Look up hooks for this client in `registry` at every refresh, so
    /// registrations made after construction take effect.
    pub fn with_registry(mut self, registry: &HookRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    /// Client name the token belongs to.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// OAuth settings.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Current token, if any, without refreshing.
    pub async fn get_token(&self) -> Option<OAuthToken> {
        self.token.read().await.clone()
    }

    /// Replace the token and persist it.
    #[instrument(skip(self, token), fields(client = %self.client))]
    pub async fn set_token(&self, token: OAuthToken) {
        let mut guard = self.token.write().await;
        self.commit(&mut guard, token).await;
    }

    /// Restore a previously persisted token into memory.
    ///
    /// Returns the loaded token, or `None` when storage holds nothing.
    #[instrument(skip(self), fields(client = %self.client))]
    pub async fn load_persisted(&self) -> BulwarkResult<Option<OAuthToken>> {
        let stored = self
            .storage
            .load(&self.client)
            .await
            .map_err(|e| self.error(OAuthErrorKind::Storage(e.to_string())))?;
        if let Some(token) = &stored {
            debug!(expiry = ?token.expiry, "Restored persisted token");
            *self.token.write().await = Some(token.clone());
        }
        Ok(stored)
    }

    /// Return a token usable for at least the refresh buffer, refreshing if needed.
    #[instrument(skip(self), fields(client = %self.client))]
    pub async fn get_valid_token(&self) -> BulwarkResult<OAuthToken> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref().filter(|t| t.is_fresh_at(Utc::now())) {
                return Ok(token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh_at(Utc::now())) {
            return Ok(token.clone());
        }
        self.refresh_locked(&mut guard).await
    }

    /// Refresh unconditionally.
    #[instrument(skip(self), fields(client = %self.client))]
    pub async fn refresh(&self) -> BulwarkResult<OAuthToken> {
        let mut guard = self.token.write().await;
        self.refresh_locked(&mut guard).await
    }

    /// Forget the token and best-effort delete the persisted copy.
    ///
    /// No request is made to the provider.
    #[instrument(skip(self), fields(client = %self.client))]
    pub async fn revoke(&self) {
        *self.token.write().await = None;
        if let Err(e) = self.storage.delete(&self.client).await {
            warn!(error = %e, "Failed to delete persisted token");
        }
        debug!("Token revoked");
    }

    /// Authorization endpoint URL for an interactive authorization-code flow.
    pub fn authorization_url(&self, state: &str) -> BulwarkResult<String> {
        let auth_url = self
            .config
            .auth_url
            .as_deref()
            .ok_or_else(|| self.error(OAuthErrorKind::InvalidUrl("auth_url not configured".into())))?;

        let mut params = vec![
            ("response_type", "code".to_string()),
            ("client_id", self.config.client_id.clone()),
        ];
        if let Some(redirect) = &self.config.redirect_url {
            params.push(("redirect_uri", redirect.clone()));
        }
        if !self.config.scopes.is_empty() {
            params.push(("scope", self.config.scope_string()));
        }
        params.push(("state", state.to_string()));

        let url = reqwest::Url::parse_with_params(auth_url, &params)
            .map_err(|e| self.error(OAuthErrorKind::InvalidUrl(e.to_string())))?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for a token, then commit and persist it.
    #[instrument(skip(self, code), fields(client = %self.client))]
    pub async fn exchange_code(&self, code: &str) -> BulwarkResult<OAuthToken> {
        let mut form = vec![("code".to_string(), code.to_string())];
        if let Some(redirect) = &self.config.redirect_url {
            form.push(("redirect_uri".to_string(), redirect.clone()));
        }

        let mut token = self
            .request_token(Grant::AuthorizationCode, form, &RefreshRequest::default(), None)
            .await?;
        self.run_after_refresh(self.current_hooks().as_deref(), &mut token)
            .await?;

        let mut guard = self.token.write().await;
        self.commit(&mut guard, token.clone()).await;
        Ok(token)
    }

    async fn refresh_locked(&self, slot: &mut Option<OAuthToken>) -> BulwarkResult<OAuthToken> {
        let hooks = self.current_hooks();
        let mut request = RefreshRequest::default();
        if let Some(hooks) = &hooks {
            hooks
                .before_refresh(&self.config, slot.as_ref(), &mut request)
                .await;
        }
        if let Some(reason) = request.vetoed() {
            warn!(reason, "Token refresh vetoed");
            return Err(self.error(OAuthErrorKind::Vetoed(reason.to_string())).into());
        }

        let current_refresh = slot.as_ref().and_then(|t| t.refresh_token.clone());
        let mut token = match &current_refresh {
            Some(refresh_token) => {
                let form = vec![("refresh_token".to_string(), refresh_token.clone())];
                self.request_token(Grant::RefreshToken, form, &request, current_refresh.as_deref())
                    .await?
            }
            None => self.fallback_grants(&request).await?,
        };

        self.run_after_refresh(hooks.as_deref(), &mut token).await?;
        self.commit(slot, token.clone()).await;
        debug!(expiry = ?token.expiry, "Token refreshed");
        Ok(token)
    }

    async fn fallback_grants(&self, request: &RefreshRequest) -> BulwarkResult<OAuthToken> {
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            let form = vec![
                ("username".to_string(), username.clone()),
                ("password".to_string(), password.clone()),
            ];
            match self.request_token(Grant::Password, form, request, None).await {
                Ok(token) => return Ok(token),
                Err(e) => warn!(error = %e, "Password grant failed, trying client credentials"),
            }
        }

        if self.config.client_id.is_empty() {
            return Err(self.error(OAuthErrorKind::MissingCredentials).into());
        }
        self.request_token(Grant::ClientCredentials, Vec::new(), request, None)
            .await
    }

    #[instrument(skip_all, fields(client = %self.client, grant = grant.as_str()))]
    async fn request_token(
        &self,
        grant: Grant,
        mut form: Vec<(String, String)>,
        request: &RefreshRequest,
        previous_refresh: Option<&str>,
    ) -> BulwarkResult<OAuthToken> {
        if self.config.token_url.is_empty() {
            return Err(self.error(OAuthErrorKind::NotConfigured).into());
        }

        form.push(("grant_type".to_string(), grant.as_str().to_string()));
        form.push(("client_id".to_string(), self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }
        if !self.config.scopes.is_empty() && grant != Grant::RefreshToken {
            form.push(("scope".to_string(), self.config.scope_string()));
        }
        form.extend(request.form().iter().cloned());

        let mut builder = self
            .http
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.error(OAuthErrorKind::Http(e.to_string())))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.error(OAuthErrorKind::Http(e.to_string())))?;

        if !status.is_success() {
            return Err(self
                .error(OAuthErrorKind::TokenEndpoint {
                    status: status.as_u16(),
                    body,
                })
                .into());
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| self.error(OAuthErrorKind::InvalidResponse(e.to_string())))?;
        if parsed.access_token.is_empty() {
            return Err(self
                .error(OAuthErrorKind::InvalidResponse("empty access_token".into()))
                .into());
        }

        let now = Utc::now();
        Ok(OAuthToken {
            access_token: parsed.access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            // Providers often omit the refresh token on refresh; keep the old one.
            refresh_token: parsed
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expiry: parsed
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + Duration::seconds(secs)),
            scope: parsed.scope.unwrap_or_default(),
        })
    }

    fn current_hooks(&self) -> Option<Arc<dyn TokenHooks>> {
        self.hooks.clone().or_else(|| {
            self.registry
                .as_ref()
                .and_then(|registry| registry.get(&self.client))
        })
    }

    async fn run_after_refresh(
        &self,
        hooks: Option<&dyn TokenHooks>,
        token: &mut OAuthToken,
    ) -> BulwarkResult<()> {
        if let Some(hooks) = hooks {
            hooks
                .after_refresh(token)
                .await
                .map_err(|e| self.error(OAuthErrorKind::Hook(e.to_string())))?;
        }
        Ok(())
    }

    async fn commit(&self, slot: &mut Option<OAuthToken>, token: OAuthToken) {
        if let Err(e) = self.storage.save(&self.client, &token).await {
            warn!(client = %self.client, error = %e, "Failed to persist token, keeping it in memory");
        }
        *slot = Some(token);
    }

    #[track_caller]
    fn error(&self, kind: OAuthErrorKind) -> OAuthError {
        OAuthError::new(self.client.clone(), kind)
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("client", &self.client)
            .field("token_url", &self.config.token_url)
            .field("storage", &self.storage)
            .field("hooks", &self.hooks.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}
