//! The request orchestrator.

use crate::admission::{AdmissionChain, GracePolicy};
use crate::auth::apply_auth;
use crate::outcome::Outcome;
use crate::request::{DecodeTarget, RawResponse, RequestBody, RequestOptions, ResponseHandler};
use crate::stats::{StatsSink, StatsTracker};
use crate::transport::{build_http_client, deliver};
use bulwark_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use bulwark_core::{ClientConfig, ClientStats, OAuthToken};
use bulwark_error::{
    BulwarkError, BulwarkResult, ClientError, ClientErrorKind, ConfigError, OAuthError,
    OAuthErrorKind,
};
use bulwark_oauth::{HookRegistry, TokenManager, TokenStorage};
use bulwark_rate_limit::{
    LimiterFactory, ServerCooldown, WindowLogFactory, detect_cooldown, is_rate_limit_status,
};
use chrono::{DateTime, Utc};
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Resilient HTTP client for one remote service.
///
/// Every call passes, in order: the circuit breaker, the server cooldown, the
/// local rate-limit windows, authentication, and a retrying send. The outcome
/// then feeds back into the breaker and the statistics.
///
/// Instances never share breaker, limiter or token state.
///
/// # Example
///
/// ```rust,ignore
/// use bulwark_client::ResilientClient;
/// use reqwest::Method;
///
/// let client = ResilientClient::builder("tmdb", config).build()?;
/// let mut movie = Movie::default();
/// client
///     .make_request(Method::GET, "/movie/603", None, Some(&mut movie), None)
///     .await?;
/// ```
pub struct ResilientClient {
    name: String,
    config: ClientConfig,
    http: reqwest::Client,
    breaker: CircuitBreaker,
    admission: AdmissionChain,
    cooldown: ServerCooldown,
    stats: Arc<StatsTracker>,
    token_manager: Option<Arc<TokenManager>>,
    stats_sink: Option<Arc<dyn StatsSink>>,
}

impl ResilientClient {
    /// Start building a client named `name`.
    pub fn builder(name: impl Into<String>, config: ClientConfig) -> ResilientClientBuilder {
        ResilientClientBuilder::new(name, config)
    }

    /// Client name, used as the error prefix and statistics key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call with the standard 30 second rate-limit grace period.
    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
    ) -> BulwarkResult<()> {
        self.execute(
            GracePolicy::STANDARD,
            method,
            endpoint,
            body,
            target,
            handler,
            &RequestOptions::default(),
        )
        .await
    }

    /// Standard call with header and query overrides.
    pub async fn make_request_with_options(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
        options: &RequestOptions,
    ) -> BulwarkResult<()> {
        self.execute(GracePolicy::STANDARD, method, endpoint, body, target, handler, options)
            .await
    }

    /// Call with the 120 second grace period, for downloads and other
    /// operations that should wait for a slot rather than fail fast.
    pub async fn make_priority_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
        options: &RequestOptions,
    ) -> BulwarkResult<()> {
        self.execute(GracePolicy::PRIORITY, method, endpoint, body, target, handler, options)
            .await
    }

    /// Call with a caller-chosen grace period.
    #[allow(clippy::too_many_arguments)]
    pub async fn make_request_with_grace(
        &self,
        grace: Duration,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
        options: &RequestOptions,
    ) -> BulwarkResult<()> {
        self.execute(GracePolicy::Wait(grace), method, endpoint, body, target, handler, options)
            .await
    }

    /// Call that never sleeps for a rate-limit slot: any projected wait fails
    /// at once. Never counts against the lifetime ceiling.
    pub async fn make_request_non_blocking(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
        options: &RequestOptions,
    ) -> BulwarkResult<()> {
        self.execute(GracePolicy::NonBlocking, method, endpoint, body, target, handler, options)
            .await
    }

    /// GET `endpoint` and decode the JSON body.
    pub async fn get_json<T>(&self, endpoint: &str) -> BulwarkResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let mut slot: Option<T> = None;
        self.make_request(Method::GET, endpoint, None, Some(&mut slot), None)
            .await?;
        slot.ok_or_else(|| self.error(ClientErrorKind::Decode("response body was null".into())))
    }

    /// Current breaker state.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Failures counted by the breaker since it last closed.
    pub fn breaker_failure_count(&self) -> u32 {
        self.breaker.failure_count()
    }

    /// Force the breaker closed.
    pub fn reset_breaker(&self) {
        self.breaker.reset();
        self.sync_breaker_state();
    }

    /// Snapshot of the client's statistics.
    pub fn stats(&self) -> ClientStats {
        self.stats.snapshot()
    }

    /// The pooled transport.
    ///
    /// Requests sent through it directly bypass the breaker, rate limiting,
    /// retries and statistics.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Token manager, for OAuth clients.
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        self.token_manager.as_ref()
    }

    /// End of the current server-imposed cooldown, if one is active.
    pub fn rate_limited_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown.until().filter(|until| *until > Utc::now())
    }

    /// Current OAuth token.
    pub async fn oauth_token(&self) -> BulwarkResult<Option<OAuthToken>> {
        Ok(self.tokens()?.get_token().await)
    }

    /// Replace the OAuth token and persist it.
    pub async fn set_oauth_token(&self, token: OAuthToken) -> BulwarkResult<()> {
        self.tokens()?.set_token(token).await;
        Ok(())
    }

    /// Authorization URL for an interactive OAuth flow.
    pub fn authorization_url(&self, state: &str) -> BulwarkResult<String> {
        self.tokens()?.authorization_url(state)
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(&self, code: &str) -> BulwarkResult<OAuthToken> {
        self.tokens()?.exchange_code(code).await
    }

    /// Absolute URL for `endpoint`.
    ///
    /// Absolute URLs pass through untouched. Relative endpoints are joined to
    /// the base URL; a leading copy of the base path is dropped so that
    /// `/api/v3/series` against `https://host/api/v3` does not double up.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.config.base_url().trim_end_matches('/');
        if base.is_empty() {
            return endpoint.to_string();
        }

        let mut path = endpoint.trim_start_matches('/');
        if let Ok(url) = reqwest::Url::parse(base) {
            let base_path = url.path().trim_matches('/');
            let rest = path
                .strip_prefix(base_path)
                .filter(|_| !base_path.is_empty())
                .filter(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'));
            if let Some(rest) = rest {
                path = rest.trim_start_matches('/');
            }
        }

        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('?') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(
        skip_all,
        fields(client = %self.name, method = %method, endpoint, ?policy)
    )]
    async fn execute(
        &self,
        policy: GracePolicy,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
        options: &RequestOptions,
    ) -> BulwarkResult<()> {
        if !self.breaker.try_admit() {
            self.sync_breaker_state();
            debug!("Rejected by circuit breaker");
            return Err(self.error(ClientErrorKind::BreakerOpen));
        }
        self.sync_breaker_state();

        if let Some(remaining) = self.cooldown.check_and_clear(Utc::now()) {
            self.stats.set_next_available(self.cooldown.until());
            debug!(?remaining, "Rejected by server cooldown");
            return Err(self.error(ClientErrorKind::ServerCooldown { remaining }));
        }

        if let Err(kind) = self.admission.admit(policy).await {
            if let ClientErrorKind::RateLimited { wait, .. }
            | ClientErrorKind::GraceExhausted { wait, .. } = &kind
            {
                self.stats.set_next_available(
                    chrono::Duration::from_std(*wait)
                        .ok()
                        .and_then(|wait| Utc::now().checked_add_signed(wait)),
                );
            }
            return Err(self.error(kind));
        }
        self.admission.consume(policy.counts_lifetime());

        let request = self
            .build_request(method, endpoint, body, options)
            .await
            .map_err(|kind| self.error(kind))?;

        let delivery = deliver(
            &self.http,
            request,
            *self.config.max_retries(),
            self.config.retry_backoff(),
        )
        .await;

        let result = match delivery.response {
            Ok(response) => self.settle(response, target, handler),
            Err(message) => {
                self.breaker.record_failure();
                self.stats.record_failure(None, &message);
                error!(attempts = delivery.attempts, error = %message, "Request failed");
                Err(self.error(ClientErrorKind::Transport {
                    attempts: delivery.attempts,
                    message,
                }))
            }
        };

        self.sync_breaker_state();
        self.persist_stats();
        result
    }

    async fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
        options: &RequestOptions,
    ) -> Result<reqwest::Request, ClientErrorKind> {
        let url = self.resolve_url(endpoint);
        let url = reqwest::Url::parse(&url)
            .map_err(|e| ClientErrorKind::Construction(format!("invalid url {}: {}", url, e)))?;

        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");
        builder = match body {
            None => builder,
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Form(pairs)) => builder.form(&pairs),
            Some(RequestBody::Raw {
                content_type,
                bytes,
            }) => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes),
        };

        builder = apply_auth(builder, self.config.auth(), self.token_manager.as_deref()).await?;
        if !options.query().is_empty() {
            builder = builder.query(options.query());
        }

        let mut request = builder
            .build()
            .map_err(|e| ClientErrorKind::Construction(e.to_string()))?;
        for (name, value) in options.headers() {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ClientErrorKind::Construction(format!("invalid header name {}: {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ClientErrorKind::Construction(format!("invalid header value for {}: {}", name, e))
            })?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }

    /// Classify a received response, update breaker and statistics, then
    /// hand the body to the handler and target.
    fn settle(
        &self,
        response: RawResponse,
        target: Option<&mut dyn DecodeTarget>,
        handler: Option<&dyn ResponseHandler>,
    ) -> BulwarkResult<()> {
        let status = *response.status();

        let cooldown = if is_rate_limit_status(status) {
            detect_cooldown(
                status,
                response.headers(),
                &response.text(),
                self.admission.primary_interval(),
                Utc::now(),
            )
        } else {
            None
        };
        if let Some(cooldown) = cooldown {
            warn!(status, until = %cooldown.until, source = %cooldown.source, "Server rate limit detected");
            self.cooldown.apply(cooldown);
            self.stats.set_next_available(Some(cooldown.until));
        }

        match Outcome::classify(status, cooldown.is_some()) {
            Outcome::Success | Outcome::ClientFault => {
                self.breaker.record_success();
                self.stats.record_success(*response.elapsed());
            }
            Outcome::RateLimited => {
                self.breaker.record_success();
                self.stats.record_request_only();
            }
            Outcome::Unhealthy => {
                self.breaker.record_failure();
                self.stats
                    .record_failure(Some(*response.elapsed()), &format!("HTTP {}", status));
            }
        }

        if status >= 400 {
            return Err(self.error(ClientErrorKind::status(status, &response.text())));
        }

        if let Some(handler) = handler {
            handler.handle(&response).map_err(|e| {
                self.stats.note_error(&e.to_string());
                self.error(ClientErrorKind::Handler(e.to_string()))
            })?;
        }
        if let Some(target) = target {
            target.decode(response.body()).map_err(|e| {
                self.stats.note_error("json decode error");
                self.error(ClientErrorKind::Decode(e.to_string()))
            })?;
        }
        Ok(())
    }

    fn sync_breaker_state(&self) {
        self.stats.set_breaker_state(self.breaker.state().as_ref());
    }

    fn persist_stats(&self) {
        if !*self.config.enable_stats() {
            return;
        }
        let Some(sink) = self.stats_sink.clone() else {
            return;
        };
        let table = self.config.stats_table().clone();
        let snapshot = self.stats.snapshot();
        tokio::spawn(async move {
            if let Err(e) = sink.upsert(&table, &snapshot).await {
                warn!(client = %snapshot.client_name, error = %e, "Failed to persist client statistics");
            }
        });
    }

    fn tokens(&self) -> BulwarkResult<&TokenManager> {
        self.token_manager
            .as_deref()
            .ok_or_else(|| OAuthError::new(self.name.clone(), OAuthErrorKind::NotConfigured).into())
    }

    #[track_caller]
    fn error(&self, kind: ClientErrorKind) -> BulwarkError {
        ClientError::new(self.name.clone(), kind).into()
    }
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.name)
            .field("base_url", self.config.base_url())
            .field("auth", &self.config.auth().type_name())
            .field("breaker", &self.breaker.state())
            .field("admission", &self.admission)
            .finish()
    }
}

/// Builder for [`ResilientClient`].
///
/// Only the name and configuration are required. Everything else falls back
/// to a sensible default: a fresh pooled transport, [`WindowLogFactory`]
/// limiters, in-memory token storage and no statistics sink.
pub struct ResilientClientBuilder {
    name: String,
    config: ClientConfig,
    http: Option<reqwest::Client>,
    token_manager: Option<Arc<TokenManager>>,
    limiter_factory: Option<Arc<dyn LimiterFactory>>,
    stats_sink: Option<Arc<dyn StatsSink>>,
    hooks: Option<HookRegistry>,
    token_storage: Option<Arc<dyn TokenStorage>>,
}

impl ResilientClientBuilder {
    fn new(name: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            name: name.into(),
            config,
            http: None,
            token_manager: None,
            limiter_factory: None,
            stats_sink: None,
            hooks: None,
            token_storage: None,
        }
    }

    /// Share an existing transport instead of building one.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Use a pre-built token manager.
    pub fn token_manager(mut self, manager: Arc<TokenManager>) -> Self {
        self.token_manager = Some(manager);
        self
    }

    /// Build limiters with `factory`.
    pub fn limiter_factory(mut self, factory: Arc<dyn LimiterFactory>) -> Self {
        self.limiter_factory = Some(factory);
        self
    }

    /// Upsert statistics to `sink` when `enable_stats` is set.
    pub fn stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(sink);
        self
    }

    /// Look up token hooks for this client in `registry`.
    pub fn hooks(mut self, registry: HookRegistry) -> Self {
        self.hooks = Some(registry);
        self
    }

    /// Persist OAuth tokens in `storage`.
    pub fn token_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.token_storage = Some(storage);
        self
    }

    /// Validate the configuration and assemble the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the transport
    /// cannot be built.
    #[instrument(skip(self), fields(client = %self.name))]
    pub fn build(self) -> BulwarkResult<ResilientClient> {
        self.config
            .validate()
            .map_err(|e| ConfigError::new(format!("client '{}': {}", self.name, e.message)))?;

        let http = match self.http {
            Some(http) => http,
            None => build_http_client(&self.name, &self.config)?,
        };

        let token_manager = match (self.token_manager, self.config.auth().oauth()) {
            (Some(manager), _) => Some(manager),
            (None, Some(oauth)) => {
                let mut manager = TokenManager::new(self.name.clone(), oauth.clone(), http.clone());
                if let Some(storage) = self.token_storage {
                    manager = manager.with_storage(storage);
                }
                if let Some(registry) = &self.hooks {
                    manager = manager.with_registry(registry);
                }
                Some(Arc::new(manager))
            }
            (None, None) => None,
        };

        let factory = self
            .limiter_factory
            .unwrap_or_else(|| Arc::new(WindowLogFactory));
        let admission = AdmissionChain::from_config(&self.config, factory.as_ref());
        let breaker = CircuitBreaker::new(self.name.clone(), BreakerConfig::from(&self.config));

        debug!(
            auth = self.config.auth().type_name(),
            admission_steps = admission.steps().len(),
            "Created resilient client"
        );

        Ok(ResilientClient {
            stats: Arc::new(StatsTracker::new(self.name.clone())),
            name: self.name,
            config: self.config,
            http,
            breaker,
            admission,
            cooldown: ServerCooldown::new(),
            token_manager,
            stats_sink: self.stats_sink,
        })
    }
}
