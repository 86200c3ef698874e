//! Request gateway: the single path every backend call takes.
//!
//! Outbound, the credential is read from durable storage (not from the
//! session store) and attached as a bearer header, so calls issued before
//! the session has initialized are still authenticated. Inbound, every
//! failure is logged with its context; a 401 from any call clears storage and
//! emits a single [`SessionEvent::Invalidated`].

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::events::{SessionEvent, SessionEventTx};
use crate::storage::{SessionStorage, TOKEN_KEY};

mod errors;

pub use errors::{GatewayError, GatewayErrorKind};

/// Standard User-Agent header for Kheyma API requests.
pub const USER_AGENT: &str = concat!("kheyma/", env!("CARGO_PKG_VERSION"));

/// Status the backend uses to reject a credential.
const UNAUTHORIZED: u16 = 401;

#[derive(Clone)]
pub struct RequestGateway {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn SessionStorage>,
    events: Option<SessionEventTx>,
    login_route: String,
}

impl RequestGateway {
    /// Creates a gateway with a default HTTP client.
    pub fn new(base_url: impl Into<String>, storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, storage)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
            events: None,
            login_route: "/login".to_string(),
        }
    }

    /// Builds a gateway from config (base URL, timeout, login route).
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn from_config(config: &Config, storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let base_url = config.effective_base_url()?;
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        Ok(Self::with_client(http, base_url, storage).with_login_route(&config.login_route))
    }

    /// Subscribes the host to invalidation events.
    #[must_use]
    pub fn with_events(mut self, events: SessionEventTx) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn with_login_route(mut self, route: &str) -> Self {
        self.login_route = route.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Sends a request through both interception stages.
    ///
    /// A successful response yields its JSON body (`Null` when empty, a JSON
    /// string when the body is not JSON).
    ///
    /// # Errors
    /// Returns a [`GatewayError`] for transport failures and non-2xx statuses.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let request = self.authorize(request);

        match request.send().await {
            Ok(response) => self.inspect(&method, path, response).await,
            Err(err) => {
                let error = GatewayError::from_reqwest(&err);
                tracing::error!(
                    target_path = path,
                    method = %method,
                    kind = %error.kind,
                    message = %error.message,
                    "API error"
                );
                Err(error)
            }
        }
    }

    /// GET `path`.
    ///
    /// # Errors
    /// See [`RequestGateway::send`].
    pub async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        self.send(Method::GET, path, None).await
    }

    /// POST `path` with a JSON body.
    ///
    /// # Errors
    /// See [`RequestGateway::send`]; a body that cannot be encoded is a parse error.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, GatewayError> {
        self.send(Method::POST, path, Some(encode(body)?)).await
    }

    /// PUT `path` with a JSON body.
    ///
    /// # Errors
    /// See [`RequestGateway::send`]; a body that cannot be encoded is a parse error.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, GatewayError> {
        self.send(Method::PUT, path, Some(encode(body)?)).await
    }

    /// Outbound stage: attach the stored credential, if any.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.storage.get(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => request.bearer_auth(token),
            Ok(_) => request,
            Err(err) => {
                tracing::warn!(error = %err, "could not read stored credential, sending unauthenticated");
                request
            }
        }
    }

    /// Inbound stage: log, invalidate on 401, decode the body.
    async fn inspect(
        &self,
        method: &Method,
        path: &str,
        response: Response,
    ) -> Result<Value, GatewayError> {
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                let error = GatewayError::from_reqwest(&err);
                tracing::error!(
                    target_path = path,
                    method = %method,
                    status = status.as_u16(),
                    message = %error.message,
                    "API error"
                );
                return Err(error);
            }
        };

        if status.is_success() {
            tracing::debug!(target_path = path, method = %method, status = status.as_u16(), "API response");
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
        }

        let error = GatewayError::http_status(status.as_u16(), &text);
        tracing::error!(
            target_path = path,
            method = %method,
            status = status.as_u16(),
            body = %text,
            message = %error.message,
            "API error"
        );

        if status.as_u16() == UNAUTHORIZED {
            self.invalidate(status.as_u16(), path);
        }

        Err(error)
    }

    /// Global invalidation: clear both entries, then tell the host once.
    fn invalidate(&self, status: u16, path: &str) {
        if let Err(err) = self.storage.clear_session() {
            tracing::warn!(error = %err, "failed to clear stored session");
        }

        tracing::info!(target_path = path, redirect_to = %self.login_route, "session invalidated");

        let Some(events) = &self.events else {
            return;
        };
        let event = SessionEvent::Invalidated {
            status,
            target: path.to_string(),
            redirect_to: self.login_route.clone(),
        };
        if let Err(err) = events.try_send(event) {
            tracing::warn!(error = %err, "session event dropped");
        }
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, GatewayError> {
    serde_json::to_value(body)
        .map_err(|err| GatewayError::parse(format!("failed to encode request body: {err}")))
}
