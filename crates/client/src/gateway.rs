//! Remote call gateway.
//!
//! Every backend call goes through [`Gateway::call`] and comes back as one
//! [`Envelope`]. Transport failures are folded into the envelope with status
//! `0`, so callers only ever inspect `success` and `status`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::session::Session;

/// Fields checked, in order, for an error message in a rejection body.
const FIELD_ERROR_KEYS: &[&str] = &["password", "username", "email", "non_field_errors"];

// =============================================================================
// Endpoints
// =============================================================================

/// One of the four independently hosted backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Auth,
    Catalog,
    Cart,
    Orders,
}

/// Base URLs of the backend domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: Url,
    pub catalog: Url,
    pub cart: Url,
    pub orders: Url,
}

impl Endpoints {
    /// All four domains served from a single base URL.
    #[must_use]
    pub fn uniform(base: &Url) -> Self {
        Self {
            auth: base.clone(),
            catalog: base.clone(),
            cart: base.clone(),
            orders: base.clone(),
        }
    }

    /// Base URL for `domain`.
    #[must_use]
    pub const fn base(&self, domain: Domain) -> &Url {
        match domain {
            Domain::Auth => &self.auth,
            Domain::Catalog => &self.catalog,
            Domain::Cart => &self.cart,
            Domain::Orders => &self.orders,
        }
    }

    /// Absolute URL for `path` on `domain`, keeping any base path prefix.
    #[must_use]
    pub fn resolve(&self, domain: Domain, path: &str) -> String {
        format!(
            "{}/{}",
            self.base(domain).as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Uniform result of a backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// HTTP status, or `0` when no response arrived.
    pub status: u16,
    /// Whether the status was 2xx.
    pub success: bool,
    /// Parsed response body (`null` for empty bodies).
    pub data: Value,
}

impl Envelope {
    /// Synthetic status used for transport failures.
    pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

    /// Envelope for a request that never got a response.
    #[must_use]
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: Self::TRANSPORT_FAILURE_STATUS,
            success: false,
            data: serde_json::json!({ "error": message.into() }),
        }
    }

    /// Whether this envelope represents a transport failure.
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        self.status == Self::TRANSPORT_FAILURE_STATUS
    }

    /// Error text carried in the body, if any.
    ///
    /// Looks at `error`, then `detail`, then the first message of the
    /// `password`, `username`, `email` and `non_field_errors` fields.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        if let Value::String(s) = &self.data {
            return non_blank(s);
        }

        let Value::Object(map) = &self.data else {
            return None;
        };

        ["error", "detail"]
            .iter()
            .chain(FIELD_ERROR_KEYS)
            .find_map(|key| map.get(*key).and_then(first_message))
    }

    /// Decode the body as `T`, or convert a failure into an error.
    ///
    /// # Errors
    ///
    /// Returns the classified error for a failed call, or
    /// `ClientError::Decode` if the body does not match `T`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if !self.success {
            return Err(self.into_error());
        }
        serde_json::from_value(self.data).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Discard the body of a successful call.
    ///
    /// # Errors
    ///
    /// Returns the classified error for a failed call.
    pub fn into_unit(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    /// Classify a failed call.
    #[must_use]
    pub fn into_error(self) -> ClientError {
        let message = self.error_message();
        match self.status {
            Self::TRANSPORT_FAILURE_STATUS => {
                ClientError::Transport(message.unwrap_or_else(|| "no response".to_string()))
            }
            401 => ClientError::Unauthorized,
            403 => ClientError::Forbidden(message.unwrap_or_else(|| {
                "You do not have permission to perform this action".to_string()
            })),
            status => ClientError::Rejected { status, message },
        }
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn first_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Array(items) => items.iter().find_map(first_message),
        _ => None,
    }
}

/// Parse a response body; empty is `null`, non-JSON becomes `{"error": text}`.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "error": text.trim() }))
}

// =============================================================================
// ApiRequest
// =============================================================================

/// A backend request description.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    domain: Domain,
    path: String,
    authenticated: bool,
    body: Option<Value>,
    query: Vec<(String, String)>,
}

impl ApiRequest {
    fn new(method: Method, domain: Domain, path: impl Into<String>) -> Self {
        Self {
            method,
            domain,
            path: path.into(),
            authenticated: false,
            body: None,
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(domain: Domain, path: impl Into<String>) -> Self {
        Self::new(Method::GET, domain, path)
    }

    #[must_use]
    pub fn post(domain: Domain, path: impl Into<String>) -> Self {
        Self::new(Method::POST, domain, path)
    }

    #[must_use]
    pub fn put(domain: Domain, path: impl Into<String>) -> Self {
        Self::new(Method::PUT, domain, path)
    }

    #[must_use]
    pub fn delete(domain: Domain, path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, domain, path)
    }

    /// Attach the session credential, when one is held.
    #[must_use]
    pub const fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Decode` if `body` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Decode(format!("failed to encode request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// HTTP gateway to the backend domains.
///
/// Cheaply cloneable; clones share the connection pool and the session.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    client: reqwest::Client,
    endpoints: Endpoints,
    session: Session,
}

impl Gateway {
    /// Create a gateway.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(endpoints: Endpoints, session: Session, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(GatewayInner {
                client,
                endpoints,
                session,
            }),
        })
    }

    /// Session whose credential is attached to authenticated requests.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    /// Fail fast when no credential is held.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` when signed out.
    pub fn require_credential(&self) -> Result<()> {
        if self.inner.session.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::Unauthorized)
        }
    }

    /// Perform a request. Never fails; see [`Envelope`].
    ///
    /// A 401 on a request that carried a credential clears the session.
    #[instrument(
        skip(self, request),
        fields(
            method = %request.method,
            domain = ?request.domain,
            path = %request.path,
            request_id = tracing::field::Empty,
        )
    )]
    pub async fn call(&self, request: ApiRequest) -> Envelope {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let url = self.inner.endpoints.resolve(request.domain, &request.path);
        let mut builder = self
            .inner
            .client
            .request(request.method, &url)
            .header("X-Request-Id", request_id.to_string());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let credential = if request.authenticated {
            self.inner.session.credential()
        } else {
            None
        };
        if let Some(credential) = &credential {
            builder = builder.header(AUTHORIZATION, format!("Token {}", credential.expose()));
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Backend request failed without a response");
                return Envelope::transport_failure(e.to_string());
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, status = %status, "Failed to read backend response body");
                return Envelope::transport_failure(e.to_string());
            }
        };

        if status == StatusCode::UNAUTHORIZED && credential.is_some() {
            tracing::warn!("Credential rejected by backend, signing out");
            self.inner.session.clear();
        }

        if status.is_success() {
            tracing::debug!(status = %status, "Backend call succeeded");
        } else {
            tracing::warn!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
        }

        Envelope {
            status: status.as_u16(),
            success: status.is_success(),
            data: parse_body(&text),
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("endpoints", &self.inner.endpoints)
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}
