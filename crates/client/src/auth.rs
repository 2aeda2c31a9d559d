//! Auth domain: login, registration, logout and profile.
//!
//! Login and registration are the only places a credential enters the
//! [`Session`](crate::session::Session); logout is the only voluntary exit.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use bamazon_core::{UserId, Username};

use crate::error::{ClientError, Result, ValidationError};
use crate::gateway::{ApiRequest, Domain, Gateway};
use crate::session::Credential;

// =============================================================================
// Types
// =============================================================================

/// An account as returned by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

impl User {
    /// `first last`, trimmed; `None` when both are blank.
    #[must_use]
    pub fn full_name(&self) -> Option<String> {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Full name, falling back to the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.full_name().unwrap_or_else(|| self.username.clone())
    }
}

/// Minimal account view used for admin lookups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

/// Registration form input.
///
/// Implements `Debug` manually to redact passwords.
#[derive(Clone, Default, Serialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "password2")]
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
}

impl std::fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("password_confirm", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

impl RegistrationForm {
    /// Check the form locally and normalize the username.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for an invalid username, a blank password
    /// or mismatched passwords.
    pub fn validate(&self) -> std::result::Result<Username, ValidationError> {
        let username = Username::parse(&self.username)?;
        if self.password.is_empty() {
            return Err(ValidationError::Required("Password"));
        }
        if self.password != self.password_confirm {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(username)
    }
}

/// Partial profile update; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

// =============================================================================
// AuthClient
// =============================================================================

/// Client for the auth domain.
#[derive(Debug, Clone)]
pub struct AuthClient {
    gateway: Gateway,
}

impl AuthClient {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Whether the session holds a credential.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.gateway.session().is_authenticated()
    }

    /// Log in and store the issued credential.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank fields, or the backend's
    /// rejection (e.g., invalid credentials).
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::Required("Username").into());
        }
        if password.is_empty() {
            return Err(ValidationError::Required("Password").into());
        }

        let request = ApiRequest::post(Domain::Auth, "/api/auth/login/")
            .json(&LoginBody { username, password })?;
        let response: AuthResponse = self.gateway.call(request).await.into_result()?;

        self.store_credential(&response)?;
        tracing::info!(user_id = %response.user.id, "Logged in");
        Ok(response.user)
    }

    /// Register a new account and store the issued credential.
    ///
    /// # Errors
    ///
    /// Returns a validation error before dispatch, or the backend's rejection
    /// (e.g., username taken).
    #[instrument(skip(self, form), fields(username = %form.username))]
    pub async fn register(&self, form: &RegistrationForm) -> Result<User> {
        let username = form.validate()?;
        let mut body = form.clone();
        body.username = username.to_string();
        if body.email.trim().is_empty() {
            body.email = username.email_suggestion();
        }

        let request = ApiRequest::post(Domain::Auth, "/api/auth/register/").json(&body)?;
        let response: AuthResponse = self.gateway.call(request).await.into_result()?;

        self.store_credential(&response)?;
        tracing::info!(user_id = %response.user.id, "Registered");
        Ok(response.user)
    }

    /// Log out. The local credential is cleared even if the backend call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if self.gateway.session().is_authenticated() {
            let request = ApiRequest::post(Domain::Auth, "/api/auth/logout/").authenticated();
            let envelope = self.gateway.call(request).await;
            if !envelope.success {
                tracing::warn!(status = envelope.status, "Backend logout failed, clearing locally");
            }
        }
        self.gateway.session().clear();
    }

    /// Current user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` when signed out or the token expired.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<User> {
        self.gateway.require_credential()?;
        let request = ApiRequest::get(Domain::Auth, "/api/auth/profile/").authenticated();
        let envelope: UserEnvelope = self.gateway.call(request).await.into_result()?;
        Ok(envelope.user)
    }

    /// Update the current user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` when signed out, or the backend's
    /// field errors.
    #[instrument(skip(self))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        self.gateway.require_credential()?;
        let request = ApiRequest::put(Domain::Auth, "/api/auth/profile/update/")
            .authenticated()
            .json(update)?;
        let envelope: UserEnvelope = self.gateway.call(request).await.into_result()?;
        Ok(envelope.user)
    }

    /// Look up another account (staff, or the caller's own id).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for non-staff callers, or a rejection
    /// when the user does not exist.
    #[instrument(skip(self))]
    pub async fn user(&self, id: UserId) -> Result<UserSummary> {
        self.gateway.require_credential()?;
        let request = ApiRequest::get(Domain::Auth, format!("/api/users/{id}/")).authenticated();
        self.gateway.call(request).await.into_result()
    }

    fn store_credential(&self, response: &AuthResponse) -> Result<()> {
        let credential = Credential::new(&response.token)
            .ok_or_else(|| ClientError::Decode("auth response carried a blank token".to_string()))?;
        self.gateway.session().set_credential(credential);
        Ok(())
    }
}
