//! Session store: owns the authentication credential for one client session.
//!
//! A [`Session`] is created once and handed (cloned) to every component that
//! needs the credential. It is the only writer of the persisted token.

use std::sync::{Arc, PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};

use crate::storage::{ClientStorage, MemoryStorage, keys};

/// Opaque bearer token issued by the auth backend.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw token. Returns `None` for blank input.
    #[must_use]
    pub fn new(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(SecretString::from(token.to_string())))
        }
    }

    /// The raw token, for building the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Shared handle to the current credential.
///
/// Cheaply cloneable; all clones see the same credential.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    credential: RwLock<Option<Credential>>,
    storage: Arc<dyn ClientStorage>,
}

impl Session {
    /// Create a session backed by `storage`, restoring any persisted token.
    ///
    /// A storage read failure starts the session signed out.
    #[must_use]
    pub fn restore(storage: Arc<dyn ClientStorage>) -> Self {
        let credential = match storage.get(keys::TOKEN) {
            Ok(token) => token.as_deref().and_then(Credential::new),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored credential, starting signed out");
                None
            }
        };

        if credential.is_some() {
            tracing::debug!("Restored stored credential");
        }

        Self {
            inner: Arc::new(SessionInner {
                credential: RwLock::new(credential),
                storage,
            }),
        }
    }

    /// Create a signed-out session that persists nothing.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::restore(Arc::new(MemoryStorage::new()))
    }

    /// Whether a credential is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current credential, if any.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store a freshly issued credential.
    ///
    /// The in-memory credential is always replaced; a persistence failure is
    /// logged and the session continues for the lifetime of the process.
    pub fn set_credential(&self, credential: Credential) {
        if let Err(e) = self.inner.storage.set(keys::TOKEN, credential.expose()) {
            tracing::error!(error = %e, "Failed to persist credential");
        }
        *self
            .inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }

    /// Destroy the credential (logout or 401).
    pub fn clear(&self) {
        let previous = self
            .inner
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Err(e) = self.inner.storage.remove(keys::TOKEN) {
            tracing::error!(error = %e, "Failed to remove stored credential");
        }

        if previous.is_some() {
            tracing::info!("Session credential cleared");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
