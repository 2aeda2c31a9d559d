//! Unified error handling for the client.
//!
//! Every failure maps onto one of four classes (see [`ErrorKind`]) and can be
//! turned into a user-facing message with [`ClientError::user_message`]. None
//! of them are fatal: callers show the message and keep their current state.

use thiserror::Error;

use bamazon_core::{OrderStatus, UsernameError};

use crate::geocode::GeocodeError;
use crate::storage::StorageError;

/// Input rejected before anything is sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Quantity input is not a whole number, or is negative.
    #[error("Invalid quantity")]
    InvalidQuantity(String),

    /// Unit price is negative.
    #[error("Invalid price")]
    InvalidPrice,

    /// A required form field is blank.
    #[error("{0} is required")]
    Required(&'static str),

    /// Registration username failed validation.
    #[error("{0}")]
    InvalidUsername(#[from] UsernameError),

    /// Registration password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Checkout submitted without a delivery name.
    #[error("Please enter your full name")]
    MissingDeliveryName,

    /// Checkout submitted without a delivery phone.
    #[error("Please enter your phone number")]
    MissingDeliveryPhone,

    /// Checkout submitted before an address was resolved.
    #[error("Please select a delivery address")]
    MissingDeliveryAddress,

    /// Cancel requested for an order whose status no longer allows it.
    #[error("Order cannot be cancelled while {0}")]
    NotCancellable(OrderStatus),
}

/// Error taxonomy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response reached the client. Retryable.
    Transport,
    /// Caught locally, never sent.
    Validation,
    /// Credential missing, expired or insufficient.
    Authorization,
    /// The backend understood and declined the request.
    Rejection,
    /// The client could not make sense of a response or its own storage.
    Internal,
}

/// Client-level error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response reached the client.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Input failed local validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No credential, or the backend answered 401.
    #[error("Unauthorized")]
    Unauthorized,

    /// Authenticated but not allowed (e.g., non-staff on an admin view).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Backend declined the request.
    #[error("Rejected ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error text from the response body, when present.
        message: Option<String>,
    },

    /// Response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local persisted storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Address lookup failed.
    #[error("Geocoding error: {0}")]
    Geocode(#[from] GeocodeError),

    /// A checkout submission is already in flight.
    #[error("Submission already in progress")]
    SubmissionInFlight,

    /// Command not valid in the current checkout state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ClientError {
    /// Taxonomy class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Geocode(GeocodeError::Transport(_)) => ErrorKind::Transport,
            Self::Validation(_) | Self::SubmissionInFlight | Self::InvalidState(_) => {
                ErrorKind::Validation
            }
            Self::Unauthorized | Self::Forbidden(_) => ErrorKind::Authorization,
            Self::Rejected { .. } | Self::Geocode(_) => ErrorKind::Rejection,
            Self::Decode(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller must send the user back to the login screen.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// User-facing message, using `"Request failed"` for bare rejections.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.message_or("Request failed")
    }

    /// User-facing message with an operation-specific fallback.
    ///
    /// Server error text is surfaced verbatim; internal details never are.
    #[must_use]
    pub fn message_or(&self, fallback: &str) -> String {
        match self {
            Self::Transport(_) | Self::Geocode(GeocodeError::Transport(_)) => {
                "Network error, please try again".to_string()
            }
            Self::Validation(err) => err.to_string(),
            Self::Unauthorized => "Your session has expired, please log in again".to_string(),
            Self::Forbidden(message) => message.clone(),
            Self::Rejected { message, .. } => message.clone().unwrap_or_else(|| fallback.to_string()),
            Self::Decode(_) | Self::Storage(_) => "Something went wrong, please try again".to_string(),
            Self::Geocode(err) => err.to_string(),
            Self::SubmissionInFlight => "Your order is already being placed".to_string(),
            Self::InvalidState(message) => message.clone(),
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_surfaces_server_message() {
        let err = ClientError::Rejected {
            status: 400,
            message: Some("Order cannot be cancelled".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::Rejection);
        assert_eq!(err.user_message(), "Order cannot be cancelled");
    }

    #[test]
    fn test_rejection_without_message_uses_fallback() {
        let err = ClientError::Rejected {
            status: 500,
            message: None,
        };
        assert_eq!(err.message_or("Failed to place order"), "Failed to place order");
        assert_eq!(err.to_string(), "Rejected (500): no details");
    }

    #[test]
    fn test_transport_is_generic() {
        let err = ClientError::Transport("connection refused (os error 111)".to_string());
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!err.user_message().contains("os error"));
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ClientError::Decode("missing field `items`".to_string());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.user_message().contains("items"));
    }

    #[test]
    fn test_unauthorized_requires_login() {
        assert!(ClientError::Unauthorized.requires_login());
        assert_eq!(ClientError::Unauthorized.kind(), ErrorKind::Authorization);
        assert!(!ClientError::SubmissionInFlight.requires_login());
    }

    #[test]
    fn test_validation_messages() {
        let err = ClientError::from(ValidationError::MissingDeliveryPhone);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.user_message(), "Please enter your phone number");

        let err = ClientError::from(ValidationError::NotCancellable(OrderStatus::Shipped));
        assert_eq!(err.user_message(), "Order cannot be cancelled while shipped");
    }
}
