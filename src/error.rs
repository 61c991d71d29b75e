//! Centralized error types for tiergate.
//!
//! Each collaborator seam has its own error enum; [`SessionError`] is what a
//! caller of a session transition sees, and [`TierGateError`] is what the
//! binary reports at its boundary.

use std::error::Error;
use std::path::PathBuf;

use serde::Serialize;

use crate::session::AuthState;

/// Failures reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IdentityError {
    /// The provider rejected the call; carries the provider's message.
    Provider(String),
    /// Credentials were correct but the account must set a new password first.
    NewPasswordRequired,
    /// The provider did not answer in time.
    Timeout,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Provider(msg) => f.write_str(msg),
            IdentityError::NewPasswordRequired => {
                f.write_str("New password required. Please reset your password.")
            }
            IdentityError::Timeout => f.write_str("Identity provider timed out"),
        }
    }
}

impl Error for IdentityError {}

/// Failures reported by a credential broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CredentialError {
    Exchange(String),
    GuestAccessDisabled,
    InvalidAssertion(String),
    /// The broker answered with credentials that do not match what was asked for.
    BindingMismatch,
    Timeout,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::Exchange(msg) => write!(f, "Credential exchange failed: {}", msg),
            CredentialError::GuestAccessDisabled => {
                f.write_str("Unauthenticated access is not supported for this identity pool")
            }
            CredentialError::InvalidAssertion(msg) => {
                write!(f, "Invalid login token: {}", msg)
            }
            CredentialError::BindingMismatch => {
                f.write_str("Issued credentials do not match the requested login")
            }
            CredentialError::Timeout => f.write_str("Credential broker timed out"),
        }
    }
}

impl Error for CredentialError {}

/// Failures reported by a content lister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ListError {
    /// The credentials are not (or no longer) allowed to read the prefix.
    AccessDenied(String),
    Other(String),
}

impl ListError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, ListError::AccessDenied(_))
    }
}

impl std::fmt::Display for ListError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListError::AccessDenied(msg) => write!(f, "Access Denied: {}", msg),
            ListError::Other(msg) => f.write_str(msg),
        }
    }
}

impl Error for ListError {}

impl From<std::io::Error> for ListError {
    fn from(err: std::io::Error) -> Self {
        ListError::Other(err.to_string())
    }
}

/// Errors surfaced by a session transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionError {
    /// A required field was empty; no remote call was made.
    Validation(String),
    Identity(String),
    NewPasswordRequired,
    Credential(String),
    AccessDenied(String),
    /// Another state-changing action has not settled yet.
    TransitionInProgress,
    InvalidTransition {
        from: AuthState,
        action: &'static str,
    },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Validation(msg) => f.write_str(msg),
            SessionError::Identity(msg) => f.write_str(msg),
            SessionError::NewPasswordRequired => {
                f.write_str("New password required. Please reset your password.")
            }
            SessionError::Credential(msg) => f.write_str(msg),
            SessionError::AccessDenied(msg) => write!(f, "Access Denied: {}", msg),
            SessionError::TransitionInProgress => {
                f.write_str("Another action is still in progress, please wait")
            }
            SessionError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} while {}", action, from)
            }
        }
    }
}

impl Error for SessionError {}

impl From<IdentityError> for SessionError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NewPasswordRequired => SessionError::NewPasswordRequired,
            other => SessionError::Identity(other.to_string()),
        }
    }
}

impl From<CredentialError> for SessionError {
    fn from(err: CredentialError) -> Self {
        SessionError::Credential(err.to_string())
    }
}

impl From<ListError> for SessionError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::AccessDenied(msg) => SessionError::AccessDenied(msg),
            ListError::Other(msg) => SessionError::Credential(msg),
        }
    }
}

#[derive(Debug)]
pub enum TierGateError {
    Configuration(String),
    FileNotFound(PathBuf),
    Io(std::io::Error),
    PasswordHash(String),
    SerdeJson(serde_json::Error),
    Session(SessionError),
    Other(String),
}

impl std::fmt::Display for TierGateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierGateError::Configuration(msg) => write!(f, "Configuration Error: {}", msg),
            TierGateError::FileNotFound(path) => {
                write!(f, "File not found: {}", path.display())
            }
            TierGateError::Io(e) => write!(f, "IO Error: {:?}", e),
            TierGateError::PasswordHash(msg) => write!(f, "Password Hash Error: {}", msg),
            TierGateError::SerdeJson(e) => write!(f, "Serde-JSON Error: {}", e),
            TierGateError::Session(e) => write!(f, "Session Error: {}", e),
            TierGateError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl Error for TierGateError {}

impl TierGateError {
    pub fn other(error: &impl ToString) -> Self {
        TierGateError::Other(error.to_string())
    }
}

impl From<std::io::Error> for TierGateError {
    fn from(err: std::io::Error) -> Self {
        TierGateError::Io(err)
    }
}

impl From<serde_json::Error> for TierGateError {
    fn from(err: serde_json::Error) -> Self {
        TierGateError::SerdeJson(err)
    }
}

impl From<SessionError> for TierGateError {
    fn from(err: SessionError) -> Self {
        TierGateError::Session(err)
    }
}

impl From<argon2::password_hash::Error> for TierGateError {
    fn from(err: argon2::password_hash::Error) -> Self {
        TierGateError::PasswordHash(err.to_string())
    }
}
