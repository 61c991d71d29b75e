//! Credential broker seam
//!
//! A broker turns an identity assertion, or nothing at all for guests, into
//! short-lived storage credentials.

pub mod temporary;

pub use temporary::{IssuedCredential, TemporaryCredentialBroker, generate_temp_credentials};

use std::future::Future;

use chrono::{DateTime, Utc};
use secret_string::SecretString;

use crate::constants::CREDENTIAL_EXPIRY_SKEW;
use crate::error::CredentialError;
use crate::identity::{IdentityAssertion, Session};

/// Who a set of credentials was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginBinding {
    Guest,
    Identity {
        username: String,
        token: SecretString,
    },
}

impl LoginBinding {
    pub fn is_guest(&self) -> bool {
        matches!(self, LoginBinding::Guest)
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            LoginBinding::Guest => None,
            LoginBinding::Identity { username, .. } => Some(username),
        }
    }

    /// True when these credentials were issued for exactly this session's token.
    pub fn matches_session(&self, session: &Session) -> bool {
        match self {
            LoginBinding::Guest => false,
            LoginBinding::Identity { username, token } => {
                username == &session.username && token == &session.id_token
            }
        }
    }

    /// True when these credentials answer the given exchange request.
    pub fn matches_request(&self, request: Option<&IdentityAssertion>) -> bool {
        match (self, request) {
            (LoginBinding::Guest, None) => true,
            (LoginBinding::Identity { username, token }, Some(assertion)) => {
                username == &assertion.subject && token == &assertion.token
            }
            _ => false,
        }
    }
}

impl From<&IdentityAssertion> for LoginBinding {
    fn from(assertion: &IdentityAssertion) -> Self {
        LoginBinding::Identity {
            username: assertion.subject.clone(),
            token: assertion.token.clone(),
        }
    }
}

/// Short-lived storage credentials. Never mutated once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity_id: String,
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub expires_at: DateTime<Utc>,
    pub binding: LoginBinding,
}

impl Credentials {
    /// Usable for at least the expiry skew from now.
    pub fn is_fresh(&self) -> bool {
        !self.access_key_id.is_empty() && self.expires_at - *CREDENTIAL_EXPIRY_SKEW > Utc::now()
    }
}

pub trait CredentialBroker: Send + Sync {
    fn exchange(
        &self,
        binding: Option<IdentityAssertion>,
    ) -> impl Future<Output = Result<Credentials, CredentialError>> + Send;
}

/// Checks id tokens on behalf of a broker; returns the token's subject.
pub trait TokenVerifier: Send + Sync {
    fn verify_token(&self, token: &str) -> impl Future<Output = Option<String>> + Send;
}

/// Looks up live credentials by access key id.
pub trait CredentialRegistry: Send + Sync {
    fn resolve(
        &self,
        access_key_id: &str,
    ) -> impl Future<Output = Option<IssuedCredential>> + Send;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(username: &str, token: &str) -> Session {
        Session {
            username: username.to_string(),
            id_token: SecretString::new(token),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_binding_matches_only_its_own_session() {
        let binding = LoginBinding::Identity {
            username: "a@x.com".to_string(),
            token: SecretString::new("tok-1"),
        };
        assert!(binding.matches_session(&session("a@x.com", "tok-1")));
        assert!(!binding.matches_session(&session("a@x.com", "tok-2")));
        assert!(!binding.matches_session(&session("b@x.com", "tok-1")));
        assert!(!LoginBinding::Guest.matches_session(&session("a@x.com", "tok-1")));
    }

    #[test]
    fn test_binding_matches_request() {
        let assertion = session("a@x.com", "tok-1").assertion("idp.local/pool");
        assert!(LoginBinding::from(&assertion).matches_request(Some(&assertion)));
        assert!(LoginBinding::Guest.matches_request(None));
        assert!(!LoginBinding::Guest.matches_request(Some(&assertion)));
        assert!(!LoginBinding::from(&assertion).matches_request(None));
    }

    #[test]
    fn test_credentials_freshness() {
        let mut creds = Credentials {
            identity_id: "pool:guest".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: SecretString::new("secret"),
            expires_at: Utc::now() + Duration::hours(1),
            binding: LoginBinding::Guest,
        };
        assert!(creds.is_fresh());

        creds.expires_at = Utc::now() + Duration::seconds(5);
        assert!(!creds.is_fresh(), "inside the skew window counts as stale");

        creds.expires_at = Utc::now() + Duration::hours(1);
        creds.access_key_id = String::new();
        assert!(!creds.is_fresh(), "credentials without a key are never fresh");
    }
}
