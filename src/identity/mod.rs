//! Identity provider seam
//!
//! The session controller only talks to an identity provider through
//! [`IdentityService`]. [`LocalUserPool`] is the in-process implementation.

pub mod pool;

pub use pool::LocalUserPool;

use std::future::Future;

use chrono::{DateTime, Utc};
use secret_string::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// A named attribute attached to a user at signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    pub name: String,
    pub value: String,
}

impl UserAttribute {
    pub fn email(value: &str) -> Self {
        Self {
            name: "email".to_string(),
            value: value.to_string(),
        }
    }
}

/// What the provider hands back after a signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserHandle {
    pub username: String,
    pub confirmed: bool,
}

/// An authenticated identity with a time-bound id token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub id_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }

    /// Build the assertion a credential broker needs to bind credentials to this session.
    pub fn assertion(&self, provider: &str) -> IdentityAssertion {
        IdentityAssertion {
            provider: provider.to_string(),
            subject: self.username.clone(),
            token: self.id_token.clone(),
        }
    }
}

/// Proof of identity presented to a credential broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityAssertion {
    /// Provider key, `idp.{region}/{user_pool_id}`.
    pub provider: String,
    pub subject: String,
    pub token: SecretString,
}

pub fn provider_key(region: &str, user_pool_id: &str) -> String {
    format!("idp.{}/{}", region, user_pool_id)
}

pub trait IdentityService: Send + Sync {
    /// Provider key used when building assertions.
    fn provider_name(&self) -> &str;

    fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        attributes: &[UserAttribute],
    ) -> impl Future<Output = Result<UserHandle, IdentityError>> + Send;

    fn confirm(
        &self,
        email: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<Session, IdentityError>> + Send;

    /// The last authenticated session, if the provider still considers it valid.
    fn current_session(&self) -> impl Future<Output = Option<Session>> + Send;

    fn sign_out(&self) -> impl Future<Output = ()> + Send;
}
