//! Temporary credential broker.
//!
//! Issues random access keys with a fixed lifetime, either bound to an id
//! token the [`TokenVerifier`] vouches for or, when the identity pool allows
//! unauthenticated identities, to a guest. Issued keys are kept so content
//! listers can resolve them through [`CredentialRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use secret_string::SecretString;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{CredentialBroker, CredentialRegistry, Credentials, LoginBinding, TokenVerifier};
use crate::constants::{
    DEFAULT_CREDENTIAL_LIFETIME, SECRET_ACCESS_KEY_LENGTH, SECRET_CHARS, TEMP_ACCESS_KEY_LENGTH,
};
use crate::error::CredentialError;
use crate::identity::IdentityAssertion;

/// A credential as the broker remembers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub identity_id: String,
    pub secret_access_key: SecretString,
    pub expires_at: DateTime<Utc>,
    pub binding: LoginBinding,
}

impl IssuedCredential {
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Generate temporary credentials
/// Returns (access_key_id, secret_access_key)
pub fn generate_temp_credentials() -> (String, String) {
    let mut rng = rand::rng();

    // Access key ids always start with a letter
    let first = char::from(b'A' + rng.random_range(0..26u8));
    let access_key_id: String = std::iter::once(first)
        .chain(
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(TEMP_ACCESS_KEY_LENGTH - 1)
                .map(char::from),
        )
        .collect();

    let secret_access_key: String = (0..SECRET_ACCESS_KEY_LENGTH)
        .map(|_| SECRET_CHARS[rng.random_range(0..SECRET_CHARS.len())] as char)
        .collect();

    (access_key_id, secret_access_key)
}

pub struct TemporaryCredentialBroker<V> {
    verifier: Arc<V>,
    identity_pool_id: String,
    provider: String,
    allow_guest: bool,
    lifetime: Duration,
    issued: RwLock<HashMap<String, IssuedCredential>>,
}

impl<V: TokenVerifier> TemporaryCredentialBroker<V> {
    pub fn new(verifier: Arc<V>, identity_pool_id: &str, provider: &str) -> Self {
        Self {
            verifier,
            identity_pool_id: identity_pool_id.to_string(),
            provider: provider.to_string(),
            allow_guest: true,
            lifetime: *DEFAULT_CREDENTIAL_LIFETIME,
            issued: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_guest_access(mut self, allow_guest: bool) -> Self {
        self.allow_guest = allow_guest;
        self
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Number of issued credentials that have not expired yet.
    pub async fn live_count(&self) -> usize {
        self.issued
            .read()
            .await
            .values()
            .filter(|c| c.is_live())
            .count()
    }

    /// Withdraw an issued credential before it expires.
    pub async fn revoke(&self, access_key_id: &str) -> bool {
        let removed = self.issued.write().await.remove(access_key_id).is_some();
        if removed {
            info!(access_key_id = %access_key_id, "Revoked temporary credentials");
        }
        removed
    }

    fn identity_id_for(&self, binding: &LoginBinding) -> String {
        match binding {
            LoginBinding::Identity { username, .. } => {
                let mut hasher = Sha256::new();
                hasher.update(self.identity_pool_id.as_bytes());
                hasher.update(username.as_bytes());
                let digest = format!("{:x}", hasher.finalize());
                format!("{}:{}", self.identity_pool_id, &digest[..32])
            }
            LoginBinding::Guest => {
                let suffix: String = rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(32)
                    .map(char::from)
                    .collect();
                format!("{}:{}", self.identity_pool_id, suffix.to_lowercase())
            }
        }
    }

    async fn resolve_binding(
        &self,
        assertion: Option<IdentityAssertion>,
    ) -> Result<LoginBinding, CredentialError> {
        let Some(assertion) = assertion else {
            if !self.allow_guest {
                warn!(identity_pool = %self.identity_pool_id, "Guest credentials requested but unauthenticated access is disabled");
                return Err(CredentialError::GuestAccessDisabled);
            }
            return Ok(LoginBinding::Guest);
        };

        if assertion.provider != self.provider {
            warn!(provider = %assertion.provider, expected = %self.provider, "Assertion from unknown provider");
            return Err(CredentialError::InvalidAssertion(format!(
                "unknown provider '{}'",
                assertion.provider
            )));
        }

        match self.verifier.verify_token(assertion.token.expose()).await {
            Some(subject) if subject == assertion.subject => Ok(LoginBinding::from(&assertion)),
            Some(subject) => {
                warn!(claimed = %assertion.subject, actual = %subject, "Assertion subject mismatch");
                Err(CredentialError::InvalidAssertion(
                    "token subject does not match".to_string(),
                ))
            }
            None => Err(CredentialError::InvalidAssertion(
                "token expired or revoked".to_string(),
            )),
        }
    }
}

impl<V: TokenVerifier> CredentialBroker for TemporaryCredentialBroker<V> {
    async fn exchange(
        &self,
        binding: Option<IdentityAssertion>,
    ) -> Result<Credentials, CredentialError> {
        let binding = self.resolve_binding(binding).await?;
        let identity_id = self.identity_id_for(&binding);
        let (access_key_id, secret_access_key) = generate_temp_credentials();
        let expires_at = Utc::now()
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| CredentialError::Exchange("credential lifetime out of range".to_string()))?;

        let credentials = Credentials {
            identity_id: identity_id.clone(),
            access_key_id: access_key_id.clone(),
            secret_access_key: SecretString::new(secret_access_key),
            expires_at,
            binding,
        };

        let mut issued = self.issued.write().await;
        let before = issued.len();
        issued.retain(|_, c| c.is_live());
        if issued.len() != before {
            debug!(
                removed = before - issued.len(),
                "Dropped expired temporary credentials"
            );
        }
        issued.insert(
            access_key_id.clone(),
            IssuedCredential {
                identity_id: identity_id.clone(),
                secret_access_key: credentials.secret_access_key.clone(),
                expires_at,
                binding: credentials.binding.clone(),
            },
        );

        info!(
            access_key_id = %access_key_id,
            identity_id = %identity_id,
            guest = credentials.binding.is_guest(),
            expires_at = %expires_at,
            "Issued temporary credentials"
        );
        Ok(credentials)
    }
}

impl<V: TokenVerifier> CredentialRegistry for TemporaryCredentialBroker<V> {
    async fn resolve(&self, access_key_id: &str) -> Option<IssuedCredential> {
        self.issued
            .read()
            .await
            .get(access_key_id)
            .filter(|c| c.is_live())
            .cloned()
    }
}
