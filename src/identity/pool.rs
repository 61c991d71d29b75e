//! In-process user pool.
//!
//! Holds users with argon2 password hashes, issues confirmation codes at
//! signup and time-bound id tokens at login. The pool remembers the last
//! authenticated user, which is what [`IdentityService::current_session`]
//! reports back after a restart of the front-end.

use std::collections::HashMap;
use std::path::Path;

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use secret_string::SecretString;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{IdentityService, Session, UserAttribute, UserHandle};
use crate::broker::TokenVerifier;
use crate::constants::{
    CONFIRMATION_CODE_LENGTH, ID_TOKEN_LENGTH, ID_TOKEN_LIFETIME, MIN_PASSWORD_LENGTH,
};
use crate::error::{IdentityError, TierGateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Unconfirmed,
    #[default]
    Confirmed,
    /// Password was set by an administrator and must be replaced before use.
    ForceChangePassword,
}

/// One entry of the users seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub email: String,
    pub password: SecretString,
    #[serde(default)]
    pub status: UserStatus,
}

struct UserRecord {
    password_hash: String,
    attributes: Vec<UserAttribute>,
    status: UserStatus,
    confirmation_code: Option<String>,
}

struct IssuedToken {
    username: String,
    expires_at: DateTime<Utc>,
}

pub struct LocalUserPool {
    provider: String,
    token_lifetime: Duration,
    users: RwLock<HashMap<String, UserRecord>>,
    tokens: RwLock<HashMap<String, IssuedToken>>,
    current: RwLock<Option<Session>>,
}

fn hash_password(password: &SecretString) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.expose().as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(expected_hash: &str, candidate: &SecretString) -> bool {
    match PasswordHash::new(expected_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.expose().as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            error!(error = %err, "Stored password hash is invalid");
            false
        }
    }
}

fn generate_confirmation_code() -> String {
    let mut rng = rand::rng();
    (0..CONFIRMATION_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn generate_id_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ID_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

impl LocalUserPool {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            token_lifetime: *ID_TOKEN_LIFETIME,
            users: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
        }
    }

    pub fn with_token_lifetime(mut self, token_lifetime: Duration) -> Self {
        self.token_lifetime = token_lifetime;
        self
    }

    /// Create a pool and load users from a JSON seed file.
    ///
    /// A missing file is not an error, the pool just starts empty.
    pub async fn from_seed_file(
        provider: impl Into<String>,
        seed_file: &Path,
    ) -> Result<Self, TierGateError> {
        let pool = Self::new(provider);

        info!(seed_file = ?seed_file, "Loading users");
        if !seed_file.exists() {
            warn!(seed_file = ?seed_file, "Users seed file does not exist, starting with no users");
            return Ok(pool);
        }
        if !seed_file.is_file() {
            error!(seed_file = ?seed_file, "Users seed path is not a file");
            return Err(TierGateError::Configuration(format!(
                "Users seed path {} is not a file",
                seed_file.display()
            )));
        }

        let contents = tokio::fs::read_to_string(seed_file).await?;
        let seed: Vec<SeedUser> = serde_json::from_str(&contents)?;
        for user in seed {
            pool.insert_user(&user.email, &user.password, user.status)
                .await?;
        }
        info!(loaded_users_count = pool.user_count().await);
        Ok(pool)
    }

    /// Add a user directly, bypassing signup and confirmation.
    pub async fn insert_user(
        &self,
        email: &str,
        password: &SecretString,
        status: UserStatus,
    ) -> Result<(), TierGateError> {
        let password_hash = hash_password(password)?;
        self.users.write().await.insert(
            email.to_string(),
            UserRecord {
                password_hash,
                attributes: vec![UserAttribute::email(email)],
                status,
                confirmation_code: None,
            },
        );
        debug!(username = %email, status = ?status, "Inserted user");
        Ok(())
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn user_status(&self, email: &str) -> Option<UserStatus> {
        self.users.read().await.get(email).map(|u| u.status)
    }

    pub async fn user_attributes(&self, email: &str) -> Option<Vec<UserAttribute>> {
        self.users
            .read()
            .await
            .get(email)
            .map(|u| u.attributes.clone())
    }

    /// Local delivery channel for confirmation codes, standing in for email.
    pub async fn confirmation_code(&self, email: &str) -> Option<String> {
        self.users
            .read()
            .await
            .get(email)
            .and_then(|u| u.confirmation_code.clone())
    }

    async fn issue_session(&self, username: &str) -> Session {
        let token = generate_id_token();
        let expires_at = Utc::now() + self.token_lifetime;

        let mut tokens = self.tokens.write().await;
        let now = Utc::now();
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(
            token.clone(),
            IssuedToken {
                username: username.to_string(),
                expires_at,
            },
        );
        drop(tokens);

        let session = Session {
            username: username.to_string(),
            id_token: SecretString::new(token),
            expires_at,
        };
        let previous = self.current.write().await.replace(session.clone());
        if let Some(previous) = previous {
            self.tokens
                .write()
                .await
                .remove(previous.id_token.expose());
            debug!(username = %previous.username, "Replaced previous session");
        }
        session
    }
}

impl IdentityService for LocalUserPool {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        attributes: &[UserAttribute],
    ) -> Result<UserHandle, IdentityError> {
        if !email.contains('@') {
            return Err(IdentityError::Provider(
                "Invalid email address format.".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(IdentityError::Provider(
                "Password did not conform with policy: Password not long enough".to_string(),
            ));
        }
        if self.users.read().await.contains_key(email) {
            return Err(IdentityError::Provider(
                "An account with the given email already exists.".to_string(),
            ));
        }

        let password_hash = hash_password(password).map_err(|err| {
            error!(error = %err, "Failed to hash password");
            IdentityError::Provider(format!("Failed to store password: {}", err))
        })?;
        let code = generate_confirmation_code();

        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(IdentityError::Provider(
                "An account with the given email already exists.".to_string(),
            ));
        }
        users.insert(
            email.to_string(),
            UserRecord {
                password_hash,
                attributes: attributes.to_vec(),
                status: UserStatus::Unconfirmed,
                confirmation_code: Some(code.clone()),
            },
        );
        info!(username = %email, "User signed up, confirmation code issued");
        debug!(username = %email, confirmation_code = %code, "Local delivery of confirmation code");

        Ok(UserHandle {
            username: email.to_string(),
            confirmed: false,
        })
    }

    async fn confirm(&self, email: &str, code: &str) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(email).ok_or_else(|| {
            IdentityError::Provider("Username/client id combination not found.".to_string())
        })?;

        if user.status != UserStatus::Unconfirmed {
            return Err(IdentityError::Provider(
                "User cannot be confirmed. Current status is CONFIRMED".to_string(),
            ));
        }

        let matches = user
            .confirmation_code
            .as_deref()
            .is_some_and(|expected| SecretString::new(expected).ct_eq(code));
        if !matches {
            debug!(username = %email, "Confirmation code mismatch");
            return Err(IdentityError::Provider(
                "Invalid verification code provided, please try again.".to_string(),
            ));
        }

        user.status = UserStatus::Confirmed;
        user.confirmation_code = None;
        info!(username = %email, "User confirmed");
        Ok(())
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, IdentityError> {
        let status = {
            let users = self.users.read().await;
            match users.get(email) {
                Some(user) if verify_password(&user.password_hash, password) => user.status,
                _ => {
                    debug!(username = %email, "Authentication failed");
                    return Err(IdentityError::Provider(
                        "Incorrect username or password.".to_string(),
                    ));
                }
            }
        };

        match status {
            UserStatus::Unconfirmed => Err(IdentityError::Provider(
                "User is not confirmed.".to_string(),
            )),
            UserStatus::ForceChangePassword => {
                warn!(username = %email, "New password required");
                Err(IdentityError::NewPasswordRequired)
            }
            UserStatus::Confirmed => {
                let session = self.issue_session(email).await;
                info!(username = %email, expires_at = %session.expires_at, "User authenticated");
                Ok(session)
            }
        }
    }

    async fn current_session(&self) -> Option<Session> {
        let mut current = self.current.write().await;
        match current.as_ref() {
            Some(session) if session.is_valid() => Some(session.clone()),
            Some(session) => {
                debug!(username = %session.username, "Current session expired");
                *current = None;
                None
            }
            None => None,
        }
    }

    async fn sign_out(&self) {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            self.tokens.write().await.remove(session.id_token.expose());
            info!(username = %session.username, "User signed out");
        }
    }
}

impl TokenVerifier for LocalUserPool {
    async fn verify_token(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens
            .get(token)
            .filter(|t| t.expires_at > Utc::now())
            .map(|t| t.username.clone())
    }
}
