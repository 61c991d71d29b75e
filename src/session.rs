//! Session lifecycle state machine.
//!
//! [`SessionController`] owns the single credentials slot and serialises every
//! state-changing action. The [`AuthState`] is never stored on its own; it is
//! read off the slot, which is replaced wholesale on each transition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secret_string::SecretString;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::broker::{CredentialBroker, Credentials};
use crate::error::{CredentialError, IdentityError, SessionError};
use crate::identity::{IdentityAssertion, IdentityService, Session, UserAttribute};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

const MISSING_CREDENTIALS: &str = "Please enter email and password.";
const MISSING_CONFIRMATION: &str = "Please enter email and confirmation code.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    Unauthenticated,
    PendingConfirmation,
    Authenticated,
    Guest,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::Unauthenticated => f.write_str("unauthenticated"),
            AuthState::PendingConfirmation => f.write_str("pending confirmation"),
            AuthState::Authenticated => f.write_str("authenticated"),
            AuthState::Guest => f.write_str("guest"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    credentials: Option<Credentials>,
    /// Email of a signup waiting for its confirmation code.
    pending_confirmation: Option<String>,
}

impl Slot {
    fn empty() -> Self {
        Self::default()
    }

    fn pending(email: &str) -> Self {
        Self {
            credentials: None,
            pending_confirmation: Some(email.to_string()),
        }
    }

    fn holding(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            pending_confirmation: None,
        }
    }

    fn state(&self) -> AuthState {
        match (&self.credentials, &self.pending_confirmation) {
            (Some(c), _) if c.binding.is_guest() => AuthState::Guest,
            (Some(_), _) => AuthState::Authenticated,
            (None, Some(_)) => AuthState::PendingConfirmation,
            (None, None) => AuthState::Unauthenticated,
        }
    }
}

fn require(fields: &[&str], message: &str) -> Result<(), SessionError> {
    if fields.iter().any(|f| f.is_empty()) {
        return Err(SessionError::Validation(message.to_string()));
    }
    Ok(())
}

pub struct SessionController<I, B> {
    identity: Arc<I>,
    broker: Arc<B>,
    slot: RwLock<Slot>,
    in_flight: Mutex<()>,
    remote_timeout: Duration,
}

impl<I: IdentityService, B: CredentialBroker> SessionController<I, B> {
    pub fn new(identity: Arc<I>, broker: Arc<B>) -> Self {
        Self {
            identity,
            broker,
            slot: RwLock::new(Slot::empty()),
            in_flight: Mutex::new(()),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    pub async fn state(&self) -> AuthState {
        self.slot.read().await.state()
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.slot.read().await.credentials.clone()
    }

    /// Username the active credentials are bound to, if any.
    pub async fn username(&self) -> Option<String> {
        self.slot
            .read()
            .await
            .credentials
            .as_ref()
            .and_then(|c| c.binding.username().map(str::to_string))
    }

    pub async fn pending_confirmation(&self) -> Option<String> {
        self.slot.read().await.pending_confirmation.clone()
    }

    /// Claim the transition guard, failing fast if another action holds it.
    fn begin(&self) -> Result<MutexGuard<'_, ()>, SessionError> {
        self.in_flight.try_lock().map_err(|_| {
            debug!("Rejected overlapping state change");
            SessionError::TransitionInProgress
        })
    }

    async fn replace(&self, next: Slot) -> AuthState {
        let mut slot = self.slot.write().await;
        let from = slot.state();
        *slot = next;
        let to = slot.state();
        if from != to {
            info!(from = %from, to = %to, "Session state transition");
        } else {
            debug!(state = %to, "Session state re-entered");
        }
        to
    }

    async fn ensure_state(
        &self,
        action: &'static str,
        allowed: &[AuthState],
    ) -> Result<(), SessionError> {
        let from = self.state().await;
        if !allowed.contains(&from) {
            return Err(SessionError::InvalidTransition { from, action });
        }
        Ok(())
    }

    async fn identity_call<T>(
        &self,
        call: impl Future<Output = Result<T, IdentityError>>,
    ) -> Result<T, IdentityError> {
        tokio::time::timeout(self.remote_timeout, call)
            .await
            .unwrap_or_else(|_| {
                error!(timeout = ?self.remote_timeout, "Identity provider call timed out");
                Err(IdentityError::Timeout)
            })
    }

    async fn current_session(&self) -> Option<Session> {
        match tokio::time::timeout(self.remote_timeout, self.identity.current_session()).await {
            Ok(session) => session.filter(Session::is_valid),
            Err(_) => {
                warn!(timeout = ?self.remote_timeout, "Current session lookup timed out, treating as signed out");
                None
            }
        }
    }

    async fn sign_out(&self) {
        if tokio::time::timeout(self.remote_timeout, self.identity.sign_out())
            .await
            .is_err()
        {
            warn!(timeout = ?self.remote_timeout, "Identity sign-out timed out");
        }
    }

    async fn exchange(
        &self,
        request: Option<IdentityAssertion>,
    ) -> Result<Credentials, CredentialError> {
        let guest = request.is_none();
        let credentials =
            match tokio::time::timeout(self.remote_timeout, self.broker.exchange(request.clone()))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    error!(timeout = ?self.remote_timeout, guest, "Credential exchange timed out");
                    return Err(CredentialError::Timeout);
                }
            };
        if credentials.access_key_id.is_empty()
            || !credentials.binding.matches_request(request.as_ref())
        {
            error!(guest, "Broker returned credentials for a different login");
            return Err(CredentialError::BindingMismatch);
        }
        Ok(credentials)
    }

    /// Sign the identity out and drop every credential.
    async fn teardown(&self) -> AuthState {
        self.sign_out().await;
        self.replace(Slot::empty()).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthState, SessionError> {
        require(&[email, password.expose()], MISSING_CREDENTIALS)?;
        let _guard = self.begin()?;
        self.ensure_state(
            "sign up",
            &[AuthState::Unauthenticated, AuthState::PendingConfirmation],
        )
        .await?;

        let attributes = [UserAttribute::email(email)];
        let handle = self
            .identity_call(self.identity.sign_up(email, password, &attributes))
            .await
            .inspect_err(|err| error!(username = %email, error = %err, "Signup error"))?;
        debug!(username = %handle.username, confirmed = handle.confirmed, "User signed up");

        Ok(self.replace(Slot::pending(&handle.username)).await)
    }

    pub async fn confirm(&self, email: &str, code: &str) -> Result<AuthState, SessionError> {
        require(&[email, code], MISSING_CONFIRMATION)?;
        let _guard = self.begin()?;
        self.ensure_state(
            "confirm an account",
            &[AuthState::Unauthenticated, AuthState::PendingConfirmation],
        )
        .await?;

        self.identity_call(self.identity.confirm(email, code))
            .await
            .inspect_err(|err| error!(username = %email, error = %err, "Confirmation error"))?;
        info!(username = %email, "Account confirmed");

        Ok(self.replace(Slot::empty()).await)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthState, SessionError> {
        require(&[email, password.expose()], MISSING_CREDENTIALS)?;
        let _guard = self.begin()?;
        self.ensure_state(
            "log in",
            &[AuthState::Unauthenticated, AuthState::PendingConfirmation],
        )
        .await?;

        let session = match self
            .identity_call(self.identity.authenticate(email, password))
            .await
        {
            Ok(session) => session,
            Err(err) => {
                error!(username = %email, error = %err, "Login error");
                self.teardown().await;
                return Err(err.into());
            }
        };

        let assertion = session.assertion(self.identity.provider_name());
        match self.exchange(Some(assertion)).await {
            Ok(credentials) => {
                info!(username = %session.username, "Authenticated credentials obtained");
                Ok(self.replace(Slot::holding(credentials)).await)
            }
            Err(err) => {
                error!(username = %email, error = %err, "Login credential exchange failed");
                self.teardown().await;
                Err(err.into())
            }
        }
    }

    pub async fn guest_login(&self) -> Result<AuthState, SessionError> {
        let _guard = self.begin()?;
        debug!("Attempting guest login");
        self.teardown().await;

        match self.exchange(None).await {
            Ok(credentials) => Ok(self.replace(Slot::holding(credentials)).await),
            Err(err) => {
                error!(error = %err, "Guest login failed");
                Err(err.into())
            }
        }
    }

    pub async fn logout(&self) -> Result<AuthState, SessionError> {
        let _guard = self.begin()?;
        let state = self.teardown().await;
        info!("Logged out");
        Ok(state)
    }

    /// Page-load check: settle on whatever the identity provider still vouches for.
    pub async fn resume(&self) -> Result<AuthState, SessionError> {
        let _guard = self.begin()?;
        self.refresh().await
    }

    /// Active credentials, refreshed first when missing, expired or bound to
    /// something other than the current session.
    pub async fn ensure_credentials(&self) -> Result<Credentials, SessionError> {
        let _guard = self.begin()?;
        self.refresh().await?;
        self.credentials()
            .await
            .ok_or_else(|| SessionError::Credential("No credentials available".to_string()))
    }

    /// Storage refused the active credentials; treat the session as gone.
    ///
    /// Waits for any in-flight action instead of being rejected.
    pub async fn access_denied(&self, reason: &str) -> AuthState {
        let _guard = self.in_flight.lock().await;
        warn!(reason = %reason, "Access denied, discarding session and credentials");
        self.teardown().await
    }

    /// Refresh policy. Caller holds the transition guard.
    async fn refresh(&self) -> Result<AuthState, SessionError> {
        let current = self.credentials().await;

        match self.current_session().await {
            Some(session) => {
                if let Some(credentials) =
                    current.filter(|c| c.is_fresh() && c.binding.matches_session(&session))
                {
                    debug!(username = %session.username, "Authenticated credentials still fresh");
                    return Ok(self.replace(Slot::holding(credentials)).await);
                }

                let assertion = session.assertion(self.identity.provider_name());
                match self.exchange(Some(assertion)).await {
                    Ok(credentials) => {
                        info!(username = %session.username, "Authenticated credentials refreshed");
                        Ok(self.replace(Slot::holding(credentials)).await)
                    }
                    Err(err) => {
                        error!(username = %session.username, error = %err, "Error refreshing authenticated credentials");
                        self.teardown().await;
                        Err(err.into())
                    }
                }
            }
            None => {
                if let Some(credentials) =
                    current.filter(|c| c.is_fresh() && c.binding.is_guest())
                {
                    debug!("Guest credentials still fresh");
                    return Ok(self.replace(Slot::holding(credentials)).await);
                }

                debug!("No identity session, requesting guest credentials");
                match self.exchange(None).await {
                    Ok(credentials) => {
                        info!("Guest credentials obtained");
                        Ok(self.replace(Slot::holding(credentials)).await)
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to get any credentials");
                        self.replace(Slot::empty()).await;
                        Err(err.into())
                    }
                }
            }
        }
    }
}
