use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use secret_string::SecretString;

use super::{MockBroker, MockIdentity, controller};
use crate::error::{IdentityError, SessionError};
use crate::session::AuthState;

const EMAIL: &str = "reader@example.com";

fn password() -> SecretString {
    SecretString::new("correct-horse-battery")
}

fn stack() -> (Arc<MockIdentity>, Arc<MockBroker>) {
    (Arc::new(MockIdentity::new()), Arc::new(MockBroker::new()))
}

#[tokio::test]
async fn test_login_with_empty_password_makes_no_remote_call() {
    crate::setup_test_logging();
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    let result = ctrl.login(EMAIL, &SecretString::new("")).await;
    assert_eq!(
        result,
        Err(SessionError::Validation(
            "Please enter email and password.".to_string()
        ))
    );
    assert_eq!(MockIdentity::calls(&identity.authenticate_calls), 0);
    assert_eq!(broker.exchanges(), 0);
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);

    let result = ctrl.login("", &password()).await;
    assert!(matches!(result, Err(SessionError::Validation(_))));
    assert_eq!(MockIdentity::calls(&identity.authenticate_calls), 0);
}

#[tokio::test]
async fn test_login_success_binds_credentials_to_session() {
    crate::setup_test_logging();
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    assert_eq!(ctrl.login(EMAIL, &password()).await, Ok(AuthState::Authenticated));

    let session = identity.active_session().expect("session after login");
    let creds = ctrl.credentials().await.expect("credentials after login");
    assert!(creds.binding.matches_session(&session));
    assert_eq!(ctrl.username().await.as_deref(), Some(EMAIL));
    assert_eq!(broker.bound_calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.guest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_login_exchange_failure_tears_everything_down() {
    crate::setup_test_logging();
    let (identity, broker) = stack();
    broker.fail_bound.store(true, Ordering::SeqCst);
    let ctrl = controller(&identity, &broker);

    let result = ctrl.login(EMAIL, &password()).await;
    assert!(
        matches!(result, Err(SessionError::Credential(_))),
        "unexpected result {:?}",
        result
    );
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert!(ctrl.credentials().await.is_none());
    assert!(identity.active_session().is_none());
    assert_eq!(MockIdentity::calls(&identity.sign_out_calls), 1);
}

#[tokio::test]
async fn test_login_rejected_by_provider() {
    let (identity, broker) = stack();
    identity.fail_authenticate(IdentityError::Provider(
        "Incorrect username or password.".to_string(),
    ));
    let ctrl = controller(&identity, &broker);

    assert_eq!(
        ctrl.login(EMAIL, &password()).await,
        Err(SessionError::Identity(
            "Incorrect username or password.".to_string()
        ))
    );
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert_eq!(broker.exchanges(), 0);
}

#[tokio::test]
async fn test_new_password_required_is_distinct() {
    let (identity, broker) = stack();
    identity.fail_authenticate(IdentityError::NewPasswordRequired);
    let ctrl = controller(&identity, &broker);

    assert_eq!(
        ctrl.login(EMAIL, &password()).await,
        Err(SessionError::NewPasswordRequired)
    );
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_broker_answering_for_wrong_login_is_rejected() {
    let (identity, broker) = stack();
    broker.wrong_binding.store(true, Ordering::SeqCst);
    let ctrl = controller(&identity, &broker);

    let result = ctrl.login(EMAIL, &password()).await;
    assert!(matches!(result, Err(SessionError::Credential(_))));
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert!(ctrl.credentials().await.is_none());
}

#[tokio::test]
async fn test_guest_login_signs_out_existing_session() {
    crate::setup_test_logging();
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    ctrl.login(EMAIL, &password()).await.expect("login");
    let sign_outs = MockIdentity::calls(&identity.sign_out_calls);

    assert_eq!(ctrl.guest_login().await, Ok(AuthState::Guest));
    assert_eq!(MockIdentity::calls(&identity.sign_out_calls), sign_outs + 1);
    assert!(identity.active_session().is_none());

    let creds = ctrl.credentials().await.expect("guest credentials");
    assert!(creds.binding.is_guest());
    assert!(ctrl.username().await.is_none());
}

#[tokio::test]
async fn test_guest_login_failure_leaves_nothing_behind() {
    let (identity, broker) = stack();
    broker.fail_guest.store(true, Ordering::SeqCst);
    let ctrl = controller(&identity, &broker);

    let result = ctrl.guest_login().await;
    assert!(matches!(result, Err(SessionError::Credential(_))));
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert!(ctrl.credentials().await.is_none());
}

#[tokio::test]
async fn test_resume_without_session_is_idempotent() {
    crate::setup_test_logging();
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    assert_eq!(ctrl.resume().await, Ok(AuthState::Guest));
    let first = ctrl.credentials().await.expect("guest credentials");

    assert_eq!(ctrl.resume().await, Ok(AuthState::Guest));
    let second = ctrl.credentials().await.expect("guest credentials");

    assert_eq!(first, second);
    assert_eq!(broker.guest_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resume_with_session_is_idempotent() {
    let (identity, broker) = stack();
    identity.set_session(EMAIL);
    let ctrl = controller(&identity, &broker);

    assert_eq!(ctrl.resume().await, Ok(AuthState::Authenticated));
    let first = ctrl.credentials().await.expect("bound credentials");
    assert_eq!(ctrl.resume().await, Ok(AuthState::Authenticated));
    let second = ctrl.credentials().await.expect("bound credentials");

    assert_eq!(first, second);
    assert_eq!(broker.bound_calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.guest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resume_refreshes_stale_credentials() {
    let identity = Arc::new(MockIdentity::new());
    // Shorter than the expiry skew, so never fresh
    let broker = Arc::new(MockBroker::with_lifetime(chrono::Duration::seconds(5)));
    let ctrl = controller(&identity, &broker);

    ctrl.resume().await.expect("first resume");
    let first = ctrl.credentials().await.expect("credentials");
    ctrl.resume().await.expect("second resume");
    let second = ctrl.credentials().await.expect("credentials");

    assert_ne!(first.access_key_id, second.access_key_id);
    assert_eq!(broker.guest_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resume_drops_guest_credentials_once_a_session_appears() {
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    assert_eq!(ctrl.resume().await, Ok(AuthState::Guest));
    identity.set_session(EMAIL);
    assert_eq!(ctrl.resume().await, Ok(AuthState::Authenticated));

    let creds = ctrl.credentials().await.expect("bound credentials");
    assert_eq!(creds.binding.username(), Some(EMAIL));
}

#[tokio::test]
async fn test_resume_bound_exchange_failure_signs_out() {
    let (identity, broker) = stack();
    identity.set_session(EMAIL);
    broker.fail_bound.store(true, Ordering::SeqCst);
    let ctrl = controller(&identity, &broker);

    let result = ctrl.resume().await;
    assert!(matches!(result, Err(SessionError::Credential(_))));
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert!(identity.active_session().is_none());
    assert_eq!(broker.guest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resume_with_nothing_available() {
    let (identity, broker) = stack();
    broker.fail_guest.store(true, Ordering::SeqCst);
    let ctrl = controller(&identity, &broker);

    assert!(matches!(
        ctrl.resume().await,
        Err(SessionError::Credential(_))
    ));
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_overlapping_actions_are_rejected() {
    crate::setup_test_logging();
    let identity = Arc::new(MockIdentity::with_delay(Duration::from_millis(200)));
    let broker = Arc::new(MockBroker::new());
    let ctrl = controller(&identity, &broker);
    let pw = password();

    let (first, second) = tokio::join!(ctrl.login(EMAIL, &pw), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctrl.guest_login().await
    });

    assert_eq!(first, Ok(AuthState::Authenticated));
    assert_eq!(second, Err(SessionError::TransitionInProgress));
    assert_eq!(ctrl.state().await, AuthState::Authenticated);
    assert_eq!(broker.guest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_access_denied_waits_for_in_flight_login() {
    let identity = Arc::new(MockIdentity::with_delay(Duration::from_millis(100)));
    let broker = Arc::new(MockBroker::new());
    let ctrl = controller(&identity, &broker);
    let pw = password();

    let (login, denied) = tokio::join!(ctrl.login(EMAIL, &pw), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctrl.access_denied("listing refused").await
    });

    assert_eq!(login, Ok(AuthState::Authenticated));
    assert_eq!(denied, AuthState::Unauthenticated);
    assert!(ctrl.credentials().await.is_none());
    assert!(identity.active_session().is_none());
}

#[tokio::test]
async fn test_identity_timeout_is_reported() {
    let identity = Arc::new(MockIdentity::with_delay(Duration::from_millis(500)));
    let broker = Arc::new(MockBroker::new());
    let ctrl = controller(&identity, &broker).with_remote_timeout(Duration::from_millis(50));

    assert_eq!(
        ctrl.login(EMAIL, &password()).await,
        Err(SessionError::Identity("Identity provider timed out".to_string()))
    );
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert_eq!(broker.exchanges(), 0);
}

#[tokio::test]
async fn test_signup_then_confirm() {
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    assert_eq!(
        ctrl.sign_up(EMAIL, &password()).await,
        Ok(AuthState::PendingConfirmation)
    );
    assert_eq!(ctrl.pending_confirmation().await.as_deref(), Some(EMAIL));
    assert_eq!(MockIdentity::calls(&identity.sign_up_calls), 1);

    assert!(matches!(
        ctrl.confirm(EMAIL, "").await,
        Err(SessionError::Validation(_))
    ));
    assert_eq!(MockIdentity::calls(&identity.confirm_calls), 0);
    assert_eq!(ctrl.state().await, AuthState::PendingConfirmation);

    assert_eq!(ctrl.confirm(EMAIL, "123456").await, Ok(AuthState::Unauthenticated));
    assert!(ctrl.pending_confirmation().await.is_none());
    assert_eq!(broker.exchanges(), 0);
}

#[tokio::test]
async fn test_failed_confirmation_stays_pending() {
    let (identity, broker) = stack();
    *identity.confirm_error.lock().expect("lock poisoned") = Some(IdentityError::Provider(
        "Invalid verification code provided, please try again.".to_string(),
    ));
    let ctrl = controller(&identity, &broker);

    ctrl.sign_up(EMAIL, &password()).await.expect("signup");
    assert!(matches!(
        ctrl.confirm(EMAIL, "000000").await,
        Err(SessionError::Identity(_))
    ));
    assert_eq!(ctrl.state().await, AuthState::PendingConfirmation);
}

#[tokio::test]
async fn test_login_while_guest_is_invalid() {
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);
    ctrl.guest_login().await.expect("guest");

    assert_eq!(
        ctrl.login(EMAIL, &password()).await,
        Err(SessionError::InvalidTransition {
            from: AuthState::Guest,
            action: "log in",
        })
    );
    assert_eq!(MockIdentity::calls(&identity.authenticate_calls), 0);
    assert_eq!(ctrl.state().await, AuthState::Guest);

    // Empty fields are reported before the state check
    assert_eq!(
        ctrl.login(EMAIL, &SecretString::new("")).await,
        Err(SessionError::Validation(
            "Please enter email and password.".to_string()
        ))
    );
    assert!(matches!(
        ctrl.sign_up("", &password()).await,
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(
        ctrl.confirm(EMAIL, "").await,
        Err(SessionError::Validation(_))
    ));
    assert_eq!(MockIdentity::calls(&identity.sign_up_calls), 0);
    assert_eq!(ctrl.state().await, AuthState::Guest);
}

#[tokio::test]
async fn test_signup_failure_keeps_state() {
    let (identity, broker) = stack();
    identity.fail_sign_up(IdentityError::Provider(
        "An account with the given email already exists.".to_string(),
    ));
    let ctrl = controller(&identity, &broker);

    assert_eq!(
        ctrl.sign_up(EMAIL, &password()).await,
        Err(SessionError::Identity(
            "An account with the given email already exists.".to_string()
        ))
    );
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
    assert!(ctrl.pending_confirmation().await.is_none());
    assert_eq!(MockIdentity::calls(&identity.sign_up_calls), 1);
    assert_eq!(broker.exchanges(), 0);
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);
    ctrl.login(EMAIL, &password()).await.expect("login");

    assert_eq!(ctrl.logout().await, Ok(AuthState::Unauthenticated));
    assert!(ctrl.credentials().await.is_none());
    assert!(identity.active_session().is_none());

    // Logging out twice is harmless
    assert_eq!(ctrl.logout().await, Ok(AuthState::Unauthenticated));
}

#[tokio::test]
async fn test_ensure_credentials_reuses_fresh_credentials() {
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);
    ctrl.login(EMAIL, &password()).await.expect("login");
    let active = ctrl.credentials().await.expect("credentials");

    let ensured = ctrl.ensure_credentials().await.expect("ensure");
    assert_eq!(ensured, active);
    assert_eq!(broker.exchanges(), 1);
}

#[tokio::test]
async fn test_at_most_one_kind_of_login_is_active() {
    let (identity, broker) = stack();
    let ctrl = controller(&identity, &broker);

    ctrl.login(EMAIL, &password()).await.expect("login");
    assert!(identity.active_session().is_some());
    assert!(!ctrl.credentials().await.expect("creds").binding.is_guest());

    ctrl.guest_login().await.expect("guest");
    assert!(identity.active_session().is_none());
    assert!(ctrl.credentials().await.expect("creds").binding.is_guest());

    ctrl.access_denied("revoked").await;
    assert!(identity.active_session().is_none());
    assert!(ctrl.credentials().await.is_none());
    assert_eq!(ctrl.state().await, AuthState::Unauthenticated);
}
