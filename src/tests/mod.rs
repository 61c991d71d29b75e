pub(crate) mod controller_tests;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use secret_string::SecretString;
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

use crate::broker::{CredentialBroker, Credentials, LoginBinding};
use crate::content::{ContentEntry, ContentLister};
use crate::error::{CredentialError, IdentityError, ListError};
use crate::identity::{IdentityAssertion, IdentityService, Session, UserAttribute, UserHandle};
use crate::session::SessionController;

pub(crate) const TEST_PROVIDER: &str = "idp.test-region/test-pool";

pub(crate) async fn copy_dir_all(src: PathBuf, dst: PathBuf) -> std::io::Result<()> {
    let mut targets = vec![(src, dst)];
    let mut dirs_done = HashSet::new();

    while let Some((src_dir, dest_dir)) = targets.pop() {
        if dirs_done.contains(&src_dir) {
            continue;
        }
        debug!(src = %src_dir.display(), dest = %dest_dir.display(), "Copying directory");
        fs::create_dir_all(&dest_dir).await?;
        let mut dir_reader = fs::read_dir(&src_dir).await?;
        while let Some(entry) = dir_reader.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                targets.push((entry.path(), dest_dir.join(entry.file_name())));
            } else {
                fs::copy(entry.path(), dest_dir.join(entry.file_name())).await?;
            }
        }
        dirs_done.insert(src_dir);
    }
    Ok(())
}

/// Fresh copy of `testfiles/` so tests can add or remove content freely.
pub(crate) async fn setup_test_files() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    copy_dir_all("testfiles".into(), temp_dir.path().into())
        .await
        .expect("Failed to copy test files");
    temp_dir
}

/// Identity provider fake that counts calls and fails on request.
#[derive(Default)]
pub(crate) struct MockIdentity {
    pub sign_up_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub authenticate_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub sign_up_error: Mutex<Option<IdentityError>>,
    pub authenticate_error: Mutex<Option<IdentityError>>,
    pub confirm_error: Mutex<Option<IdentityError>>,
    pub delay: Duration,
    session: Mutex<Option<Session>>,
    issued: AtomicUsize,
}

impl MockIdentity {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub(crate) fn fail_sign_up(&self, err: IdentityError) {
        *self.sign_up_error.lock().expect("lock poisoned") = Some(err);
    }

    pub(crate) fn fail_authenticate(&self, err: IdentityError) {
        *self.authenticate_error.lock().expect("lock poisoned") = Some(err);
    }

    pub(crate) fn active_session(&self) -> Option<Session> {
        self.session.lock().expect("lock poisoned").clone()
    }

    /// Pretend a login happened in an earlier run.
    pub(crate) fn set_session(&self, username: &str) -> Session {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let session = Session {
            username: username.to_string(),
            id_token: SecretString::new(format!("id-token-{}", n)),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        *self.session.lock().expect("lock poisoned") = Some(session.clone());
        session
    }

    /// Push the current session's expiry into the past.
    pub(crate) fn expire_session(&self) {
        if let Some(session) = self.session.lock().expect("lock poisoned").as_mut() {
            session.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    pub(crate) fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl IdentityService for MockIdentity {
    fn provider_name(&self) -> &str {
        TEST_PROVIDER
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &SecretString,
        _attributes: &[UserAttribute],
    ) -> Result<UserHandle, IdentityError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.sign_up_error.lock().expect("lock poisoned").clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(UserHandle {
                username: email.to_string(),
                confirmed: false,
            }),
        }
    }

    async fn confirm(&self, _email: &str, _code: &str) -> Result<(), IdentityError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.confirm_error.lock().expect("lock poisoned").clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn authenticate(
        &self,
        email: &str,
        _password: &SecretString,
    ) -> Result<Session, IdentityError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.authenticate_error.lock().expect("lock poisoned").clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(self.set_session(email)),
        }
    }

    async fn current_session(&self) -> Option<Session> {
        self.active_session()
    }

    async fn sign_out(&self) {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.session.lock().expect("lock poisoned") = None;
    }
}

/// Credential broker fake; answers every request unless told otherwise.
pub(crate) struct MockBroker {
    pub bound_calls: AtomicUsize,
    pub guest_calls: AtomicUsize,
    pub fail_bound: AtomicBool,
    pub fail_guest: AtomicBool,
    /// Answer bound requests with guest credentials.
    pub wrong_binding: AtomicBool,
    pub lifetime: chrono::Duration,
    issued: AtomicUsize,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            bound_calls: AtomicUsize::new(0),
            guest_calls: AtomicUsize::new(0),
            fail_bound: AtomicBool::new(false),
            fail_guest: AtomicBool::new(false),
            wrong_binding: AtomicBool::new(false),
            lifetime: chrono::Duration::hours(1),
            issued: AtomicUsize::new(0),
        }
    }
}

impl MockBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_lifetime(lifetime: chrono::Duration) -> Self {
        Self {
            lifetime,
            ..Self::default()
        }
    }

    pub(crate) fn exchanges(&self) -> usize {
        self.bound_calls.load(Ordering::SeqCst) + self.guest_calls.load(Ordering::SeqCst)
    }
}

impl CredentialBroker for MockBroker {
    async fn exchange(
        &self,
        request: Option<IdentityAssertion>,
    ) -> Result<Credentials, CredentialError> {
        let binding = match &request {
            Some(assertion) => {
                self.bound_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_bound.load(Ordering::SeqCst) {
                    return Err(CredentialError::Exchange("broker unavailable".to_string()));
                }
                if self.wrong_binding.load(Ordering::SeqCst) {
                    LoginBinding::Guest
                } else {
                    LoginBinding::from(assertion)
                }
            }
            None => {
                self.guest_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_guest.load(Ordering::SeqCst) {
                    return Err(CredentialError::GuestAccessDisabled);
                }
                LoginBinding::Guest
            }
        };
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials {
            identity_id: format!("test-pool:{}", n),
            access_key_id: format!("AKIDTEST{:012}", n),
            secret_access_key: SecretString::new(format!("secret-{}", n)),
            expires_at: Utc::now() + self.lifetime,
            binding,
        })
    }
}

/// Content lister fake returning a fixed listing, or access denied.
#[derive(Default)]
pub(crate) struct MockLister {
    pub entries: Vec<ContentEntry>,
    pub deny: AtomicBool,
    pub prefixes: Mutex<Vec<String>>,
}

impl MockLister {
    pub(crate) fn with_entries(keys: &[&str]) -> Self {
        Self {
            entries: keys
                .iter()
                .map(|key| ContentEntry {
                    key: key.to_string(),
                    name: crate::content::display_name(key).to_string(),
                    link: format!("http://localhost/{}", key),
                    size: 1,
                    content_type: "text/plain".to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }
}

impl ContentLister for MockLister {
    async fn list(
        &self,
        prefix: &str,
        _credentials: &Credentials,
    ) -> Result<Vec<ContentEntry>, ListError> {
        self.prefixes
            .lock()
            .expect("lock poisoned")
            .push(prefix.to_string());
        if self.deny.load(Ordering::SeqCst) {
            return Err(ListError::AccessDenied(format!(
                "Not authorized to list '{}'",
                prefix
            )));
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

pub(crate) fn controller(
    identity: &std::sync::Arc<MockIdentity>,
    broker: &std::sync::Arc<MockBroker>,
) -> SessionController<MockIdentity, MockBroker> {
    SessionController::new(identity.clone(), broker.clone())
}
