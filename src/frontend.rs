//! Console front-end.
//!
//! Plays the part of the page: form fields, one command per button, and a
//! view model with three mutually exclusive panels driven by [`AuthState`].
//! Listing happens here rather than in the controller; an access-denied
//! listing is escalated back into the controller.

use std::str::FromStr;
use std::sync::Arc;

use secret_string::SecretString;
use serde::Serialize;
use tracing::{debug, warn};

use crate::broker::CredentialBroker;
use crate::content::{AccessPolicy, ContentEntry, ContentLister, Tier};
use crate::error::{ListError, SessionError};
use crate::identity::IdentityService;
use crate::session::{AuthState, SessionController};

pub const HELP: &str = "\
Commands:
  signup <email> <password>   create an account
  confirm <email> <code>      confirm an account with the emailed code
  login <email> <password>    sign in
  guest                       browse free content as a guest
  logout                      sign out and discard credentials
  list free|premium           list content for a tier
  status                      show the current screen
  help                        show this help
  quit                        exit

The local pool logs confirmation codes at debug level (RUST_LOG=tiergate=debug).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Panel {
    Auth,
    Confirm,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Success,
    Info,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Listing {
    Files(Vec<ContentEntry>),
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    pub panel: Panel,
    pub user_info: String,
    pub premium_visible: bool,
    pub auth_message: Option<Message>,
    pub confirm_message: Option<Message>,
    pub free_listing: Option<Listing>,
    pub premium_listing: Option<Listing>,
}

impl Default for View {
    fn default() -> Self {
        Self {
            panel: Panel::Auth,
            user_info: String::new(),
            premium_visible: false,
            auth_message: None,
            confirm_message: None,
            free_listing: None,
            premium_listing: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormFields {
    pub email: String,
    pub password: SecretString,
    pub confirm_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignUp {
        email: String,
        password: SecretString,
    },
    Confirm {
        email: String,
        code: String,
    },
    Login {
        email: String,
        password: SecretString,
    },
    Guest,
    Logout,
    List(Tier),
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    /// Missing arguments parse as empty fields so the controller can reject them.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
        let mut arg = || parts.next().unwrap_or_default().to_string();

        match verb.as_str() {
            "signup" | "sign-up" => Ok(Command::SignUp {
                email: arg(),
                password: SecretString::new(arg()),
            }),
            "confirm" => Ok(Command::Confirm {
                email: arg(),
                code: arg(),
            }),
            "login" | "signin" | "sign-in" => Ok(Command::Login {
                email: arg(),
                password: SecretString::new(arg()),
            }),
            "guest" => Ok(Command::Guest),
            "logout" | "signout" => Ok(Command::Logout),
            "list" => match arg() {
                tier if tier.is_empty() => Err("Usage: list free|premium".to_string()),
                tier => tier.parse().map(Command::List),
            },
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err("Empty command, type 'help' for a list of commands".to_string()),
            other => Err(format!(
                "Unknown command '{}', type 'help' for a list of commands",
                other
            )),
        }
    }
}

/// Message text for a failed action: validation and guard errors speak for themselves.
fn failure_text(prefix: &str, err: &SessionError) -> String {
    match err {
        SessionError::Validation(_)
        | SessionError::TransitionInProgress
        | SessionError::InvalidTransition { .. } => err.to_string(),
        other => format!("{}: {}", prefix, other),
    }
}

/// Whether a failed action left the session torn down.
fn resets_screen(err: &SessionError) -> bool {
    matches!(
        err,
        SessionError::Identity(_)
            | SessionError::NewPasswordRequired
            | SessionError::Credential(_)
            | SessionError::AccessDenied(_)
    )
}

pub struct Frontend<I, B, L> {
    controller: Arc<SessionController<I, B>>,
    lister: Arc<L>,
    policy: AccessPolicy,
    form: FormFields,
    view: View,
}

impl<I, B, L> Frontend<I, B, L>
where
    I: IdentityService,
    B: CredentialBroker,
    L: ContentLister,
{
    pub fn new(
        controller: Arc<SessionController<I, B>>,
        lister: Arc<L>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            controller,
            lister,
            policy,
            form: FormFields::default(),
            view: View::default(),
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }

    pub fn controller(&self) -> &Arc<SessionController<I, B>> {
        &self.controller
    }

    /// Page load: run the resume check and draw whatever it settles on.
    pub async fn start(&mut self) {
        if let Err(err) = self.controller.resume().await {
            warn!(error = %err, "Resume check did not restore a session");
        }
        self.sync_view().await;
    }

    /// Handle one command. Returns false once the user asked to quit.
    pub async fn dispatch(&mut self, command: Command) -> bool {
        debug!(command = ?command, "Dispatching command");
        match command {
            Command::SignUp { email, password } => {
                self.fill(email, password);
                self.sign_up().await;
            }
            Command::Confirm { email, code } => {
                self.form.email = email;
                self.form.confirm_code = code;
                self.confirm().await;
            }
            Command::Login { email, password } => {
                self.fill(email, password);
                self.login().await;
            }
            Command::Guest => self.guest_login().await,
            Command::Logout => self.logout().await,
            Command::List(tier) => self.list(tier).await,
            Command::Status => self.sync_view().await,
            Command::Help => {}
            Command::Quit => return false,
        }
        true
    }

    fn fill(&mut self, email: String, password: SecretString) {
        self.form.email = email;
        self.form.password = password;
    }

    fn hide_messages(&mut self) {
        self.view.auth_message = None;
        self.view.confirm_message = None;
    }

    /// Clear the login form and listings; the controller has already dropped credentials.
    async fn reset_to_login_screen(&mut self) {
        self.form.email.clear();
        self.form.password = SecretString::default();
        self.hide_messages();
        self.sync_view().await;
    }

    async fn sync_view(&mut self) {
        let state = self.controller.state().await;
        match state {
            AuthState::Authenticated => {
                let username = self.controller.username().await.unwrap_or_default();
                self.view.panel = Panel::Content;
                self.view.user_info = format!("Logged in as: {}", username);
                self.view.premium_visible = true;
            }
            AuthState::Guest => {
                self.view.panel = Panel::Content;
                self.view.user_info = "Browse as Guest".to_string();
                self.view.premium_visible = false;
                self.view.premium_listing = None;
            }
            AuthState::PendingConfirmation | AuthState::Unauthenticated => {
                self.view.panel = if state == AuthState::PendingConfirmation {
                    Panel::Confirm
                } else {
                    Panel::Auth
                };
                self.view.user_info.clear();
                self.view.premium_visible = false;
                self.view.free_listing = None;
                self.view.premium_listing = None;
            }
        }
    }

    async fn sign_up(&mut self) {
        let result = self
            .controller
            .sign_up(&self.form.email, &self.form.password)
            .await;
        match result {
            Ok(_) => {
                self.sync_view().await;
                self.view.auth_message = Some(Message::new(
                    MessageKind::Success,
                    "Sign up successful! Please check your email for a confirmation code.",
                ));
            }
            Err(err) => {
                self.view.auth_message = Some(Message::new(
                    MessageKind::Danger,
                    failure_text("Sign up failed", &err),
                ));
            }
        }
    }

    async fn confirm(&mut self) {
        let result = self
            .controller
            .confirm(&self.form.email, &self.form.confirm_code)
            .await;
        match result {
            Ok(_) => {
                self.form.confirm_code.clear();
                self.reset_to_login_screen().await;
                self.view.auth_message = Some(Message::new(
                    MessageKind::Success,
                    "Account confirmed successfully! You can now log in.",
                ));
            }
            Err(err) => {
                self.view.confirm_message = Some(Message::new(
                    MessageKind::Danger,
                    failure_text("Confirmation failed", &err),
                ));
            }
        }
    }

    async fn login(&mut self) {
        let result = self
            .controller
            .login(&self.form.email, &self.form.password)
            .await;
        match result {
            Ok(_) => {
                self.hide_messages();
                self.sync_view().await;
                self.view.auth_message =
                    Some(Message::new(MessageKind::Success, "Login successful!"));
            }
            Err(err) => {
                if resets_screen(&err) {
                    self.reset_to_login_screen().await;
                }
                self.view.auth_message = Some(Message::new(
                    MessageKind::Danger,
                    failure_text("Login failed", &err),
                ));
            }
        }
    }

    async fn guest_login(&mut self) {
        match self.controller.guest_login().await {
            Ok(_) => {
                self.hide_messages();
                self.sync_view().await;
                self.view.auth_message = Some(Message::new(
                    MessageKind::Info,
                    "Browse as guest. Access to free content only.",
                ));
            }
            Err(err) => {
                if resets_screen(&err) {
                    self.reset_to_login_screen().await;
                }
                self.view.auth_message = Some(Message::new(
                    MessageKind::Danger,
                    failure_text("Guest access failed", &err),
                ));
            }
        }
    }

    async fn logout(&mut self) {
        match self.controller.logout().await {
            Ok(_) => {
                self.reset_to_login_screen().await;
                self.view.auth_message =
                    Some(Message::new(MessageKind::Info, "You have been logged out."));
            }
            Err(err) => {
                self.view.auth_message = Some(Message::new(
                    MessageKind::Danger,
                    failure_text("Logout failed", &err),
                ));
            }
        }
    }

    fn set_listing(&mut self, tier: Tier, listing: Listing) {
        match tier {
            Tier::Free => self.view.free_listing = Some(listing),
            Tier::Premium => self.view.premium_listing = Some(listing),
        }
    }

    async fn list(&mut self, tier: Tier) {
        let prefix = self.policy.prefix(tier).to_string();

        let credentials = match self.controller.ensure_credentials().await {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(prefix = %prefix, error = %err, "No usable credentials for listing");
                if resets_screen(&err) {
                    self.reset_to_login_screen().await;
                }
                self.set_listing(tier, Listing::Failed(format!("Failed to load files: {}", err)));
                return;
            }
        };
        // Refresh can change the state, an expired login falls back to guest
        self.sync_view().await;

        match self.lister.list(&prefix, &credentials).await {
            Ok(entries) if entries.is_empty() => self.set_listing(tier, Listing::Empty),
            Ok(entries) => self.set_listing(tier, Listing::Files(entries)),
            Err(ListError::AccessDenied(reason)) => {
                warn!(prefix = %prefix, reason = %reason, "Access denied while listing, resetting to login");
                self.controller.access_denied(&reason).await;
                self.reset_to_login_screen().await;
                self.view.auth_message = Some(Message::new(
                    MessageKind::Danger,
                    "Access Denied. Please log in or refresh for full access.",
                ));
            }
            Err(err) => {
                warn!(prefix = %prefix, error = %err, "Error listing files");
                self.set_listing(tier, Listing::Failed(format!("Failed to load files: {}", err)));
            }
        }
    }

    /// Plain-text rendering of the visible parts of the view.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        let view = &self.view;

        match view.panel {
            Panel::Auth => lines.push("== Sign in ==".to_string()),
            Panel::Confirm => lines.push("== Confirm your account ==".to_string()),
            Panel::Content => {
                lines.push("== Content ==".to_string());
                lines.push(view.user_info.clone());
            }
        }

        for message in [&view.auth_message, &view.confirm_message]
            .into_iter()
            .flatten()
        {
            let kind = match message.kind {
                MessageKind::Success => "ok",
                MessageKind::Info => "info",
                MessageKind::Danger => "error",
            };
            lines.push(format!("[{}] {}", kind, message.text));
        }

        if view.panel == Panel::Content {
            render_listing(&mut lines, "Free files", view.free_listing.as_ref());
            if view.premium_visible {
                render_listing(&mut lines, "Premium files", view.premium_listing.as_ref());
            }
        }

        lines.join("\n")
    }
}

fn render_listing(lines: &mut Vec<String>, title: &str, listing: Option<&Listing>) {
    let Some(listing) = listing else {
        return;
    };
    lines.push(format!("{}:", title));
    match listing {
        Listing::Files(entries) => {
            for entry in entries {
                lines.push(format!("  {}  {}", entry.name, entry.link));
            }
        }
        Listing::Empty => lines.push("  No files found.".to_string()),
        Listing::Failed(msg) => lines.push(format!("  {}", msg)),
    }
}
