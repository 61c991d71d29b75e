//! Wires the local stack together and runs the console loop.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::broker::TemporaryCredentialBroker;
use crate::cli::Cli;
use crate::content::{AccessPolicy, FilesystemContentLister};
use crate::error::TierGateError;
use crate::frontend::{Command, Frontend, HELP};
use crate::identity::LocalUserPool;
use crate::session::SessionController;

pub type LocalBroker = TemporaryCredentialBroker<LocalUserPool>;
pub type LocalController = SessionController<LocalUserPool, LocalBroker>;
pub type LocalLister = FilesystemContentLister<LocalBroker>;
pub type LocalFrontend = Frontend<LocalUserPool, LocalBroker, LocalLister>;

/// The assembled services, kept around so callers can reach the pool's
/// confirmation codes and the broker's registry.
pub struct App {
    pub pool: Arc<LocalUserPool>,
    pub broker: Arc<LocalBroker>,
    pub frontend: LocalFrontend,
}

impl App {
    pub async fn build(cli: &Cli) -> Result<Self, TierGateError> {
        cli.validate()?;
        let provider = cli.provider();
        let lifetime = cli.credential_lifetime()?;

        let pool = Arc::new(LocalUserPool::from_seed_file(&provider, &cli.users_file).await?);
        let broker = Arc::new(
            TemporaryCredentialBroker::new(pool.clone(), &cli.identity_pool_id, &provider)
                .with_guest_access(cli.allow_guest)
                .with_lifetime(lifetime),
        );
        let policy = AccessPolicy::new(&cli.free_prefix, &cli.premium_prefix);
        let lister = Arc::new(FilesystemContentLister::new(
            cli.content_dir.clone(),
            policy.clone(),
            broker.clone(),
            &cli.link_base_url,
        ));
        let controller = Arc::new(
            SessionController::new(pool.clone(), broker.clone())
                .with_remote_timeout(cli.remote_timeout()),
        );

        info!(
            provider = %provider,
            content_dir = %cli.content_dir.display(),
            allow_guest = cli.allow_guest,
            "Session front-end ready"
        );

        Ok(Self {
            pool,
            broker,
            frontend: Frontend::new(controller, lister, policy),
        })
    }

    /// Read commands from stdin until `quit` or end of input.
    pub async fn run(mut self) -> Result<(), TierGateError> {
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        self.frontend.start().await;
        write_block(&mut stdout, &self.frontend.render()).await?;

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let output = match line.parse::<Command>() {
                Ok(Command::Help) => HELP.to_string(),
                Ok(command) => {
                    if !self.frontend.dispatch(command).await {
                        debug!("Quit requested");
                        break;
                    }
                    self.frontend.render()
                }
                Err(msg) => msg,
            };
            write_block(&mut stdout, &output).await?;
        }
        Ok(())
    }
}

async fn write_block(stdout: &mut tokio::io::Stdout, text: &str) -> Result<(), TierGateError> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n\n").await?;
    stdout.flush().await?;
    Ok(())
}
