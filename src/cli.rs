use std::num::NonZeroU64;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::constants::{
    DEFAULT_FREE_PREFIX, DEFAULT_PREMIUM_PREFIX, MAX_CREDENTIAL_LIFETIME_SECS, PLACEHOLDER_MARKER,
};
use crate::error::TierGateError;
use crate::identity::provider_key;

#[derive(Parser, Debug, Clone)]
#[clap(name = "tiergate", about = "Session front-end for a tiered content store")]
pub struct Cli {
    #[clap(short, long, default_value = "./content", env = "TIERGATE_CONTENT_DIR")]
    pub content_dir: PathBuf,

    /// JSON list of users to load at startup.
    #[clap(short, long, default_value = "./users.json", env = "TIERGATE_USERS_FILE")]
    pub users_file: PathBuf,

    #[clap(long, default_value = "us-east-1", env = "TIERGATE_REGION")]
    pub region: String,

    #[clap(long, default_value = "YOUR_USER_POOL_ID", env = "TIERGATE_USER_POOL_ID")]
    pub user_pool_id: String,

    #[clap(long, default_value = "YOUR_CLIENT_ID", env = "TIERGATE_CLIENT_ID")]
    pub client_id: String,

    #[clap(
        long,
        default_value = "YOUR_IDENTITY_POOL_ID",
        env = "TIERGATE_IDENTITY_POOL_ID"
    )]
    pub identity_pool_id: String,

    #[clap(
        long,
        default_value = "http://localhost:8090",
        env = "TIERGATE_LINK_BASE_URL"
    )]
    pub link_base_url: String,

    #[clap(long, default_value = DEFAULT_FREE_PREFIX, env = "TIERGATE_FREE_PREFIX")]
    pub free_prefix: String,

    #[clap(long, default_value = DEFAULT_PREMIUM_PREFIX, env = "TIERGATE_PREMIUM_PREFIX")]
    pub premium_prefix: String,

    #[clap(long, default_value = "10", env = "TIERGATE_REMOTE_TIMEOUT_SECS")]
    pub remote_timeout_secs: NonZeroU64,

    #[clap(long, default_value = "3600", env = "TIERGATE_CREDENTIAL_LIFETIME_SECS")]
    pub credential_lifetime_secs: NonZeroU64,

    #[clap(long, default_value_t = true, action = ArgAction::Set, env = "TIERGATE_ALLOW_GUEST")]
    pub allow_guest: bool,
}

impl Cli {
    /// Refuse to start with identifiers that were never filled in.
    pub fn validate(&self) -> Result<(), TierGateError> {
        for (name, value) in [
            ("user pool id", &self.user_pool_id),
            ("client id", &self.client_id),
            ("identity pool id", &self.identity_pool_id),
            ("region", &self.region),
        ] {
            if value.is_empty() || value.contains(PLACEHOLDER_MARKER) {
                return Err(TierGateError::Configuration(format!(
                    "Configuration incomplete: {} is not set (got '{}')",
                    name, value
                )));
            }
        }

        if self.free_prefix.is_empty() || self.premium_prefix.is_empty() {
            return Err(TierGateError::Configuration(
                "Content prefixes must not be empty".to_string(),
            ));
        }
        if self.free_prefix == self.premium_prefix {
            return Err(TierGateError::Configuration(format!(
                "Free and premium prefixes must differ, both are '{}'",
                self.free_prefix
            )));
        }
        if self.credential_lifetime_secs.get() > MAX_CREDENTIAL_LIFETIME_SECS {
            return Err(TierGateError::Configuration(format!(
                "Credential lifetime of {}s exceeds the maximum of {}s",
                self.credential_lifetime_secs, MAX_CREDENTIAL_LIFETIME_SECS
            )));
        }
        Ok(())
    }

    /// Name the broker expects on identity assertions.
    pub fn provider(&self) -> String {
        provider_key(&self.region, &self.user_pool_id)
    }

    pub fn remote_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.remote_timeout_secs.get())
    }

    pub fn credential_lifetime(&self) -> Result<chrono::Duration, TierGateError> {
        i64::try_from(self.credential_lifetime_secs.get())
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                TierGateError::Configuration(format!(
                    "Credential lifetime of {}s is out of range",
                    self.credential_lifetime_secs
                ))
            })
    }
}
