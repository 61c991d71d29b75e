//! Which login bindings may read which prefixes.

use serde::Serialize;
use tracing::debug;

use crate::broker::LoginBinding;
use crate::constants::{DEFAULT_FREE_PREFIX, DEFAULT_PREMIUM_PREFIX};

/// Access tier a prefix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Free,
    Premium,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => f.write_str("free"),
            Tier::Premium => f.write_str("premium"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" | "paid" => Ok(Tier::Premium),
            other => Err(format!("Unknown content tier '{}'", other)),
        }
    }
}

/// Guests read the free prefix; identity-bound credentials read both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    free_prefix: String,
    premium_prefix: String,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_PREFIX, DEFAULT_PREMIUM_PREFIX)
    }
}

impl AccessPolicy {
    pub fn new(free_prefix: &str, premium_prefix: &str) -> Self {
        Self {
            free_prefix: free_prefix.to_string(),
            premium_prefix: premium_prefix.to_string(),
        }
    }

    pub fn prefix(&self, tier: Tier) -> &str {
        match tier {
            Tier::Free => &self.free_prefix,
            Tier::Premium => &self.premium_prefix,
        }
    }

    pub fn tier_of(&self, prefix: &str) -> Option<Tier> {
        if prefix.starts_with(&self.premium_prefix) {
            Some(Tier::Premium)
        } else if prefix.starts_with(&self.free_prefix) {
            Some(Tier::Free)
        } else {
            None
        }
    }

    pub fn allows(&self, binding: &LoginBinding, prefix: &str) -> bool {
        let allowed = match (self.tier_of(prefix), binding) {
            (Some(Tier::Free), _) => true,
            (Some(Tier::Premium), LoginBinding::Identity { .. }) => true,
            (Some(Tier::Premium), LoginBinding::Guest) => false,
            (None, _) => false,
        };
        debug!(prefix = %prefix, guest = binding.is_guest(), allowed, "Evaluated access policy");
        allowed
    }
}
