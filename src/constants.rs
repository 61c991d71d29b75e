use std::sync::LazyLock;

use chrono::Duration;

pub(crate) static DEFAULT_CREDENTIAL_LIFETIME: LazyLock<Duration> =
    LazyLock::new(|| Duration::seconds(3600));

pub(crate) static ID_TOKEN_LIFETIME: LazyLock<Duration> =
    LazyLock::new(|| Duration::seconds(3600));

/// Upper bound for configured credential lifetimes, twelve hours.
pub const MAX_CREDENTIAL_LIFETIME_SECS: u64 = 43_200;

/// Signed content links stay valid this long.
pub(crate) static LINK_LIFETIME: LazyLock<Duration> = LazyLock::new(|| Duration::seconds(900));

/// Credentials this close to expiry are treated as stale.
pub(crate) static CREDENTIAL_EXPIRY_SKEW: LazyLock<Duration> =
    LazyLock::new(|| Duration::seconds(30));

pub const TEMP_ACCESS_KEY_LENGTH: usize = 20;
pub const SECRET_ACCESS_KEY_LENGTH: usize = 40;
pub(crate) const SECRET_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub(crate) const ID_TOKEN_LENGTH: usize = 48;
pub(crate) const CONFIRMATION_CODE_LENGTH: usize = 6;
pub(crate) const MIN_PASSWORD_LENGTH: usize = 8;

/// Marker left in identifiers that were never configured.
pub const PLACEHOLDER_MARKER: &str = "YOUR_";

pub const DEFAULT_FREE_PREFIX: &str = "free/";
pub const DEFAULT_PREMIUM_PREFIX: &str = "paid/";
