use once_cell::sync::Lazy;
use std::time::Duration;

/// Environment variable holding the stop-notification endpoint URL.
pub const STOP_ENDPOINT_VAR: &str = "SDO_STOP_NOTIFICATION_URL";

/// Environment variable holding the credentials endpoint URL.
pub const CREDENTIALS_ENDPOINT_VAR: &str = "SDO_CREDENTIALS_URL";

pub const AWS_ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
pub const AWS_DEFAULT_REGION_VAR: &str = "AWS_DEFAULT_REGION";

const DEFAULT_STOP_POLL_INTERVAL_MS: u64 = 5_000;

/// Longest accepted stop polling period.
pub const MAX_STOP_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_ROLE_KEY: &str = "AwsAccess";
const DEFAULT_REFRESH_BUFFER_SECS: u64 = 60;
const DEFAULT_MIN_REFRESH_SECS: u64 = 60;

/// Stop endpoint polling period. Defaults to 5000 ms, capped at
/// [`MAX_STOP_POLL_INTERVAL`].
pub static STOP_POLL_INTERVAL: Lazy<Duration> = Lazy::new(|| {
    Duration::from_millis(
        std::env::var("SDO_STOP_POLL_INTERVAL_MS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_STOP_POLL_INTERVAL_MS),
    )
    .min(MAX_STOP_POLL_INTERVAL)
});

/// Role key looked up in the credentials payload. Defaults to `AwsAccess`.
pub static CREDENTIALS_ROLE_KEY: Lazy<String> = Lazy::new(|| {
    read_optional_env("SDO_CREDENTIALS_ROLE_KEY").unwrap_or_else(|| DEFAULT_ROLE_KEY.to_string())
});

/// Safety margin subtracted from a credential's expiration before refreshing.
/// Must stay below the platform's credential validity margin. Defaults to 60 seconds.
pub static CREDENTIALS_REFRESH_BUFFER: Lazy<Duration> = Lazy::new(|| {
    Duration::from_secs(
        std::env::var("SDO_CREDENTIALS_REFRESH_BUFFER_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_REFRESH_BUFFER_SECS),
    )
});

/// Lower bound on the delay between two credential fetches. Defaults to 60 seconds.
pub static CREDENTIALS_MIN_REFRESH_INTERVAL: Lazy<Duration> = Lazy::new(|| {
    Duration::from_secs(
        std::env::var("SDO_CREDENTIALS_MIN_REFRESH_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MIN_REFRESH_SECS),
    )
});

/// Where a provider finds its endpoint URL.
///
/// `Env` is resolved on every call so a URL that is absent (local/dev runs) or set
/// later is always observed as it currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    Env(&'static str),
    Fixed(Option<String>),
}

impl EndpointSource {
    pub fn fixed(url: impl Into<String>) -> Self {
        EndpointSource::Fixed(Some(url.into()))
    }

    pub fn none() -> Self {
        EndpointSource::Fixed(None)
    }

    pub fn resolve(&self) -> Option<String> {
        match self {
            EndpointSource::Env(var) => read_optional_env(var),
            EndpointSource::Fixed(url) => url
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

pub(crate) fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
