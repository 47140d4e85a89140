use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, info};

use crate::config::{
    EndpointSource, CREDENTIALS_ENDPOINT_VAR, CREDENTIALS_MIN_REFRESH_INTERVAL,
    CREDENTIALS_REFRESH_BUFFER, CREDENTIALS_ROLE_KEY,
};
use crate::error::NotificationResult;
use crate::fetcher::Fetcher;
use crate::sink::{CredentialSet, CredentialSink};

use super::{NotificationProvider, ProviderKind, TimerSlot};

// key: credential-refresh -> expiration-driven-reschedule

/// Credential expiry, served either as epoch milliseconds or as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    EpochMillis(i64),
    Timestamp(DateTime<Utc>),
}

impl Expiration {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            Expiration::EpochMillis(millis) => Utc.timestamp_millis_opt(millis).single(),
            Expiration::Timestamp(timestamp) => Some(timestamp),
        }
    }
}

/// Body served by the credentials endpoint: an `expiration` plus one credential
/// record per role key, e.g. `{"expiration": ..., "AwsAccess": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsPayload {
    pub expiration: Expiration,
    #[serde(flatten)]
    pub roles: HashMap<String, Value>,
}

#[derive(Debug, Error)]
pub enum RoleLookupError {
    #[error("role `{0}` missing from credentials payload")]
    Missing(String),
    #[error("credentials for role `{role}` are malformed: {source}")]
    Malformed {
        role: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CredentialsPayload {
    pub fn credentials_for(&self, role_key: &str) -> Result<CredentialSet, RoleLookupError> {
        let record = self
            .roles
            .get(role_key)
            .ok_or_else(|| RoleLookupError::Missing(role_key.to_string()))?;
        serde_json::from_value(record.clone()).map_err(|source| RoleLookupError::Malformed {
            role: role_key.to_string(),
            source,
        })
    }
}

/// Delay until the next refresh: `expires_at - now - buffer`, never less than
/// `min_interval`.
pub fn refresh_delay(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    buffer: Duration,
    min_interval: Duration,
) -> Duration {
    let remaining = expires_at.signed_duration_since(now);
    chrono::Duration::from_std(buffer)
        .ok()
        .and_then(|buffer| remaining.checked_sub(&buffer))
        .and_then(|delay| delay.to_std().ok())
        .map(|delay| delay.max(min_interval))
        .unwrap_or(min_interval)
}

#[derive(Debug, Clone)]
pub struct CredentialProviderConfig {
    pub endpoint: EndpointSource,
    pub role_key: String,
    pub refresh_buffer: Duration,
    pub min_refresh_interval: Duration,
}

impl CredentialProviderConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: EndpointSource::Env(CREDENTIALS_ENDPOINT_VAR),
            role_key: CREDENTIALS_ROLE_KEY.clone(),
            refresh_buffer: *CREDENTIALS_REFRESH_BUFFER,
            min_refresh_interval: *CREDENTIALS_MIN_REFRESH_INTERVAL,
        }
    }
}

impl Default for CredentialProviderConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// No endpoint configured; nothing further is scheduled.
    Inert,
    /// The payload lacked a usable record for the role; nothing further is scheduled.
    Misconfigured,
    Refreshed(Duration),
    Retry(Duration),
}

impl CycleOutcome {
    fn next_delay(self) -> Option<Duration> {
        match self {
            CycleOutcome::Refreshed(delay) | CycleOutcome::Retry(delay) => Some(delay),
            CycleOutcome::Inert | CycleOutcome::Misconfigured => None,
        }
    }
}

struct RefreshCycle {
    config: CredentialProviderConfig,
    fetcher: Fetcher,
    sink: Arc<dyn CredentialSink>,
}

impl RefreshCycle {
    async fn run(&self) -> CycleOutcome {
        let Some(url) = self.config.endpoint.resolve() else {
            debug!("credentials endpoint not configured; credential refresh disabled");
            return CycleOutcome::Inert;
        };

        let Some(payload) = self.fetcher.fetch::<CredentialsPayload>(Some(url.as_str())).await else {
            let retry_in = self.config.min_refresh_interval;
            debug!(retry_secs = retry_in.as_secs(), "credential fetch failed; retrying");
            return CycleOutcome::Retry(retry_in);
        };
        let now = Utc::now();

        let credentials = match payload.credentials_for(&self.config.role_key) {
            Ok(credentials) => credentials,
            Err(err) => {
                error!(%err, role_key = %self.config.role_key, "credential refresh aborted");
                return CycleOutcome::Misconfigured;
            }
        };

        self.sink.publish(&credentials);

        let delay = match payload.expiration.to_datetime() {
            Some(expires_at) => {
                let delay = refresh_delay(
                    expires_at,
                    now,
                    self.config.refresh_buffer,
                    self.config.min_refresh_interval,
                );
                info!(
                    role_key = %self.config.role_key,
                    region = %credentials.region,
                    expires_at = %expires_at.to_rfc3339(),
                    next_refresh_secs = delay.as_secs(),
                    "cloud credentials refreshed"
                );
                delay
            }
            None => {
                let delay = self.config.min_refresh_interval;
                info!(
                    role_key = %self.config.role_key,
                    region = %credentials.region,
                    next_refresh_secs = delay.as_secs(),
                    "cloud credentials refreshed with out-of-range expiration"
                );
                delay
            }
        };

        CycleOutcome::Refreshed(delay)
    }
}

/// Keeps a role's cloud credentials fresh.
///
/// `initialize` runs one fetch inline, publishes the credentials through the sink,
/// and arms a background task that sleeps until shortly before expiry and runs the
/// next cycle, indefinitely. An absent endpoint or a payload without the configured
/// role stops the chain. A failed fetch against a configured endpoint (transport
/// error, non-2xx status, undecodable body) does not: the next attempt runs after
/// `min_refresh_interval`.
pub struct CredentialProvider {
    cycle: Arc<RefreshCycle>,
    timer: TimerSlot,
}

impl CredentialProvider {
    pub fn new(
        config: CredentialProviderConfig,
        sink: Arc<dyn CredentialSink>,
    ) -> NotificationResult<Self> {
        Ok(Self::with_fetcher(config, Fetcher::new()?, sink))
    }

    pub fn with_fetcher(
        config: CredentialProviderConfig,
        fetcher: Fetcher,
        sink: Arc<dyn CredentialSink>,
    ) -> Self {
        Self {
            cycle: Arc::new(RefreshCycle {
                config,
                fetcher,
                sink,
            }),
            timer: TimerSlot::default(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.timer.is_armed()
    }
}

#[async_trait]
impl NotificationProvider for CredentialProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Credentials
    }

    async fn initialize(&self) -> NotificationResult<()> {
        let epoch = self.timer.epoch();
        let Some(first_delay) = self.cycle.run().await.next_delay() else {
            return Ok(());
        };

        let cycle = Arc::clone(&self.cycle);
        let handle = tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                time::sleep(delay).await;
                match cycle.run().await.next_delay() {
                    Some(next) => delay = next,
                    None => break,
                }
            }
        });

        if self.timer.arm(epoch, handle) {
            debug!(
                delay_secs = first_delay.as_secs(),
                "credential refresh scheduled"
            );
        }
        Ok(())
    }

    fn destroy(&self) {
        if self.timer.disarm() {
            debug!("pending credential refresh cancelled");
        }
    }
}
