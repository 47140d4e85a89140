use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::{
    EndpointSource, MAX_STOP_POLL_INTERVAL, STOP_ENDPOINT_VAR, STOP_POLL_INTERVAL,
};
use crate::error::NotificationResult;
use crate::fetcher::Fetcher;

use super::{NotificationProvider, ProviderKind, TimerSlot};

pub type StopCallback = Arc<dyn Fn() + Send + Sync>;

/// Body served by the stop endpoint: `{"stop": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StopSignal {
    pub stop: bool,
}

#[derive(Debug, Clone)]
pub struct StopProviderConfig {
    pub endpoint: EndpointSource,
    pub poll_interval: Duration,
}

impl StopProviderConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: EndpointSource::Env(STOP_ENDPOINT_VAR),
            poll_interval: *STOP_POLL_INTERVAL,
        }
    }
}

impl Default for StopProviderConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Polls the stop endpoint on a fixed interval and invokes `on_stop` on every tick
/// that reports a stop request. Failed polls are logged by the fetcher and polling
/// carries on.
pub struct StopProvider {
    config: StopProviderConfig,
    fetcher: Fetcher,
    on_stop: StopCallback,
    timer: TimerSlot,
}

impl StopProvider {
    pub fn new(
        config: StopProviderConfig,
        on_stop: impl Fn() + Send + Sync + 'static,
    ) -> NotificationResult<Self> {
        Ok(Self::with_fetcher(config, Fetcher::new()?, Arc::new(on_stop)))
    }

    pub fn with_fetcher(config: StopProviderConfig, fetcher: Fetcher, on_stop: StopCallback) -> Self {
        Self {
            config,
            fetcher,
            on_stop,
            timer: TimerSlot::default(),
        }
    }

    /// Runs a single poll outside the timer. Returns whether a stop was requested.
    pub async fn poll_once(&self) -> bool {
        poll_stop_signal(&self.fetcher, &self.config.endpoint, &self.on_stop).await
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_armed()
    }
}

async fn poll_stop_signal(fetcher: &Fetcher, endpoint: &EndpointSource, on_stop: &StopCallback) -> bool {
    let url = endpoint.resolve();
    match fetcher.fetch::<StopSignal>(url.as_deref()).await {
        Some(StopSignal { stop: true }) => {
            debug!("stop endpoint requested shutdown");
            on_stop();
            true
        }
        _ => false,
    }
}

#[async_trait]
impl NotificationProvider for StopProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stop
    }

    async fn initialize(&self) -> NotificationResult<()> {
        let epoch = self.timer.epoch();
        let period = self
            .config
            .poll_interval
            .clamp(Duration::from_millis(1), MAX_STOP_POLL_INTERVAL);
        let fetcher = self.fetcher.clone();
        let endpoint = self.config.endpoint.clone();
        let on_stop = Arc::clone(&self.on_stop);

        let handle = tokio::spawn(async move {
            let first_tick = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                poll_stop_signal(&fetcher, &endpoint, &on_stop).await;
            }
        });

        if self.timer.arm(epoch, handle) {
            info!(
                interval_ms = period.as_millis() as u64,
                "stop notification polling armed"
            );
        }
        Ok(())
    }

    fn destroy(&self) {
        if self.timer.disarm() {
            debug!("stop notification polling cancelled");
        }
    }
}
