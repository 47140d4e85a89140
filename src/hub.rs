use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

use crate::providers::stop::StopCallback;
use crate::providers::{NotificationProvider, StopProvider, StopProviderConfig};

// key: sdo-notifications -> provider-lifecycle,stop-flag

/// Aggregates the platform providers for a host process.
///
/// The host calls [`initialize`](Self::initialize) once, checks
/// [`should_stop`](Self::should_stop) from its own loop and calls
/// [`stop`](Self::stop) on shutdown.
pub struct SdoNotifications {
    stop_needed: Arc<AtomicBool>,
    on_stop: Option<StopCallback>,
    stop_config: StopProviderConfig,
    providers: Mutex<Vec<Arc<dyn NotificationProvider>>>,
}

impl SdoNotifications {
    pub fn new() -> Self {
        Self::with_stop_config(StopProviderConfig::from_env())
    }

    pub fn with_stop_config(stop_config: StopProviderConfig) -> Self {
        Self {
            stop_needed: Arc::new(AtomicBool::new(false)),
            on_stop: None,
            stop_config,
            providers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback run on every poll that reports a stop request.
    pub fn on_stop(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(callback));
        self
    }

    /// Starts `extra_providers` plus the built-in stop provider.
    ///
    /// Every provider is initialized concurrently and all of them are awaited; a
    /// failing provider is logged and does not keep the others from starting.
    /// Providers from an earlier call are destroyed first.
    pub async fn initialize(&self, extra_providers: Vec<Arc<dyn NotificationProvider>>) {
        let mut providers = extra_providers;
        match StopProvider::new(self.stop_config.clone(), self.stop_handler()) {
            Ok(provider) => providers.push(Arc::new(provider)),
            Err(err) => error!(%err, "failed to build stop notification provider"),
        }

        let previous = std::mem::replace(&mut *self.lock_providers(), providers.clone());
        for provider in previous {
            provider.destroy();
        }

        let outcomes = join_all(providers.iter().map(|provider| async move {
            let outcome = AssertUnwindSafe(provider.initialize())
                .catch_unwind()
                .await;
            (provider.kind(), outcome)
        }))
        .await;

        let mut failed = 0usize;
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    warn!(%err, provider = kind.as_str(), "notification provider failed to initialize");
                }
                Err(_) => {
                    failed += 1;
                    warn!(provider = kind.as_str(), "notification provider panicked during initialize");
                }
            }
        }

        info!(
            providers = providers.len(),
            failed, "sdo notifications initialized"
        );
    }

    pub fn should_stop(&self) -> bool {
        self.stop_needed.load(Ordering::SeqCst)
    }

    /// Destroys every provider. Safe to call repeatedly and before `initialize`.
    pub fn stop(&self) {
        let providers = self.lock_providers().clone();
        for provider in &providers {
            provider.destroy();
        }
        info!(providers = providers.len(), "sdo notifications stopped");
    }

    pub fn provider_count(&self) -> usize {
        self.lock_providers().len()
    }

    fn stop_handler(&self) -> impl Fn() + Send + Sync + 'static {
        let stop_needed = Arc::clone(&self.stop_needed);
        let external = self.on_stop.clone();
        move || {
            if !stop_needed.swap(true, Ordering::SeqCst) {
                info!("managed platform requested stop");
            }
            if let Some(callback) = &external {
                if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                    warn!("stop notification callback panicked");
                }
            }
        }
    }

    fn lock_providers(&self) -> MutexGuard<'_, Vec<Arc<dyn NotificationProvider>>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SdoNotifications {
    fn default() -> Self {
        Self::new()
    }
}
