use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::error::NotificationResult;

pub mod credentials;
pub mod stop;

pub use credentials::{CredentialProvider, CredentialProviderConfig};
pub use stop::{StopProvider, StopProviderConfig};

// key: notification-providers -> initialize,destroy

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Stop,
    Credentials,
    Custom(&'static str),
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stop => "stop",
            ProviderKind::Credentials => "credentials",
            ProviderKind::Custom(name) => name,
        }
    }
}

/// A polling unit reacting to one platform signal.
///
/// `initialize` arms at most one live timer for the provider; calling it again
/// replaces that timer. `destroy` cancels it and must be safe to call at any point,
/// including before `initialize` and more than once.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn initialize(&self) -> NotificationResult<()>;

    fn destroy(&self);
}

/// Owner of a provider's background timer task.
///
/// Every `disarm` bumps an epoch. A timer prepared under an older epoch is aborted
/// instead of armed, so an `initialize` racing with `destroy` cannot leave a task
/// behind.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    state: Mutex<TimerState>,
}

#[derive(Debug, Default)]
struct TimerState {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Installs `handle`, aborting any previous timer. Returns `false` and aborts
    /// `handle` when the slot was disarmed after `epoch` was read.
    pub(crate) fn arm(&self, epoch: u64, handle: JoinHandle<()>) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            handle.abort();
            return false;
        }
        if let Some(previous) = state.handle.replace(handle) {
            previous.abort();
        }
        true
    }

    /// Cancels the pending timer, if any. Returns whether a timer was cancelled.
    pub(crate) fn disarm(&self) -> bool {
        let mut state = self.lock();
        state.epoch = state.epoch.wrapping_add(1);
        match state.handle.take() {
            Some(handle) => {
                let live = !handle.is_finished();
                handle.abort();
                live
            }
            None => false,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.lock()
            .handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.disarm();
    }
}
