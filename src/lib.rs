//! Sidecar integration with the managed platform's local control plane.
//!
//! [`SdoNotifications`] polls the platform's stop endpoint and exposes a monotonic
//! stop flag. A [`CredentialProvider`] keeps the process' cloud credentials in the
//! `AWS_*` environment variables fresh. Both endpoints are optional: without them
//! every provider is inert, which is the expected local/dev setup.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod hub;
pub mod providers;
pub mod sink;

pub use error::{NotificationError, NotificationResult};
pub use fetcher::Fetcher;
pub use hub::SdoNotifications;
pub use providers::credentials::{refresh_delay, CredentialsPayload, Expiration};
pub use providers::stop::StopSignal;
pub use providers::{
    CredentialProvider, CredentialProviderConfig, NotificationProvider, ProviderKind,
    StopProvider, StopProviderConfig,
};
pub use sink::{CredentialSet, CredentialSink, EnvCredentialSink, InMemoryCredentialSink};
