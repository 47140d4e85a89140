use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use sdo_notifications::config::EndpointSource;
use sdo_notifications::{
    NotificationError, NotificationProvider, NotificationResult, ProviderKind, SdoNotifications,
    StopProviderConfig,
};
use serde_json::json;
use tokio::time::{sleep, Instant};

#[derive(Default)]
struct CountingProvider {
    fail: bool,
    initialized: AtomicUsize,
    destroyed: AtomicUsize,
}

impl CountingProvider {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl NotificationProvider for CountingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom("counting")
    }

    async fn initialize(&self) -> NotificationResult<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotificationError::Message("provider refused to start".into()));
        }
        Ok(())
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

struct PanickingProvider;

#[async_trait]
impl NotificationProvider for PanickingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom("panicking")
    }

    async fn initialize(&self) -> NotificationResult<()> {
        panic!("provider blew up during initialize");
    }

    fn destroy(&self) {}
}

fn stop_config(endpoint: EndpointSource) -> StopProviderConfig {
    StopProviderConfig {
        endpoint,
        poll_interval: Duration::from_millis(50),
    }
}

async fn wait_for_stop(hub: &SdoNotifications, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if hub.should_stop() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    hub.should_stop()
}

#[tokio::test]
async fn stop_signal_is_observed_within_one_interval_and_stays_set() {
    let server = MockServer::start_async().await;
    let mut stop_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/stop");
            then.status(200).json_body(json!({ "stop": true }));
        })
        .await;

    let interval = Duration::from_millis(200);
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    let hub = SdoNotifications::with_stop_config(StopProviderConfig {
        endpoint: EndpointSource::fixed(server.url("/stop")),
        poll_interval: interval,
    })
    .on_stop(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let started = Instant::now();
    hub.initialize(Vec::new()).await;
    assert_eq!(hub.provider_count(), 1);
    assert!(!hub.should_stop());
    assert!(wait_for_stop(&hub, interval * 2).await);
    let observed_after = started.elapsed();
    assert!(
        observed_after <= interval + Duration::from_millis(150),
        "stop observed after {observed_after:?}"
    );
    assert!(notified.load(Ordering::SeqCst) >= 1);

    stop_mock.delete_async().await;
    let resume_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/stop");
            then.status(200).json_body(json!({ "stop": false }));
        })
        .await;

    let deadline = Instant::now() + Duration::from_secs(3);
    while resume_mock.hits_async().await < 2 && Instant::now() < deadline {
        sleep(Duration::from_millis(20)).await;
    }
    assert!(resume_mock.hits_async().await >= 2);
    assert!(hub.should_stop());

    hub.stop();
}

#[tokio::test]
async fn unset_stop_endpoint_never_stops() {
    let hub = SdoNotifications::with_stop_config(stop_config(EndpointSource::none()));

    hub.initialize(Vec::new()).await;
    sleep(Duration::from_millis(250)).await;
    assert!(!hub.should_stop());

    hub.stop();
    hub.stop();
    assert!(!hub.should_stop());
}

#[tokio::test]
async fn failing_provider_does_not_block_the_others() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/stop");
            then.status(200).json_body(json!({ "stop": true }));
        })
        .await;

    let failing = Arc::new(CountingProvider::failing());
    let healthy = Arc::new(CountingProvider::default());
    let hub = SdoNotifications::with_stop_config(stop_config(EndpointSource::fixed(
        server.url("/stop"),
    )));

    let providers: Vec<Arc<dyn NotificationProvider>> = vec![failing.clone(), healthy.clone()];
    hub.initialize(providers).await;

    assert_eq!(hub.provider_count(), 3);
    assert_eq!(failing.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.initialized.load(Ordering::SeqCst), 1);
    assert!(wait_for_stop(&hub, Duration::from_secs(3)).await);

    hub.stop();
    assert_eq!(failing.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stop_before_initialize_is_a_noop() {
    let hub = SdoNotifications::with_stop_config(stop_config(EndpointSource::none()));
    hub.stop();
    assert_eq!(hub.provider_count(), 0);
    assert!(!hub.should_stop());
}

#[tokio::test]
async fn reinitialize_destroys_previous_providers() {
    let hub = SdoNotifications::with_stop_config(stop_config(EndpointSource::none()));
    let first = Arc::new(CountingProvider::default());
    let second = Arc::new(CountingProvider::default());

    let initial: Vec<Arc<dyn NotificationProvider>> = vec![first.clone()];
    hub.initialize(initial).await;
    let replacement: Vec<Arc<dyn NotificationProvider>> = vec![second.clone()];
    hub.initialize(replacement).await;

    assert_eq!(first.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(second.destroyed.load(Ordering::SeqCst), 0);
    assert_eq!(hub.provider_count(), 2);

    hub.stop();
    assert_eq!(second.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_callback_still_sets_the_flag() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/stop");
            then.status(200).json_body(json!({ "stop": true }));
        })
        .await;

    let hub = SdoNotifications::with_stop_config(stop_config(EndpointSource::fixed(
        server.url("/stop"),
    )))
    .on_stop(|| panic!("host callback failure"));

    hub.initialize(Vec::new()).await;
    assert!(wait_for_stop(&hub, Duration::from_secs(3)).await);
    hub.stop();
}

#[tokio::test]
async fn panicking_provider_does_not_abort_initialize() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/stop");
            then.status(200).json_body(json!({ "stop": true }));
        })
        .await;

    let healthy = Arc::new(CountingProvider::default());
    let hub = SdoNotifications::with_stop_config(stop_config(EndpointSource::fixed(
        server.url("/stop"),
    )));

    let providers: Vec<Arc<dyn NotificationProvider>> =
        vec![Arc::new(PanickingProvider), healthy.clone()];
    hub.initialize(providers).await;

    assert_eq!(hub.provider_count(), 3);
    assert_eq!(healthy.initialized.load(Ordering::SeqCst), 1);
    assert!(wait_for_stop(&hub, Duration::from_secs(3)).await);

    hub.stop();
    assert_eq!(healthy.destroyed.load(Ordering::SeqCst), 1);
}
