use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::error::NotificationResult;

#[derive(Debug, Error)]
enum FetchError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported endpoint scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("endpoint responded with status {0}")]
    Status(StatusCode),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid JSON payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// GET-and-decode helper shared by every notification provider.
///
/// `fetch` never fails: a missing URL, a transport error, a non-2xx status and an
/// undecodable body all resolve to `None`. Providers call it from timer tasks, so
/// nothing here may panic or propagate.
#[derive(Clone)]
pub struct Fetcher {
    plain: Client,
    tls: Client,
}

impl Fetcher {
    pub fn new() -> NotificationResult<Self> {
        // Platform endpoints live on this host; never route them through a proxy.
        // The TLS endpoint serves a self-signed certificate scoped to this host, so
        // certificate validation is off. A 3xx is a failed fetch, not a hop.
        let tls = Client::builder()
            .no_proxy()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?;
        let plain = Client::builder()
            .no_proxy()
            .redirect(Policy::none())
            .build()?;
        Ok(Self { plain, tls })
    }

    pub async fn fetch<T: DeserializeOwned>(&self, url: Option<&str>) -> Option<T> {
        let Some(url) = url else {
            debug!("endpoint not configured; skipping fetch");
            return None;
        };

        match self.try_fetch(url).await {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(%err, %url, "notification endpoint fetch failed");
                None
            }
        }
    }

    async fn try_fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let parsed = Url::parse(url)?;
        let client = match parsed.scheme() {
            "http" => &self.plain,
            "https" => &self.tls,
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        };

        let response = client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
