use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
}

pub type NotificationResult<T> = Result<T, NotificationError>;
