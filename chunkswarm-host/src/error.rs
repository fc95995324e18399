/// Why `SwarmService::fetch` produced no chunk.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("swarm could not deliver and no origin is configured")]
    Unavailable,
    #[error("superseded by a newer request")]
    Superseded,
    #[error("origin request failed: {0}")]
    Origin(#[from] reqwest::Error),
    #[error("origin returned {0}")]
    Status(reqwest::StatusCode),
}
