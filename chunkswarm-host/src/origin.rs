//! Origin fallback: plain HTTP GET of the resource when the swarm fails.

use chunkswarm_core::ResourceId;

use crate::error::FetchError;

#[derive(Debug, Clone)]
pub struct OriginClient {
    base: String,
    http: reqwest::Client,
}

impl OriginClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Resource ids are appended to the base URL as a path.
    pub fn url_for(&self, resource: &ResourceId) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            resource.as_str().trim_start_matches('/')
        )
    }

    pub async fn get(&self, resource: &ResourceId) -> Result<Vec<u8>, FetchError> {
        let resp = self.http.get(self.url_for(resource)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
