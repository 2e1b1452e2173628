use crate::group::CacheError;
use bytes::Bytes;
use log::debug;

/// Outbound client for a single remote peer.
///
/// `base` already contains the peer address and the cache base path, so a
/// fetch only appends the escaped group name and key as two path segments.
pub struct PeerClient {
    base: String,
    http: reqwest::Client,
}

impl PeerClient {
    pub(crate) fn new(base: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base: base.into(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Fetches the value bytes for `key` in `group` from this peer.
    ///
    /// Any transport failure or non-success status is a hard error; retry
    /// policy, if any, belongs to the caller.
    pub async fn fetch(&self, group: &str, key: &str) -> Result<Bytes, CacheError> {
        let url = format!(
            "{}{}/{}",
            self.base,
            urlencoding::encode(group),
            urlencoding::encode(key)
        );
        debug!("fetching {url}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CacheError::PeerFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::PeerFetch(format!("peer returned {status}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| CacheError::PeerFetch(format!("reading response body: {e}")))
    }
}
