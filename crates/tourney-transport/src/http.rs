//! HTTP snapshot store.
//!
//! Talks to the server's `/tournament` endpoints. Every write replaces the
//! whole snapshot.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tourney_core::{SnapshotStore, StoreError};
use tourney_protocol::TournamentSnapshot;
use tracing::debug;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`SnapshotStore`] backed by the Tourney HTTP API.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

impl HttpStore {
    /// Create a store for the server at `base_url` (e.g. `http://127.0.0.1:8080`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a store with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Server base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map a non-success response to [`StoreError::Rejected`].
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn unavailable(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl SnapshotStore for HttpStore {
    async fn load(&self) -> Result<Option<TournamentSnapshot>, StoreError> {
        let response = self
            .client
            .get(self.url("/tournament"))
            .send()
            .await
            .map_err(unavailable)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        check(response)
            .await?
            .json::<Option<TournamentSnapshot>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn save(&self, snapshot: &TournamentSnapshot) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("/tournament"))
            .json(snapshot)
            .send()
            .await
            .map_err(unavailable)?;

        check(response).await?;
        debug!(last_updated = snapshot.last_updated, "Snapshot saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("/tournament/reset"))
            .send()
            .await
            .map_err(unavailable)?;

        check(response).await?;
        debug!("Snapshot cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let store = HttpStore::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(store.base_url(), "http://127.0.0.1:8080");
        assert_eq!(store.url("/tournament"), "http://127.0.0.1:8080/tournament");
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let store = HttpStore::with_timeout("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            store.load().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
