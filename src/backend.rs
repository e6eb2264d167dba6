use crate::details::TransactionDetails;
use crate::notification::Notification;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

/// REST backend the engine synchronizes against. The trait seam exists so the
/// store and cache can be driven by a mock in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Most recent notifications for an account, newest first, bounded by `limit`.
    async fn list_notifications(&self, account_id: &str, limit: usize)
        -> Result<Vec<Notification>>;
    /// Mark one notification read. Idempotent server-side.
    async fn mark_read(&self, id: &str) -> Result<()>;
    /// Mark everything read for an account.
    async fn mark_all_read(&self, account_id: &str) -> Result<()>;
    /// Enrichment payload for a completed transaction.
    async fn transaction_details(&self, transaction_id: &str) -> Result<TransactionDetails>;
}

/// reqwest implementation against the notification REST service.
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = match Client::builder()
            .user_agent(crate::version::get_useragent())
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("failed to build http client, using defaults: {}", e);
                Client::new()
            }
        };
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl NotificationBackend for HttpBackend {
    async fn list_notifications(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let url = self.url(&format!("/notifications/{}", account_id));
        debug!(url, limit, "pulling notification snapshot");
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "snapshot request failed: {} {}",
                response.status(),
                url
            ));
        }
        Ok(response.json().await?)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/notifications/{}/read", id));
        let response = self.client.patch(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("mark-read failed: {} {}", response.status(), url));
        }
        Ok(())
    }

    async fn mark_all_read(&self, account_id: &str) -> Result<()> {
        let url = self.url(&format!("/notifications/user/{}/read-all", account_id));
        let response = self.client.patch(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "mark-all-read failed: {} {}",
                response.status(),
                url
            ));
        }
        Ok(())
    }

    async fn transaction_details(&self, transaction_id: &str) -> Result<TransactionDetails> {
        let url = self.url(&format!("/transaction/details/{}", transaction_id));
        debug!(url, "fetching transaction details");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "detail fetch failed: {} {}",
                response.status(),
                url
            ));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://127.0.0.1:8080/");
        assert_eq!(
            backend.url("/notifications/acc-1"),
            "http://127.0.0.1:8080/notifications/acc-1"
        );
    }
}
