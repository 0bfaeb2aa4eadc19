//! Refresh notification
//!
//! After a successful mirror flush the downstream viewer is poked so it
//! re-reads the partition file. Strictly fire-and-forget: the call runs on
//! a detached task, failures are logged at debug, and nothing about the
//! flush result depends on it.

use std::time::Duration;

use tracing::debug;

#[derive(Clone)]
pub struct RefreshNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl RefreshNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Fire the notification without awaiting its outcome.
    pub fn notify(&self, partition: &str) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let client = self.client.clone();
        let partition = partition.to_string();

        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&serde_json::json!({ "partition": partition }))
                .send()
                .await;
            match result {
                Ok(resp) => {
                    debug!(url = %url, status = %resp.status(), "Refresh notification sent")
                }
                Err(e) => debug!(url = %url, error = %e, "Refresh notification failed"),
            }
        });
    }
}
