use super::DeliveryChannel;
use crate::config::DeliveryConfig;
use crate::domain::VmRecord;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

/// Channel towards the remote accounting service over its HTTP ingest API.
/// One JSON record per `write`; the session is opened by `send_identifier`
/// and closed by `finish`.
pub struct HttpDeliveryChannel {
    client: reqwest::Client,
    base_url: String,
    site_name: String,
}

impl HttpDeliveryChannel {
    pub fn new(config: &DeliveryConfig, site_name: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            site_name,
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::Delivery(format!(
                "{} returned {}",
                url, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryChannel for HttpDeliveryChannel {
    async fn write(&self, record: &VmRecord) -> Result<()> {
        let body = serde_json::to_value(record)?;
        self.post("records", &body).await?;
        debug!(vm_uuid = %record.vm_uuid, "record delivered");
        Ok(())
    }

    async fn send_identifier(&self) -> Result<()> {
        self.post("identifier", &json!({ "site_name": self.site_name }))
            .await
    }

    async fn finish(&self) {
        if let Err(e) = self.post("finish", &json!({})).await {
            error!(error = %e, "error closing delivery session");
        }
    }
}
