use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::command::Command;
use crate::config::ApiConfig;

/// Destination for parsed commands.
///
/// `send` never fails: delivery problems are the sink's to log, and the
/// pipeline moves on either way.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: &Command);
}

/// Posts commands to the topic API.
pub struct Forwarder {
    client: reqwest::Client,
    config: ApiConfig,
}

impl Forwarder {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    /// Single POST attempt. Errors carry the status and response body.
    pub async fn try_send(&self, command: &Command) -> Result<()> {
        debug!("Sending topic to {}", self.config.url);

        let mut request = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("Authorization", &self.config.token)
            .json(command);
        if let Some(env) = self.config.env_header() {
            request = request.header("x-env", env);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to topic API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Topic API error ({}): {}", status, error_body);
        }

        Ok(())
    }
}

#[async_trait]
impl CommandSink for Forwarder {
    async fn send(&self, command: &Command) {
        info!("Adding topic: {}", command.topic);
        if let Err(e) = self.try_send(command).await {
            error!("Failed to add topic: {:#}", e);
        }
    }
}
