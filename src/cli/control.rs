//! HTTP client for the local API of a running service.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Client for the loopback control API.
pub struct ControlClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub recording: bool,
    pub output_path: Option<String>,
    pub duration_seconds: Option<u64>,
    pub auto_record: bool,
    pub connected: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl ControlClient {
    pub fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{}", port),
        }
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .context("Failed to reach teams-helper. Is the service running?")?;
        Self::parse(response).await
    }

    pub async fn start(&self) -> Result<Value> {
        self.post("/recording/start").await
    }

    pub async fn stop(&self) -> Result<Value> {
        self.post("/recording/stop").await
    }

    pub async fn open_folder(&self) -> Result<Value> {
        self.post("/open-folder").await
    }

    pub async fn set_auto_record(&self, enabled: bool) -> Result<Value> {
        let response = self
            .client
            .put(format!("{}/auto-record", self.base_url))
            .json(&json!({ "enabled": enabled }))
            .send()
            .await
            .context("Failed to reach teams-helper. Is the service running?")?;
        Self::parse(response).await
    }

    async fn post(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .context("Failed to reach teams-helper. Is the service running?")?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.message)
                .unwrap_or_else(|_| status.to_string());
            bail!("{}", message);
        }
        response
            .json::<T>()
            .await
            .context("Unexpected response from teams-helper")
    }
}
