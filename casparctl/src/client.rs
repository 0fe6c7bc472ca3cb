//! HTTP client for the casparclock API

use anyhow::{bail, Context, Result};
use caspar_amcp::{
    AutoUpdateRequest, AutoUpdateResponse, ClockUpdateResult, ConnectionStatus,
    ConnectionStatusDetails, ErrorBody, ToggleRequest, ToggleResponse, API_PREFIX,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const DEFAULT_URL: &str = "http://127.0.0.1:3000";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}{}", url.trim_end_matches('/'), API_PREFIX),
        }
    }

    pub async fn connect(&self) -> Result<ConnectionStatus> {
        self.post("/connect", None::<&()>).await
    }

    pub async fn update_clock(&self) -> Result<ClockUpdateResult> {
        self.post("/clock/update", None::<&()>).await
    }

    pub async fn toggle_overlay(&self, visible: bool) -> Result<ToggleResponse> {
        self.post("/clock/toggle", Some(&ToggleRequest { visible }))
            .await
    }

    pub async fn set_auto_update(&self, enabled: bool) -> Result<AutoUpdateResponse> {
        self.post("/settings/auto-update", Some(&AutoUpdateRequest { enabled }))
            .await
    }

    pub async fn status(&self) -> Result<ConnectionStatusDetails> {
        let url = self.url("/status");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| self.unreachable())?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(&self) -> String {
        format!("failed to reach casparclock at {} - is it running?", self.base_url)
    }

    async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.with_context(|| self.unreachable())?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => "no error details".to_string(),
        };
        bail!("casparclock returned {status}: {message}");
    }
    response
        .json()
        .await
        .context("casparclock sent an unexpected response")
}
