//! Pinata IPFS pinning client

use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tunemint_common::config::IpfsConfig;

#[derive(Debug, Error)]
pub enum IpfsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Pinning API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Read {0} failed: {1}")]
    Io(String, std::io::Error),
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

pub struct IpfsClient {
    http_client: reqwest::Client,
    api_url: String,
    jwt: String,
    gateway_url: String,
}

impl IpfsClient {
    /// `None` when no JWT is configured
    pub fn from_config(config: &IpfsConfig) -> Result<Option<Self>, IpfsError> {
        let Some(jwt) = config.jwt.clone() else {
            return Ok(None);
        };
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| IpfsError::Network(e.to_string()))?;

        Ok(Some(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            jwt,
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
        }))
    }

    /// Public URL of a pinned CID
    pub fn gateway_url(&self, cid: &str) -> String {
        format!("{}/{}", self.gateway_url, cid)
    }

    /// Pin a local file, returning its CID
    pub async fn pin_file(&self, path: &Path, name: &str) -> Result<String, IpfsError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IpfsError::Io(path.display().to_string(), e))?;
        let size = bytes.len();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime_for(path))
            .map_err(|e| IpfsError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("pinataMetadata", json!({ "name": name }).to_string());

        let response = self
            .http_client
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IpfsError::Network(e.to_string()))?;

        let cid = Self::read_cid(response).await?;
        info!(name, size, cid = %cid, "Pinned file");
        Ok(cid)
    }

    /// Pin a JSON document, returning its CID
    pub async fn pin_json(&self, content: &Value, name: &str) -> Result<String, IpfsError> {
        let body = json!({
            "pinataContent": content,
            "pinataMetadata": { "name": name },
        });

        let response = self
            .http_client
            .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| IpfsError::Network(e.to_string()))?;

        let cid = Self::read_cid(response).await?;
        info!(name, cid = %cid, "Pinned JSON");
        Ok(cid)
    }

    async fn read_cid(response: reqwest::Response) -> Result<String, IpfsError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(IpfsError::Api(status.as_u16(), text));
        }
        let pin: PinResponse = response
            .json()
            .await
            .map_err(|e| IpfsError::Parse(e.to_string()))?;
        Ok(pin.ipfs_hash)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
