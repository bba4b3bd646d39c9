//! Instance metadata client (IMDSv2).
//!
//! Runs on the provisioned instance. Every read first obtains a short-lived
//! session token with `PUT /latest/api/token`, then sends it back in the
//! `X-aws-ec2-metadata-token` header.

use std::time::Duration;

/// Link-local metadata endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://169.254.169.254";

/// Lifetime requested for session tokens.
const TOKEN_TTL_SECS: u32 = 60;

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Errors from the metadata service.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The HTTP request itself failed (not on EC2, network, timeout).
    #[error("Metadata request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status other than 404.
    #[error("Metadata service error ({status}): {body}")]
    Status { status: u16, body: String },
}

/// HTTP client for the instance metadata service.
#[derive(Debug, Clone)]
pub struct InstanceMetadata {
    client: reqwest::Client,
    endpoint: String,
}

impl InstanceMetadata {
    /// Create a client for `endpoint`, e.g. [`DEFAULT_ENDPOINT`].
    pub fn new(endpoint: impl Into<String>) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    /// ID of the instance this process runs on.
    pub async fn instance_id(&self) -> Result<Option<String>, MetadataError> {
        self.get("meta-data/instance-id").await
    }

    /// Region of the instance, e.g. `eu-west-2`.
    pub async fn region(&self) -> Result<Option<String>, MetadataError> {
        self.get("meta-data/placement/region").await
    }

    /// Pending spot interruption notice, if any.
    ///
    /// The body is the raw JSON notice (`{"action": "terminate", ...}`);
    /// the service answers 404 until a notice is issued.
    pub async fn spot_instance_action(&self) -> Result<Option<String>, MetadataError> {
        self.get("meta-data/spot/instance-action").await
    }

    async fn token(&self) -> Result<String, MetadataError> {
        let response = self
            .client
            .put(format!("{}/latest/api/token", self.endpoint))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }

    /// `GET /latest/{path}`; a 404 maps to `None`.
    async fn get(&self, path: &str) -> Result<Option<String>, MetadataError> {
        let token = self.token().await?;
        let response = self
            .client
            .get(format!("{}/latest/{path}", self.endpoint))
            .header(TOKEN_HEADER, token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::ensure_success(response).await?;
        Ok(Some(response.text().await?.trim().to_string()))
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, MetadataError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(MetadataError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
