//! HTTP request layer.
//!
//! Two request shapes exist:
//! - signed: canonical payload bytes as the body, `X-Signature` header
//! - JSON: unsigned, for non-sensitive queries only
//!
//! The wire is behind `HttpTransport` so services can be exercised without a
//! server. Any non-success status is a `ClientError::Network`; nothing here
//! retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use lc_proto::api::{SIGNATURE_HEADER, SIGNED_CONTENT_TYPE};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::Signer;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub route: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    /// Base64 signature for the `X-Signature` header.
    pub signature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Proto(e.into()))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `request` to `route`. Non-success statuses are returned, not raised.
    async fn post(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lattice-contact/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = format!("{}/{}", self.base_url, request.route);
        let mut builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .body(request.body);
        if let Some(sig) = request.signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }
        let res = builder
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = res.status().as_u16();
        let body = res
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?
            .to_vec();
        Ok(ApiResponse { status, body })
    }
}

/// Builds and sends requests. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn post_signed<P: Serialize>(
        &self,
        route: &str,
        payload: &P,
        signer: &Signer,
    ) -> Result<ApiResponse, ClientError> {
        let signed = signer.sign_request(payload)?;
        let signature = Some(signed.signature_b64());
        self.send(ApiRequest {
            route: route.to_string(),
            body: signed.body,
            content_type: SIGNED_CONTENT_TYPE,
            signature,
        })
        .await
    }

    pub async fn post_json<Q: Serialize>(&self, route: &str, query: &Q) -> Result<ApiResponse, ClientError> {
        let body = serde_json::to_vec(query).map_err(|e| ClientError::Proto(e.into()))?;
        self.send(ApiRequest {
            route: route.to_string(),
            body,
            content_type: JSON_CONTENT_TYPE,
            signature: None,
        })
        .await
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let route = request.route.clone();
        let res = self.transport.post(request).await?;
        if !res.is_success() {
            tracing::debug!(%route, status = res.status, "[api] request rejected");
            return Err(ClientError::Network(format!("{route} returned HTTP {}", res.status)));
        }
        Ok(res)
    }
}
