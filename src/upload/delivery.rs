use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::error::DeliveryError;
use crate::segment::{CaptureMode, SegmentDescriptor};

/// Remote endpoint that accepts finished segments
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transfer one payload. Any error counts as a failed attempt.
    async fn deliver(&self, segment: &SegmentDescriptor, payload: Vec<u8>) -> Result<(), DeliveryError>;

    /// Whether the caller currently holds upload credentials
    fn is_authorized(&self) -> bool {
        true
    }

    /// Get uploader name for logging
    fn name(&self) -> &str;
}

/// Supplies the bearer token, owned by the external auth flow
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Token slot the auth collaborator writes into
pub struct SharedToken {
    tx: watch::Sender<Option<String>>,
}

impl SharedToken {
    pub fn new(initial: Option<String>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, token: Option<String>) {
        self.tx.send_replace(token);
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.tx.borrow().clone()
    }
}

fn mime_type(mode: CaptureMode) -> &'static str {
    match mode {
        CaptureMode::Audio => "audio/wav",
        CaptureMode::Screen => "video/webm",
    }
}

/// Delivers segments as `multipart/form-data` POSTs
///
/// Form fields:
/// - `file`: payload, named after the segment filename
/// - `segment_id`, `sequence`: text
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            tokens: None,
        })
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn deliver(&self, segment: &SegmentDescriptor, payload: Vec<u8>) -> Result<(), DeliveryError> {
        let size = payload.len();
        let part = Part::bytes(payload)
            .file_name(segment.filename.clone())
            .mime_str(mime_type(segment.mode))?;

        let form = Form::new()
            .part("file", part)
            .text("segment_id", segment.id.to_string())
            .text("sequence", segment.sequence.to_string());

        let mut request = self.client.post(&self.endpoint).multipart(form);

        if let Some(tokens) = &self.tokens {
            match tokens.token() {
                Some(token) => request = request.bearer_auth(token),
                None => return Err(DeliveryError::Unauthorized),
            }
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        debug!(
            "Uploaded {} ({} bytes) -> {}",
            segment.filename, size, status
        );

        Ok(())
    }

    fn is_authorized(&self) -> bool {
        self.tokens
            .as_ref()
            .map_or(true, |tokens| tokens.token().is_some())
    }

    fn name(&self) -> &str {
        "http"
    }
}
