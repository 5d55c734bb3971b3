//! Cloud store upload
//!
//! One record is one POST. Nothing here retries; the caller decides what a
//! failed upload means.

mod client;

pub use client::CloudClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// A completed HTTP exchange, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("uplink is not connected")]
    NotConnected,

    #[error("no response from cloud: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Destination for upload bodies
#[async_trait]
pub trait CloudSink: Send + Sync {
    /// POST one JSON body. Any HTTP status is a completed request.
    async fn post(&self, body: &str) -> Result<CloudResponse, UploadError>;
}
