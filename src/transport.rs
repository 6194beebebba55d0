use crate::{config::USER_AGENT, error::Result};
use reqwest::blocking::Client;
use std::{io::Read, time::Duration};
use thiserror::Error;

/// Why a single transfer attempt failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    /// Everything except cancellation is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Opens a byte stream for a URL. The engine only ever reads the stream
/// sequentially from one worker.
pub trait Transport: Send + Sync {
    fn open(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, TransferError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// `timeout` bounds each whole request, so a stalled connection ends the
    /// attempt instead of hanging a worker.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, TransferError> {
        let res = self
            .client
            .get(url)
            .send()
            .map_err(|e| TransferError::Network(e.to_string()))?;

        let status = res.status();

        if !status.is_success() {
            return Err(TransferError::Http {
                status: status.as_u16(),
            });
        }

        Ok(Box::new(res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancellation_is_final() {
        assert!(TransferError::Http { status: 503 }.is_retryable());
        assert!(
            TransferError::HashMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .is_retryable()
        );
        assert!(!TransferError::Cancelled.is_retryable());
    }
}
