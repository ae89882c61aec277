use rmq_core::CodecError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error on {addr}: {reason}")]
    Network { addr: String, reason: String },

    #[error("no response from {addr} within {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    #[error("request code {code} to {addr} failed with status {status}: {remark}")]
    ErrorStatus {
        addr: String,
        code: i32,
        status: i32,
        remark: String,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),
}

impl ClientError {
    pub(crate) fn network(addr: &str, reason: impl ToString) -> Self {
        ClientError::Network {
            addr: addr.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn timeout(addr: &str, timeout: Duration) -> Self {
        ClientError::Timeout {
            addr: addr.to_string(),
            timeout,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// Non-success status codes and undecodable bodies are both protocol failures.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            ClientError::ErrorStatus { .. } | ClientError::Protocol(_)
        )
    }
}
