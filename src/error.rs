//! Error types for the adaptor, and their mapping onto the canonical error envelope.

use std::fmt;

use thiserror::Error;

use crate::translate::openai_types::{CanonicalError, ErrorBody};

/// Error type tag used for failures raised inside the adaptor itself.
pub const ADAPTOR_ERROR_TYPE: &str = "sensetime_adaptor_error";

/// Error type tag used for failures reported by the vendor in `status.msg`.
pub const VENDOR_ERROR_TYPE: &str = "sensetime_error";

/// Which step of response handling failed. Each kind has its own canonical code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ReadBody,
    CloseBody,
    Unmarshal,
    Marshal,
    WriteStream,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::ReadBody => "read_response_body_failed",
            Self::CloseBody => "close_response_body_failed",
            Self::Unmarshal => "unmarshal_response_body_failed",
            Self::Marshal => "marshal_response_body_failed",
            Self::WriteStream => "write_stream_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AdaptorError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Credential error: {message}")]
    Credential { message: String },

    #[error("Transport error ({kind}): {message}")]
    Transport { kind: FailureKind, message: String },

    #[error("Decode error ({kind}): {message}")]
    Decode { kind: FailureKind, message: String },

    #[error("Vendor error {code}: {message}")]
    Vendor {
        code: i64,
        message: String,
        status: u16,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AdaptorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential {
            message: msg.into(),
        }
    }

    pub fn read_body(err: impl fmt::Display) -> Self {
        Self::Transport {
            kind: FailureKind::ReadBody,
            message: err.to_string(),
        }
    }

    pub fn close_body(err: impl fmt::Display) -> Self {
        Self::Transport {
            kind: FailureKind::CloseBody,
            message: err.to_string(),
        }
    }

    pub fn write_stream(err: impl fmt::Display) -> Self {
        Self::Transport {
            kind: FailureKind::WriteStream,
            message: err.to_string(),
        }
    }

    pub fn unmarshal(err: impl fmt::Display) -> Self {
        Self::Decode {
            kind: FailureKind::Unmarshal,
            message: err.to_string(),
        }
    }

    pub fn marshal(err: impl fmt::Display) -> Self {
        Self::Decode {
            kind: FailureKind::Marshal,
            message: err.to_string(),
        }
    }

    /// HTTP status the canonical error is written with.
    ///
    /// Vendor failures keep the status observed on the wire; everything raised
    /// locally is a 500, except request validation which is the caller's fault.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Vendor { status, .. } => *status,
            Self::Validation { .. } => 400,
            _ => 500,
        }
    }

    /// Normalize into the canonical error envelope returned to the gateway.
    pub fn to_canonical(&self) -> CanonicalError {
        let (message, error_type, code) = match self {
            Self::Vendor { code, message, .. } => {
                (message.clone(), VENDOR_ERROR_TYPE, serde_json::json!(code))
            }
            Self::Transport { kind, message } | Self::Decode { kind, message } => {
                (message.clone(), ADAPTOR_ERROR_TYPE, serde_json::json!(kind.code()))
            }
            Self::Validation { message } => (
                message.clone(),
                "invalid_request_error",
                serde_json::json!("invalid_request"),
            ),
            Self::Credential { message } => (
                message.clone(),
                ADAPTOR_ERROR_TYPE,
                serde_json::json!("get_credential_failed"),
            ),
            Self::Config { message } => (
                message.clone(),
                ADAPTOR_ERROR_TYPE,
                serde_json::json!("invalid_configuration"),
            ),
            Self::Http(e) => (
                e.to_string(),
                ADAPTOR_ERROR_TYPE,
                serde_json::json!("do_request_failed"),
            ),
            Self::Io(e) => (e.to_string(), ADAPTOR_ERROR_TYPE, serde_json::json!("io_error")),
            Self::Toml(e) => (
                e.to_string(),
                ADAPTOR_ERROR_TYPE,
                serde_json::json!("invalid_configuration"),
            ),
        };

        CanonicalError {
            error: ErrorBody {
                message,
                error_type: error_type.to_string(),
                param: String::new(),
                code,
            },
            status_code: self.status_code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdaptorError>;
