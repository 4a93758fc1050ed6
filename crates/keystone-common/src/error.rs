//! Stable machine-readable error surface
//!
//! Every denial or failure that crosses a Keystone API boundary carries a
//! stable snake_case code plus a human-safe message. Internal details (stack
//! traces, upstream payloads) never appear in either field.

use serde::{Deserialize, Serialize};

/// Wire shape for any denial or failure returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `daily_limit_reached`.
    pub code: String,
    /// Human-safe message. Safe to show to the tenant verbatim.
    pub message: String,
}

impl ErrorBody {
    /// Build a body from a code and message.
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Implemented by every error enum that crosses an API boundary.
///
/// `Display` is the human-safe message; `code` is the stable contract that
/// callers may match on.
pub trait ApiError: std::error::Error {
    /// Stable machine-readable code for this error.
    fn code(&self) -> &'static str;

    /// Convert to the wire shape.
    fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.to_string())
    }
}
