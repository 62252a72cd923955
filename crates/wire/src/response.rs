// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response and notification envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ErrorKind;

/// Response to a request: `{"id", "result"}` or `{"id", "error"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Error { error: ErrorBody },
    Result { result: Value },
}

/// Wire error payload. `data` carries kind-specific detail, e.g.
/// `retryAfterMs` for `circuit_open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self { id, outcome: Outcome::Result { result } }
    }

    pub fn error(id: u64, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error {
                error: ErrorBody { code: kind.code(), message: message.into(), data: None },
            },
        }
    }

    pub fn error_with_data(
        id: u64,
        kind: ErrorKind,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id,
            outcome: Outcome::Error {
                error: ErrorBody { code: kind.code(), message: message.into(), data: Some(data) },
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error { .. })
    }

    /// The error kind, when this is an error response with a known code.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Error { error } => ErrorKind::from_code(error.code),
            Outcome::Result { .. } => None,
        }
    }
}

/// A streamed notification: shares the id of the originating request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub event: String,
    pub data: Value,
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
