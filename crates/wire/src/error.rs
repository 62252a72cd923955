// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable wire error codes.

use serde::{Deserialize, Serialize};

/// Error kinds carried in response `error.code`.
///
/// Codes are stable integers in the 100 range; clients match on the code,
/// never the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Socket unreachable or handshake failed. Produced client-side only.
    DaemonUnavailable,
    UnknownMethod,
    InvalidParams,
    NotFound,
    InvalidState,
    /// Start refused by the circuit breaker; `data.retryAfterMs` says when
    /// to try again.
    CircuitOpen,
    SpawnFailed,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            Self::DaemonUnavailable => 100,
            Self::UnknownMethod => 101,
            Self::InvalidParams => 102,
            Self::NotFound => 103,
            Self::InvalidState => 104,
            Self::CircuitOpen => 105,
            Self::SpawnFailed => 106,
            Self::Timeout => 107,
            Self::Internal => 108,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            100 => Some(Self::DaemonUnavailable),
            101 => Some(Self::UnknownMethod),
            102 => Some(Self::InvalidParams),
            103 => Some(Self::NotFound),
            104 => Some(Self::InvalidState),
            105 => Some(Self::CircuitOpen),
            106 => Some(Self::SpawnFailed),
            107 => Some(Self::Timeout),
            108 => Some(Self::Internal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        unavailable = { ErrorKind::DaemonUnavailable },
        unknown = { ErrorKind::UnknownMethod },
        params = { ErrorKind::InvalidParams },
        not_found = { ErrorKind::NotFound },
        state = { ErrorKind::InvalidState },
        circuit = { ErrorKind::CircuitOpen },
        spawn = { ErrorKind::SpawnFailed },
        timeout = { ErrorKind::Timeout },
        internal = { ErrorKind::Internal },
    )]
    fn code_round_trips(kind: ErrorKind) {
        assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(ErrorKind::from_code(42), None);
    }
}
