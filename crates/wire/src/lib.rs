// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: 4-byte length prefix (little-endian) + JSON payload.
//! Three message shapes travel over a connection: requests (client to
//! daemon), responses (one per request id), and notifications (streamed
//! for long-running requests, sharing the originating request id).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod framing;
mod request;
mod response;
mod types;

pub use error::ErrorKind;
pub use framing::{
    decode, encode, read_message, read_message_timeout, write_message, write_message_timeout,
    FramingError, MAX_FRAME_LEN,
};
pub use request::{Method, Request};
pub use response::{ErrorBody, Notification, Outcome, Response};
pub use types::{DaemonStatus, InputResult, LogTail, ProcessStatusEntry};

#[cfg(test)]
mod property_tests;
