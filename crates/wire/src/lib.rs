// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol for host↔worker communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Both endpoints are local Unix-domain stream sockets; the forward channel
//! carries plugin commands, the reverse channel carries token callbacks.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod forward;
mod frame;
mod reverse;

pub use error::ErrorCode;
pub use forward::{ForwardRequest, ForwardResponse};
pub use frame::{
    decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError,
    MAX_FRAME_BYTES,
};
pub use reverse::{ReverseRequest, ReverseResponse};
