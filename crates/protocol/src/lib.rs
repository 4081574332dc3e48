// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mimolo-protocol: Agent JLP codec and command bridge wire format.

pub mod codec;
pub mod command;
pub mod envelope;
pub mod wire;

pub use codec::{parse_line, encode_line, CodecError, MAX_LINE_SIZE as AGENT_MAX_LINE_SIZE};
pub use command::{BridgeErrorCode, BridgeRequest, BridgeResponse};
pub use envelope::{ActivityMode, ActivitySignal, Envelope, ProtocolMessage, AGENT_PROTOCOL_VERSION};
pub use wire::{read_request, write_response, WireError, DEFAULT_READ_TIMEOUT};
