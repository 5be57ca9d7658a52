//! Provider error classification for ranged log queries.
//!
//! RPC providers cap `eth_getLogs` windows in different ways and report
//! it with different codes and messages. The classifier checks the
//! structured JSON-RPC code first and falls back to matching known
//! message fragments. This is best-effort: providers change their error
//! text without notice.

use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON-RPC codes providers use for "range or result set too large".
const RANGE_LIMIT_CODES: &[i64] = &[
    -32005, // Infura / geth: limit exceeded
    -32614, // "eth_getLogs is limited to a N block range"
];

/// JSON-RPC codes that will never succeed on retry.
const FATAL_CODES: &[i64] = &[
    -32600, // invalid request
    -32601, // method not found
];

/// Lower-cased message fragments that identify a range limit.
const RANGE_LIMIT_FRAGMENTS: &[&str] = &[
    "maximum rpc range limit",
    "too many results",
    "log response size exceeded",
    "query returned more than",
    "block range is too large",
    "block range too large",
    "exceed maximum block range",
    "range too large",
    "response size should not greater than",
];

/// Lower-cased message fragments that identify unrecoverable failures.
const FATAL_FRAGMENTS: &[&str] = &[
    "unauthorized",
    "invalid api key",
    "method not found",
    "forbidden",
];

/// A provider error stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFailure {
    /// JSON-RPC error code, when the provider returned an error object.
    pub code: Option<i64>,
    pub message: String,
}

impl RpcFailure {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A failure with no JSON-RPC error object (socket, timeout, decode).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "rpc error {code}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RpcFailure {}

/// Outcome of classifying a failed range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorClass {
    /// Window too wide; shrink and retry.
    RangeLimit,
    /// Will not succeed on retry.
    Fatal,
    /// Not recognised.
    Unknown,
}

/// Classify a provider failure.
///
/// A range-limit code wins outright. A fatal code is only trusted when
/// the message does not also describe a range limit, since some
/// providers reuse generic codes for window errors.
pub fn classify(failure: &RpcFailure) -> QueryErrorClass {
    let message = failure.message.to_lowercase();
    let message_says_range = RANGE_LIMIT_FRAGMENTS.iter().any(|f| message.contains(f));

    if let Some(code) = failure.code {
        if RANGE_LIMIT_CODES.contains(&code) {
            return QueryErrorClass::RangeLimit;
        }
        if FATAL_CODES.contains(&code) && !message_says_range {
            return QueryErrorClass::Fatal;
        }
    }

    if message_says_range {
        QueryErrorClass::RangeLimit
    } else if FATAL_FRAGMENTS.iter().any(|f| message.contains(f)) {
        QueryErrorClass::Fatal
    } else {
        QueryErrorClass::Unknown
    }
}
