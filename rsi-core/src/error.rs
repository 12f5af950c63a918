// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Closed error taxonomy for the endpoint's public API.
///
/// Every fallible operation returns one of these instead of panicking or
/// propagating an opaque `anyhow`/`Box<dyn Error>`. Inside the I/O engine,
/// parse and transmit failures never surface as an `RsiError` at all — they
/// are absorbed per-datagram (see `engine::run`); this taxonomy only covers
/// the boundary the application actually observes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RsiError {
    #[error("subsystem initialization failed, or the call is illegal from the current state")]
    InitFailed,

    #[error("the engine is already initialized or running")]
    AlreadyRunning,

    #[error("the engine is not running")]
    NotRunning,

    #[error("socket creation, bind, or non-blocking configuration failed")]
    SocketFailed,

    #[error("the engine thread could not be spawned")]
    ThreadFailed,

    #[error("a required output pointer or argument was invalid")]
    InvalidParam,

    #[error("operation timed out")]
    Timeout,

    #[error("unknown error")]
    Unknown,
}

impl RsiError {
    /// Human-readable diagnostic text for this error kind.
    ///
    /// This is the free-standing equivalent of the `GetErrorString` accessor
    /// in the application-facing API; `Display` (via `#[error(...)]` above)
    /// produces the same text, `describe` just avoids requiring callers to
    /// format the value.
    pub fn describe(&self) -> &'static str {
        match self {
            RsiError::InitFailed => {
                "subsystem initialization failed, or the call is illegal from the current state"
            }
            RsiError::AlreadyRunning => "the engine is already initialized or running",
            RsiError::NotRunning => "the engine is not running",
            RsiError::SocketFailed => {
                "socket creation, bind, or non-blocking configuration failed"
            }
            RsiError::ThreadFailed => "the engine thread could not be spawned",
            RsiError::InvalidParam => "a required output pointer or argument was invalid",
            RsiError::Timeout => "operation timed out",
            RsiError::Unknown => "unknown error",
        }
    }
}

pub type RsiResult<T> = Result<T, RsiError>;
