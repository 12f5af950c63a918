// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Default UDP port the RSI robot controller targets.
pub const DEFAULT_PORT: u16 = 59152;

/// Default watchdog timeout, in milliseconds. Zero disables the watchdog.
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 1000;

/// Immutable startup options, copied into the engine at `Init` and never
/// mutated thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiConfig {
    /// Textual IPv4 bind address. `"0.0.0.0"` binds the wildcard address.
    pub bind_address: String,
    pub bind_port: u16,
    /// Liveness timeout in milliseconds. `0` disables the watchdog.
    pub watchdog_timeout_ms: u64,
    pub verbose: bool,
}

impl Default for RsiConfig {
    fn default() -> Self {
        RsiConfig {
            bind_address: "0.0.0.0".to_string(),
            bind_port: DEFAULT_PORT,
            watchdog_timeout_ms: DEFAULT_WATCHDOG_TIMEOUT_MS,
            verbose: false,
        }
    }
}

impl RsiConfig {
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_watchdog_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.watchdog_timeout_ms = timeout_ms;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reject configurations that can never bind, before the engine thread
    /// is ever spawned. `"0.0.0.0"` is the documented wildcard spelling and
    /// parses as a valid `Ipv4Addr` like any other numeric address.
    pub fn validate(&self) -> Result<(), crate::error::RsiError> {
        self.bind_address
            .parse::<std::net::Ipv4Addr>()
            .map_err(|_| crate::error::RsiError::InitFailed)?;
        Ok(())
    }
}

/// Latest Cartesian pose reported by the robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    /// Host timestamp (microseconds) at which this pose was parsed.
    pub timestamp_us: u64,
    pub ipoc: u64,
}

/// Latest joint-space axis angles reported by the robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
    pub a4: f64,
    pub a5: f64,
    pub a6: f64,
    pub timestamp_us: u64,
    pub ipoc: u64,
}

/// Next Cartesian correction to transmit. Not cleared on read: the same
/// correction is resent until the application overwrites it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CartesianCorrection {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Rolling counters and timings, updated by the I/O engine only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub late_responses: u64,
    pub connection_lost_count: u64,
    pub is_connected: bool,
    pub last_packet_timestamp_us: u64,
}

impl Default for Statistics {
    fn default() -> Self {
        Statistics {
            packets_received: 0,
            packets_sent: 0,
            avg_response_time_ms: 0.0,
            min_response_time_ms: 0.0,
            max_response_time_ms: 0.0,
            late_responses: 0,
            connection_lost_count: 0,
            is_connected: false,
            last_packet_timestamp_us: 0,
        }
    }
}

/// Lifecycle position of the engine singleton.
///
/// `#[repr(C)]` because this crosses the `rsi-ffi` boundary directly
/// (`rsi_state`), not just the mirrored `*Ffi` structs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Running,
}
