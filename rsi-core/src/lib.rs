// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! Host-side endpoint for the KUKA Robot Sensor Interface (RSI) UDP
//! protocol.
//!
//! At each robot control cycle (nominally every 4 ms) the controller sends
//! a UDP datagram carrying its current Cartesian pose, joint angles, and a
//! monotonically increasing correlation counter (IPOC). This crate parses
//! that datagram on a dedicated, real-time-scheduled thread, latches the
//! new state, and transmits a response datagram carrying the next
//! Cartesian correction and the echoed IPOC — all before the next cycle is
//! due, or the robot decelerates and aborts motion.
//!
//! The public surface is the module-level functions in [`lifecycle`]:
//! `init`, `set_callbacks`, `start`, `stop`, `cleanup`, and the state
//! accessors. There is exactly one engine per process.
//!
//! Out of scope: CLI demonstrators that would consume this API, robot-side
//! configuration, any transport other than UDP, and joint-space
//! corrections.

pub mod clock;
pub mod codec;
pub mod engine;
pub mod error;
pub mod lifecycle;
mod platform;
pub mod state;
pub mod transport;
pub mod types;

pub use engine::{ConnectionCallback, DataCallback};
pub use error::{RsiError, RsiResult};
pub use types::{
    CartesianCorrection, CartesianPose, EngineState, JointPose, RsiConfig, Statistics,
};

use std::sync::{Mutex, MutexGuard};

/// Extension trait so `Mutex` poisoning — which cannot legitimately happen
/// here, since the state and lifecycle critical sections never panic while
/// held — doesn't force `.expect(...)` calls past `clippy::unwrap_used` at
/// every lock site.
pub(crate) trait MutexExt<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T> {
        #[allow(clippy::unwrap_used)]
        self.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
