// SPDX-License-Identifier: Apache-2.0

//! OS-specific primitives for thread priority elevation.
//!
//! On platforms that refuse real-time priority without capability, the
//! engine must still run correctly at default priority (late-response
//! counters will simply rise). Every implementation here is therefore
//! best-effort and never returns an error the caller must act on.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::elevate_current_thread;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::elevate_current_thread;

#[cfg(not(any(unix, windows)))]
pub fn elevate_current_thread(_verbose: bool) {}
