// SPDX-License-Identifier: Apache-2.0

use tracing::warn;
use windows::Win32::System::Threading::{
    GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL,
};

/// Elevate the calling thread to the `time-critical` priority class.
/// Best-effort: a failure is logged in verbose mode and otherwise ignored.
pub fn elevate_current_thread(verbose: bool) {
    // Safety: `GetCurrentThread` returns a pseudo-handle that needs no
    // closing; `SetThreadPriority` only mutates the calling thread's own
    // scheduling attributes.
    unsafe {
        let handle = GetCurrentThread();
        if SetThreadPriority(handle, THREAD_PRIORITY_TIME_CRITICAL).is_err() && verbose {
            warn!("SetThreadPriority(TIME_CRITICAL) failed; running at default priority");
        }
    }
}
