// SPDX-License-Identifier: Apache-2.0

use tracing::warn;

/// Elevate the calling thread to `SCHED_FIFO` at the maximum priority the
/// OS allows for that policy. Best-effort: failures (typically missing
/// `CAP_SYS_NICE`) are logged in verbose mode and otherwise ignored.
pub fn elevate_current_thread(verbose: bool) {
    // Safety: only reads scheduling parameters and sets them for the
    // current thread; no memory this function doesn't own is touched.
    unsafe {
        let max_priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max_priority < 0 {
            if verbose {
                warn!("sched_get_priority_max(SCHED_FIFO) failed, running at default priority");
            }
            return;
        }

        let param = libc::sched_param {
            sched_priority: max_priority,
        };
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 && verbose {
            warn!(
                "pthread_setschedparam(SCHED_FIFO, {max_priority}) failed (errno {rc}); \
                 running at default priority, late-response counters may rise"
            );
        }
    }
}
