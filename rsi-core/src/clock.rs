// SPDX-License-Identifier: Apache-2.0

use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Monotonic host timestamp in microseconds.
///
/// The epoch is the first call made anywhere in the process (lazily
/// established via `OnceLock`), so values are only meaningful relative to
/// each other within one process lifetime — callers must not persist them
/// across restarts.
pub fn now_micros() -> u64 {
    let origin = *ORIGIN.get_or_init(Instant::now);
    Instant::now()
        .duration_since(origin)
        .as_micros()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic() {
        let a = now_micros();
        std::thread::sleep(std::time::Duration::from_micros(200));
        let b = now_micros();
        assert!(b > a);
    }
}
