// SPDX-License-Identifier: Apache-2.0

//! Mutex-protected snapshot of latest pose, latest joint angles, pending
//! correction, and statistics.
//!
//! Every public accessor acquires the lock, copies out, and releases — the
//! critical section is always a plain `memcpy`-sized copy, never held
//! across a system call. `std::sync::Mutex` is sufficient; there is no
//! reader/writer split because every access is this short (see spec §5).

use std::sync::Mutex;

use crate::types::{CartesianCorrection, CartesianPose, JointPose, Statistics};
use crate::MutexExt;

#[derive(Debug, Default)]
struct StateInner {
    cartesian: CartesianPose,
    joints: JointPose,
    correction: CartesianCorrection,
    stats: Statistics,
    /// `None` until the first sample lands; seeds `min_response_time_ms`.
    min_response_time_seen: Option<f64>,
}

/// Result of latching a freshly parsed datagram into the store.
pub struct LatchedUpdate {
    pub cartesian: Option<CartesianPose>,
    pub joints: Option<JointPose>,
    pub response: Option<String>,
    pub just_connected: bool,
}

pub struct StateStore {
    inner: Mutex<StateInner>,
}

impl StateStore {
    pub fn new() -> Self {
        StateStore {
            inner: Mutex::new(StateInner::default()),
        }
    }

    pub fn cartesian(&self) -> CartesianPose {
        self.inner.lock_or_panic().cartesian
    }

    pub fn joints(&self) -> JointPose {
        self.inner.lock_or_panic().joints
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.lock_or_panic().stats
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock_or_panic().stats.is_connected
    }

    pub fn set_correction(&self, correction: CartesianCorrection) {
        self.inner.lock_or_panic().correction = correction;
    }

    /// Single critical section: parse both fragments, latch onto the store,
    /// and format the response from the current pending correction. Called
    /// once per inbound datagram whose IPOC extracted successfully; the
    /// caller already has the peer address from the receive call and sends
    /// to it directly once this returns.
    pub fn latch(
        &self,
        datagram: &str,
        ipoc_value: u64,
        ipoc_raw: &str,
        timestamp_us: u64,
        was_connected: bool,
    ) -> LatchedUpdate {
        let mut inner = self.inner.lock_or_panic();

        let cartesian = crate::codec::extract_cartesian(datagram, ipoc_value, timestamp_us);
        let joints = crate::codec::extract_joints(datagram, ipoc_value, timestamp_us);

        if let Some(pose) = cartesian {
            inner.cartesian = pose;
        }
        if let Some(pose) = joints {
            inner.joints = pose;
        }

        inner.stats.packets_received += 1;
        inner.stats.last_packet_timestamp_us = timestamp_us;

        let just_connected = !was_connected;
        inner.stats.is_connected = true;

        let response = crate::codec::format_response(&inner.correction, ipoc_raw);

        LatchedUpdate {
            cartesian,
            joints,
            response,
            just_connected,
        }
    }

    /// Record that a response was transmitted (attempted), updating the
    /// rolling processing-time statistics. `processing_time_ms` is the wall
    /// time between the start of the iteration and the completion of the
    /// send.
    pub fn record_response(&self, processing_time_ms: f64, late_threshold_ms: f64) -> bool {
        let mut inner = self.inner.lock_or_panic();
        inner.stats.packets_sent += 1;

        let n = inner.stats.packets_sent as f64;
        inner.stats.avg_response_time_ms +=
            (processing_time_ms - inner.stats.avg_response_time_ms) / n;

        match inner.min_response_time_seen {
            None => {
                inner.min_response_time_seen = Some(processing_time_ms);
                inner.stats.min_response_time_ms = processing_time_ms;
            }
            Some(min) if processing_time_ms < min => {
                inner.min_response_time_seen = Some(processing_time_ms);
                inner.stats.min_response_time_ms = processing_time_ms;
            }
            _ => {}
        }

        if processing_time_ms > inner.stats.max_response_time_ms {
            inner.stats.max_response_time_ms = processing_time_ms;
        }

        let late = processing_time_ms > late_threshold_ms;
        if late {
            inner.stats.late_responses += 1;
        }
        late
    }

    /// Mark the connection lost. Returns `true` if this was an actual
    /// transition (the caller only invokes the connection callback once per
    /// transition).
    pub fn mark_disconnected(&self) -> bool {
        let mut inner = self.inner.lock_or_panic();
        if !inner.stats.is_connected {
            return false;
        }
        inner.stats.is_connected = false;
        inner.stats.connection_lost_count += 1;
        true
    }

    pub fn last_packet_timestamp_us(&self) -> u64 {
        self.inner.lock_or_panic().stats.last_packet_timestamp_us
    }

    /// Reset all counters and latched state. Called from `Init`.
    pub fn reset(&self) {
        let mut inner = self.inner.lock_or_panic();
        *inner = StateInner::default();
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_updates_ipoc_on_both_poses() {
        let store = StateStore::new();
        let datagram = r#"<RIst X="1" Y="2" Z="3" A="4" B="5" C="6"/><AIPos A1="1" A2="2" A3="3" A4="4" A5="5" A6="6"/><IPOC>42</IPOC>"#;
        let update = store.latch(datagram, 42, "42", 100, false);
        assert!(update.cartesian.is_some());
        assert!(update.joints.is_some());
        assert_eq!(store.cartesian().ipoc, 42);
        assert_eq!(store.joints().ipoc, 42);
        assert!(update.just_connected);
    }

    #[test]
    fn correction_persists_across_responses() {
        let store = StateStore::new();
        store.set_correction(CartesianCorrection {
            x: 1.5,
            ..Default::default()
        });
        let datagram = r#"<IPOC>1</IPOC>"#;
        for i in 0..3u64 {
            let update = store.latch(datagram, i, "1", 0, true);
            let response = update.response.unwrap();
            assert!(response.contains(r#"X="1.5000""#));
        }
    }

    #[test]
    fn disconnect_transition_fires_once() {
        let store = StateStore::new();
        store.latch("<IPOC>1</IPOC>", 1, "1", 0, false);
        assert!(store.is_connected());
        assert!(store.mark_disconnected());
        assert!(!store.is_connected());
        assert!(!store.mark_disconnected());
    }

    #[test]
    fn min_response_time_seeded_by_first_sample() {
        let store = StateStore::new();
        assert_eq!(store.statistics().min_response_time_ms, 0.0);
        store.record_response(2.0, 4.0);
        assert_eq!(store.statistics().min_response_time_ms, 2.0);
        store.record_response(5.0, 4.0);
        assert_eq!(store.statistics().min_response_time_ms, 2.0);
    }

    #[test]
    fn late_response_recorded_above_threshold() {
        let store = StateStore::new();
        assert!(!store.record_response(3.9, 4.0));
        assert!(store.record_response(4.1, 4.0));
        assert_eq!(store.statistics().late_responses, 1);
    }
}
