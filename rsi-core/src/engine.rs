// SPDX-License-Identifier: Apache-2.0

//! The real-time receive/parse/respond loop.
//!
//! Runs on a dedicated thread elevated to the highest real-time scheduling
//! class the platform allows. Busy-polls a non-blocking socket rather than
//! blocking or sleeping: the robot's cadence is nominally 4 ms, and neither
//! scheduler-quantum jitter nor blocking wake-up latency can be risked
//! against that budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::RsiError;
use crate::state::StateStore;
use crate::transport::{Transport, MAX_DATAGRAM_BYTES};
use crate::types::{CartesianPose, JointPose, RsiConfig};
use crate::{codec, clock, platform};

/// Any host reply whose processing time exceeds this is counted as late.
/// Hardcoded per spec: no configuration knob is exposed even though the
/// protocol permits longer cycles on some robots.
const LATE_RESPONSE_THRESHOLD_MS: f64 = 4.0;

/// Bounded wait for the engine thread to join on `Stop`.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stored as `Arc` rather than `Box` so the lifecycle controller can retain
/// its own copy across `Stop`/`Start` cycles while handing a clone to the
/// engine thread for the duration it runs.
pub type DataCallback = Arc<dyn Fn(&CartesianPose, &JointPose) + Send + Sync + 'static>;
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync + 'static>;

/// Handle to the running I/O engine thread. Dropping this without calling
/// `stop` leaks the thread (it keeps running until the process exits); the
/// lifecycle controller always calls `stop` before dropping.
pub struct EngineHandle {
    exit_flag: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
    local_addr: std::net::SocketAddr,
}

impl EngineHandle {
    /// Bind the socket and spawn the engine thread. The socket is created
    /// here, before the thread is spawned, so a bind failure never leaves a
    /// half-started engine thread behind.
    pub fn start(
        config: RsiConfig,
        store: Arc<StateStore>,
        data_cb: Option<DataCallback>,
        connection_cb: Option<ConnectionCallback>,
    ) -> Result<Self, RsiError> {
        let transport = Transport::bind(&config)?;
        let local_addr = transport.local_addr().map_err(|_| RsiError::SocketFailed)?;
        let exit_flag = Arc::new(AtomicBool::new(false));
        let thread_exit_flag = Arc::clone(&exit_flag);

        let join_handle = std::thread::Builder::new()
            .name("rsi-io-engine".to_string())
            .spawn(move || {
                platform::elevate_current_thread(config.verbose);
                run(
                    &config,
                    &transport,
                    &store,
                    data_cb,
                    connection_cb,
                    &thread_exit_flag,
                );
            })
            .map_err(|_| RsiError::ThreadFailed)?;

        Ok(EngineHandle {
            exit_flag,
            join_handle: Some(join_handle),
            local_addr,
        })
    }

    /// The address the engine's socket is actually bound to — useful when
    /// `Init` was given port `0` to let the OS pick an ephemeral port.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Signal the loop to exit and wait up to one second for it to join.
    /// Per spec, this returns success even if the thread hasn't joined by
    /// the deadline (the loop is cooperative and checks the flag every
    /// iteration, so in practice it exits within one iteration).
    pub fn stop(mut self) {
        self.exit_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let deadline = std::time::Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && std::time::Instant::now() < deadline {
                std::thread::sleep(JOIN_POLL_INTERVAL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            }
            // Otherwise: the thread is still winding down. We don't block
            // the caller any longer than the documented deadline; the
            // thread will finish exiting on its own shortly after.
        }
    }
}

/// The hot loop. One iteration per pass; never blocks and never sleeps.
#[allow(clippy::too_many_arguments)]
fn run(
    config: &RsiConfig,
    transport: &Transport,
    store: &StateStore,
    data_cb: Option<DataCallback>,
    connection_cb: Option<ConnectionCallback>,
    exit_flag: &AtomicBool,
) {
    let watchdog_timeout_us = config.watchdog_timeout_ms.saturating_mul(1000);
    let mut buf = [0u8; MAX_DATAGRAM_BYTES];

    loop {
        if exit_flag.load(Ordering::SeqCst) {
            break;
        }

        let iteration_start_us = clock::now_micros();

        match transport.try_recv(&mut buf) {
            Ok(Some((text, peer))) => {
                if let Some(ipoc) = codec::extract_ipoc(text) {
                    let was_connected = store.is_connected();
                    let update = store.latch(text, ipoc.value, ipoc.raw, iteration_start_us, was_connected);

                    if update.just_connected {
                        if let Some(cb) = &connection_cb {
                            cb(true);
                        }
                    }

                    if let (Some(cartesian), Some(joints)) = (update.cartesian, update.joints) {
                        if let Some(cb) = &data_cb {
                            cb(&cartesian, &joints);
                        }
                    }

                    if let Some(response) = update.response {
                        let _ = transport.send_to(response.as_bytes(), peer);

                        let processing_us = clock::now_micros().saturating_sub(iteration_start_us);
                        let processing_ms = processing_us as f64 / 1000.0;
                        let late = store.record_response(processing_ms, LATE_RESPONSE_THRESHOLD_MS);
                        if late {
                            if config.verbose {
                                warn!(processing_ms, "late response (> 4 ms)");
                            }
                        } else {
                            debug!(processing_ms, "response transmitted");
                        }
                    }
                    // else: format_response overran its buffer — fatal for
                    // this datagram only, the caller drops it silently.
                }
                // else: malformed IPOC, drop the datagram silently.
            }
            Ok(None) => {}
            Err(_) => {
                // Non-blocking recv errors other than WouldBlock are not
                // actionable mid-loop; the protocol has no acknowledgement
                // and the right remediation is always "wait for the next
                // cycle".
            }
        }

        if watchdog_timeout_us > 0 && store.is_connected() {
            let last = store.last_packet_timestamp_us();
            let now = clock::now_micros();
            if now.saturating_sub(last) > watchdog_timeout_us {
                if store.mark_disconnected() {
                    if config.verbose {
                        warn!("connection lost: no datagram within the watchdog timeout");
                    }
                    if let Some(cb) = &connection_cb {
                        cb(false);
                    }
                }
            }
        }

        std::thread::yield_now();

        if exit_flag.load(Ordering::SeqCst) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::sync::Mutex as StdMutex;

    fn config(watchdog_ms: u64) -> RsiConfig {
        RsiConfig::default()
            .with_bind_address("127.0.0.1")
            .with_bind_port(0)
            .with_watchdog_timeout_ms(watchdog_ms)
    }

    fn recv_with_timeout(client: &UdpSocket, buf: &mut [u8]) -> usize {
        client
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let (len, _) = client.recv_from(buf).unwrap();
        len
    }

    #[test]
    fn happy_path_round_trip() {
        let store = Arc::new(StateStore::new());
        let handle = EngineHandle::start(config(0), Arc::clone(&store), None, None).unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .send_to(
                br#"<Rob Type="KUKA"><RIst X="100.0" Y="200.0" Z="300.0" A="10.0" B="20.0" C="30.0"/><AIPos A1="1" A2="2" A3="3" A4="4" A5="5" A6="6"/><IPOC>12345</IPOC></Rob>"#,
                handle.local_addr(),
            )
            .unwrap();

        let mut buf = [0u8; 256];
        let len = recv_with_timeout(&client, &mut buf);
        let response = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(response.contains(r#"X="0.0000""#));
        assert!(response.contains("<IPOC>12345</IPOC>"));

        handle.stop();
        let stats = store.statistics();
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.packets_sent, 1);
        assert!(stats.is_connected);
    }

    #[test]
    fn malformed_ipoc_is_dropped_silently() {
        let store = Arc::new(StateStore::new());
        let handle = EngineHandle::start(config(0), Arc::clone(&store), None, None).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .send_to(b"<Rob><IPOC>12345</Rob>", handle.local_addr())
            .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        handle.stop();
        assert_eq!(store.statistics().packets_received, 0);
        assert!(!store.is_connected());
    }

    #[test]
    fn watchdog_fires_after_timeout() {
        let store = Arc::new(StateStore::new());
        let connected = Arc::new(StdMutex::new(Vec::new()));
        let connected_cb = Arc::clone(&connected);

        let handle = EngineHandle::start(
            config(50),
            Arc::clone(&store),
            None,
            Some(Arc::new(move |is_connected| {
                connected_cb.lock().unwrap().push(is_connected);
            })),
        )
        .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .send_to(b"<IPOC>1</IPOC>", handle.local_addr())
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        handle.stop();

        assert_eq!(store.statistics().connection_lost_count, 1);
        assert!(!store.is_connected());
        assert_eq!(*connected.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn correction_is_applied_to_response() {
        let store = Arc::new(StateStore::new());
        store.set_correction(crate::types::CartesianCorrection {
            x: 1.5,
            y: -0.25,
            ..Default::default()
        });
        let handle = EngineHandle::start(config(0), Arc::clone(&store), None, None).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .send_to(
                br#"<RIst X="100.0" Y="200.0" Z="300.0" A="10.0" B="20.0" C="30.0"/><AIPos A1="1" A2="2" A3="3" A4="4" A5="5" A6="6"/><IPOC>12345</IPOC>"#,
                handle.local_addr(),
            )
            .unwrap();

        let mut buf = [0u8; 256];
        let len = recv_with_timeout(&client, &mut buf);
        let response = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(response.contains(r#"X="1.5000""#));
        assert!(response.contains(r#"Y="-0.2500""#));
        assert!(response.contains(r#"Z="0.0000""#));

        handle.stop();
    }
}
