// SPDX-License-Identifier: Apache-2.0

//! C ABI facade over [`rsi_core`].
//!
//! Mirrors every type crossing the boundary as a `#[repr(C)]` struct and
//! converts to/from the safe `rsi_core` types at the edge, the same split
//! `libdd-crashtracker-ffi` keeps from `libdd-crashtracker`. Callbacks here
//! are raw `extern "C" fn` pointers plus an opaque `*mut c_void` user-data
//! handle rather than the `Arc<dyn Fn>` closures `rsi_core::lifecycle`
//! accepts directly — the shape the application-facing contract specifies
//! for non-Rust callers.

use std::ffi::{c_void, CStr};
use std::ptr;

use rsi_core::{CartesianCorrection, CartesianPose, EngineState, JointPose, RsiError, RsiResult, Statistics};

/// Status code returned by every function in this module. Nothing is ever
/// thrown across the boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiStatus {
    Success = 0,
    InitFailed,
    AlreadyRunning,
    NotRunning,
    SocketFailed,
    ThreadFailed,
    InvalidParam,
    Timeout,
    Unknown,
}

impl From<RsiError> for RsiStatus {
    fn from(err: RsiError) -> Self {
        match err {
            RsiError::InitFailed => RsiStatus::InitFailed,
            RsiError::AlreadyRunning => RsiStatus::AlreadyRunning,
            RsiError::NotRunning => RsiStatus::NotRunning,
            RsiError::SocketFailed => RsiStatus::SocketFailed,
            RsiError::ThreadFailed => RsiStatus::ThreadFailed,
            RsiError::InvalidParam => RsiStatus::InvalidParam,
            RsiError::Timeout => RsiStatus::Timeout,
            RsiError::Unknown => RsiStatus::Unknown,
        }
    }
}

impl From<RsiResult<()>> for RsiStatus {
    fn from(value: RsiResult<()>) -> Self {
        match value {
            Ok(()) => RsiStatus::Success,
            Err(e) => e.into(),
        }
    }
}

fn status_of<T>(value: RsiResult<T>, out: *mut T) -> RsiStatus
where
    T: Copy,
{
    match value {
        Ok(v) => {
            if out.is_null() {
                return RsiStatus::InvalidParam;
            }
            // SAFETY: caller guarantees `out` points to a valid, writable `T`.
            unsafe { ptr::write(out, v) };
            RsiStatus::Success
        }
        Err(e) => e.into(),
    }
}

/// Mirrors [`rsi_core::RsiConfig`]. A null `bind_address` means the default
/// `"0.0.0.0"`.
#[repr(C)]
pub struct RsiConfigFfi {
    pub bind_address: *const std::ffi::c_char,
    pub bind_port: u16,
    pub watchdog_timeout_ms: u64,
    pub verbose: bool,
}

impl RsiConfigFfi {
    /// # Safety
    /// `bind_address`, if non-null, must point to a valid, NUL-terminated,
    /// UTF-8 C string that outlives this call.
    unsafe fn into_core(&self) -> Result<rsi_core::RsiConfig, RsiStatus> {
        let mut config = rsi_core::RsiConfig::default()
            .with_bind_port(self.bind_port)
            .with_watchdog_timeout_ms(self.watchdog_timeout_ms)
            .with_verbose(self.verbose);
        if !self.bind_address.is_null() {
            let addr = CStr::from_ptr(self.bind_address)
                .to_str()
                .map_err(|_| RsiStatus::InvalidParam)?;
            config = config.with_bind_address(addr);
        }
        Ok(config)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CartesianPoseFfi {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub timestamp_us: u64,
    pub ipoc: u64,
}

impl From<CartesianPose> for CartesianPoseFfi {
    fn from(p: CartesianPose) -> Self {
        CartesianPoseFfi {
            x: p.x,
            y: p.y,
            z: p.z,
            a: p.a,
            b: p.b,
            c: p.c,
            timestamp_us: p.timestamp_us,
            ipoc: p.ipoc,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct JointPoseFfi {
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
    pub a4: f64,
    pub a5: f64,
    pub a6: f64,
    pub timestamp_us: u64,
    pub ipoc: u64,
}

impl From<JointPose> for JointPoseFfi {
    fn from(p: JointPose) -> Self {
        JointPoseFfi {
            a1: p.a1,
            a2: p.a2,
            a3: p.a3,
            a4: p.a4,
            a5: p.a5,
            a6: p.a6,
            timestamp_us: p.timestamp_us,
            ipoc: p.ipoc,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CartesianCorrectionFfi {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl From<CartesianCorrectionFfi> for CartesianCorrection {
    fn from(c: CartesianCorrectionFfi) -> Self {
        CartesianCorrection {
            x: c.x,
            y: c.y,
            z: c.z,
            a: c.a,
            b: c.b,
            c: c.c,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StatisticsFfi {
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

impl From<Statistics> for StatisticsFfi {
    fn from(s: Statistics) -> Self {
        StatisticsFfi {
            packets_received: s.packets_received,
            packets_sent: s.packets_sent,
            avg_response_time_ms: s.avg_response_time_ms,
            min_response_time_ms: s.min_response_time_ms,
            max_response_time_ms: s.max_response_time_ms,
            late_responses: s.late_responses,
            connection_lost_count: s.connection_lost_count,
            is_connected: s.is_connected,
            last_packet_timestamp_us: s.last_packet_timestamp_us,
        }
    }
}

/// Invoked once per inbound datagram whose Cartesian and joint fragments
/// both parsed. Runs on the engine thread: must not block, allocate
/// unboundedly, or call back into `rsi_init`/`rsi_start`/`rsi_stop`/
/// `rsi_cleanup`.
pub type RsiDataCallback =
    extern "C" fn(cartesian: *const CartesianPoseFfi, joints: *const JointPoseFfi, userdata: *mut c_void);

/// Invoked on connection transitions only (not per datagram).
pub type RsiConnectionCallback = extern "C" fn(connected: bool, userdata: *mut c_void);

/// Wraps the caller's opaque user-data pointer so it can be captured by the
/// `Send + Sync` closures `rsi_core::lifecycle` requires. The engine thread
/// never dereferences it; it only ever hands it back to the caller's own
/// callback, which is the only code that interprets it.
struct UserData(*mut c_void);

// SAFETY: ownership of the pointee is the caller's; this wrapper only ever
// carries the address across the engine-thread boundary and back out to
// caller-supplied callbacks, never reads through it itself.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

/// Configure and arm the endpoint. `config` may be null for defaults.
///
/// # Preconditions
///   Valid only from `Uninitialized`.
/// # Safety
///   `config`, if non-null, must point to a valid `RsiConfigFfi` whose
///   `bind_address` (if non-null) is a valid NUL-terminated UTF-8 C string.
/// # Atomicity
///   Not atomic with respect to other lifecycle calls on the same process;
///   the caller must not call lifecycle functions concurrently.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_init(config: *const RsiConfigFfi) -> RsiStatus {
    let config = if config.is_null() {
        None
    } else {
        match (*config).into_core() {
            Ok(c) => Some(c),
            Err(status) => return status,
        }
    };
    rsi_core::lifecycle::init(config).into()
}

/// Register the data and/or connection callbacks with an opaque user-data
/// pointer passed back to both on every invocation. Either callback pointer
/// may be null.
///
/// # Preconditions
///   Valid only from `Initialized` (not `Running`).
/// # Safety
///   `userdata` must remain valid for as long as the callbacks may fire,
///   i.e. until the next `rsi_set_callbacks` or `rsi_cleanup` call returns.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_set_callbacks(
    data: Option<RsiDataCallback>,
    connection: Option<RsiConnectionCallback>,
    userdata: *mut c_void,
) -> RsiStatus {
    let data_cb = data.map(|f| {
        let userdata = UserData(userdata);
        std::sync::Arc::new(move |cartesian: &CartesianPose, joints: &JointPose| {
            let cartesian_ffi = CartesianPoseFfi::from(*cartesian);
            let joints_ffi = JointPoseFfi::from(*joints);
            f(&cartesian_ffi, &joints_ffi, userdata.0);
        }) as rsi_core::DataCallback
    });

    let connection_cb = connection.map(|f| {
        let userdata = UserData(userdata);
        std::sync::Arc::new(move |connected: bool| {
            f(connected, userdata.0);
        }) as rsi_core::ConnectionCallback
    });

    rsi_core::lifecycle::set_callbacks(data_cb, connection_cb).into()
}

/// Bind the socket and spawn the engine thread.
///
/// # Preconditions
///   Valid only from `Initialized`.
/// # Safety
///   None beyond the general requirement not to call lifecycle functions
///   concurrently from multiple threads.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_start() -> RsiStatus {
    rsi_core::lifecycle::start().into()
}

/// Signal exit, join the engine thread (bounded wait), and close the
/// socket.
///
/// # Preconditions
///   Valid only from `Running`.
/// # Safety
///   None.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_stop() -> RsiStatus {
    rsi_core::lifecycle::stop().into()
}

/// Tear down priority tweaks and return to `Uninitialized`, calling
/// `rsi_stop` first if still `Running`.
///
/// # Preconditions
///   None.
/// # Safety
///   None.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_cleanup() -> RsiStatus {
    rsi_core::lifecycle::cleanup().into()
}

/// Copy the latest Cartesian pose into `*out`.
///
/// # Preconditions
///   Valid only from `Running`.
/// # Safety
///   `out` must point to a valid, writable `CartesianPoseFfi`.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_get_cartesian_position(out: *mut CartesianPoseFfi) -> RsiStatus {
    status_of(
        rsi_core::lifecycle::get_cartesian_position().map(CartesianPoseFfi::from),
        out,
    )
}

/// Copy the latest joint-space pose into `*out`.
///
/// # Preconditions
///   Valid only from `Running`.
/// # Safety
///   `out` must point to a valid, writable `JointPoseFfi`.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_get_joint_position(out: *mut JointPoseFfi) -> RsiStatus {
    status_of(
        rsi_core::lifecycle::get_joint_position().map(JointPoseFfi::from),
        out,
    )
}

/// Replace the pending Cartesian correction. Not cleared on read; the same
/// correction is resent until overwritten.
///
/// # Preconditions
///   Valid only from `Running`.
/// # Safety
///   None beyond requiring `correction` to point to a valid
///   `CartesianCorrectionFfi` if non-null.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_set_cartesian_correction(correction: *const CartesianCorrectionFfi) -> RsiStatus {
    if correction.is_null() {
        return RsiStatus::InvalidParam;
    }
    rsi_core::lifecycle::set_cartesian_correction((*correction).into()).into()
}

/// Copy the statistics snapshot into `*out`.
///
/// # Preconditions
///   Valid from `Initialized` or `Running`.
/// # Safety
///   `out` must point to a valid, writable `StatisticsFfi`.
#[no_mangle]
#[must_use]
pub unsafe extern "C" fn rsi_get_statistics(out: *mut StatisticsFfi) -> RsiStatus {
    status_of(rsi_core::lifecycle::get_statistics().map(StatisticsFfi::from), out)
}

/// Current lifecycle position, exposed for diagnostics and test harnesses.
#[no_mangle]
pub extern "C" fn rsi_state() -> EngineState {
    rsi_core::lifecycle::state()
}

/// Diagnostic text for a status code. The returned pointer is `'static`
/// and must not be freed by the caller.
#[no_mangle]
pub extern "C" fn rsi_get_error_string(status: RsiStatus) -> *const std::ffi::c_char {
    // Safety: each arm is a string literal with no interior NUL, baked into
    // the binary's read-only data section.
    let text: &'static CStr = match status {
        RsiStatus::Success => c"success",
        RsiStatus::InitFailed => c"subsystem init or illegal state for this call",
        RsiStatus::AlreadyRunning => c"lifecycle precondition failed: engine already running",
        RsiStatus::NotRunning => c"lifecycle precondition failed: engine not running",
        RsiStatus::SocketFailed => c"socket creation, bind, or non-blocking configuration failed",
        RsiStatus::ThreadFailed => c"engine thread could not be spawned",
        RsiStatus::InvalidParam => c"null pointer passed for a required output or input",
        RsiStatus::Timeout => c"reserved: no current caller",
        RsiStatus::Unknown => c"unknown error",
    };
    text.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    fn reset() {
        unsafe {
            rsi_cleanup();
        }
    }

    extern "C" fn record_ipoc(cartesian: *const CartesianPoseFfi, _joints: *const JointPoseFfi, userdata: *mut c_void) {
        let counter = unsafe { &*(userdata as *const AtomicU64) };
        let pose = unsafe { &*cartesian };
        counter.store(pose.ipoc, Ordering::SeqCst);
    }

    extern "C" fn record_connected(connected: bool, userdata: *mut c_void) {
        let flag = unsafe { &*(userdata as *const AtomicBool) };
        flag.store(connected, Ordering::SeqCst);
    }

    #[test]
    #[serial]
    fn init_start_stop_round_trip_over_ffi() {
        reset();
        let config = RsiConfigFfi {
            bind_address: c"127.0.0.1".as_ptr(),
            bind_port: 0,
            watchdog_timeout_ms: 0,
            verbose: false,
        };
        unsafe {
            assert_eq!(rsi_init(&config), RsiStatus::Success);
            assert_eq!(rsi_start(), RsiStatus::Success);
            assert_eq!(rsi_state(), EngineState::Running);

            let mut stats = StatisticsFfi {
                packets_received: 0,
                packets_sent: 0,
                avg_response_time_ms: 0.0,
                min_response_time_ms: 0.0,
                max_response_time_ms: 0.0,
                late_responses: 0,
                connection_lost_count: 0,
                is_connected: false,
                last_packet_timestamp_us: 0,
            };
            assert_eq!(rsi_get_statistics(&mut stats), RsiStatus::Success);

            assert_eq!(rsi_stop(), RsiStatus::Success);
            assert_eq!(rsi_state(), EngineState::Initialized);
        }
        reset();
    }

    #[test]
    #[serial]
    fn null_out_pointer_is_rejected() {
        reset();
        let config = RsiConfigFfi {
            bind_address: ptr::null(),
            bind_port: 0,
            watchdog_timeout_ms: 0,
            verbose: false,
        };
        unsafe {
            assert_eq!(rsi_init(&config), RsiStatus::Success);
            assert_eq!(rsi_start(), RsiStatus::Success);
            assert_eq!(
                rsi_get_cartesian_position(ptr::null_mut()),
                RsiStatus::InvalidParam
            );
        }
        reset();
    }

    #[test]
    #[serial]
    fn callbacks_fire_across_the_boundary() {
        reset();
        // Port 0 would bind an ephemeral port this FFI surface has no
        // accessor to discover, so this test binds a fixed loopback port.
        let config = RsiConfigFfi {
            bind_address: c"127.0.0.1".as_ptr(),
            bind_port: 59999,
            watchdog_timeout_ms: 0,
            verbose: false,
        };

        let last_ipoc = Arc::new(AtomicU64::new(0));
        let connected = Arc::new(AtomicBool::new(false));

        unsafe {
            assert_eq!(rsi_init(&config), RsiStatus::Success);
            assert_eq!(
                rsi_set_callbacks(
                    Some(record_ipoc),
                    Some(record_connected),
                    Arc::as_ptr(&last_ipoc) as *mut AtomicU64 as *mut c_void,
                ),
                RsiStatus::Success
            );
            assert_eq!(rsi_start(), RsiStatus::Success);

            let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            client
                .send_to(
                    br#"<RIst X="1" Y="2" Z="3" A="4" B="5" C="6"/><AIPos A1="1" A2="2" A3="3" A4="4" A5="5" A6="6"/><IPOC>777</IPOC>"#,
                    "127.0.0.1:59999",
                )
                .unwrap();

            let mut buf = [0u8; 256];
            client
                .set_read_timeout(Some(std::time::Duration::from_secs(1)))
                .unwrap();
            client.recv_from(&mut buf).unwrap();

            assert_eq!(last_ipoc.load(Ordering::SeqCst), 777);
            assert!(connected.load(Ordering::SeqCst));

            assert_eq!(rsi_stop(), RsiStatus::Success);
        }
        reset();
    }
}
