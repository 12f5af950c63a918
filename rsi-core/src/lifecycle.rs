// SPDX-License-Identifier: Apache-2.0

//! Public façade: `Init` / `SetCallbacks` / `Start` / `Stop` / `Cleanup` and
//! the state accessors.
//!
//! There is exactly one engine instance per process — a deliberate choice
//! because the OS-level priority tweaks performed in `platform::elevate_current_thread`
//! are process-scoped, not per-instance. The instance lives behind a
//! `static OnceLock<Mutex<Slot>>`, grounded directly on the
//! `MASTER_LISTENER: OnceLock<Mutex<Option<MasterListener>>>` singleton
//! pattern used for the sidecar's own listener thread.

use std::sync::{Arc, Mutex, OnceLock};

use tracing::info;

use crate::engine::{ConnectionCallback, DataCallback, EngineHandle};
use crate::error::{RsiError, RsiResult};
use crate::state::StateStore;
use crate::types::{CartesianCorrection, CartesianPose, EngineState, JointPose, RsiConfig, Statistics};
use crate::MutexExt;

#[derive(Default)]
struct Callbacks {
    data: Option<DataCallback>,
    connection: Option<ConnectionCallback>,
}

enum Slot {
    Uninitialized,
    Initialized {
        config: RsiConfig,
        store: Arc<StateStore>,
        callbacks: Callbacks,
    },
    Running {
        config: RsiConfig,
        store: Arc<StateStore>,
        callbacks: Callbacks,
        handle: EngineHandle,
    },
}

static SLOT: OnceLock<Mutex<Slot>> = OnceLock::new();

fn slot() -> &'static Mutex<Slot> {
    SLOT.get_or_init(|| Mutex::new(Slot::Uninitialized))
}

/// Configure and arm the endpoint. Valid only from `Uninitialized`.
pub fn init(config: Option<RsiConfig>) -> RsiResult<()> {
    let mut guard = slot().lock_or_panic();
    match &*guard {
        Slot::Uninitialized => {
            let config = config.unwrap_or_default();
            config.validate()?;
            info!(bind_address = %config.bind_address, bind_port = config.bind_port, "initializing RSI endpoint");
            *guard = Slot::Initialized {
                config,
                store: Arc::new(StateStore::new()),
                callbacks: Callbacks::default(),
            };
            Ok(())
        }
        _ => Err(RsiError::AlreadyRunning),
    }
}

/// Register the data and/or connection callbacks. Valid only from
/// `Initialized` (not `Running`). Either callback may be `None`.
pub fn set_callbacks(data: Option<DataCallback>, connection: Option<ConnectionCallback>) -> RsiResult<()> {
    let mut guard = slot().lock_or_panic();
    match &mut *guard {
        Slot::Initialized { callbacks, .. } => {
            callbacks.data = data;
            callbacks.connection = connection;
            Ok(())
        }
        Slot::Uninitialized => Err(RsiError::InitFailed),
        Slot::Running { .. } => Err(RsiError::AlreadyRunning),
    }
}

/// Bind the socket and spawn the engine thread. Valid only from
/// `Initialized`.
pub fn start() -> RsiResult<()> {
    let mut guard = slot().lock_or_panic();
    let (config, store, callbacks) = match std::mem::replace(&mut *guard, Slot::Uninitialized) {
        Slot::Initialized {
            config,
            store,
            callbacks,
        } => (config, store, callbacks),
        other @ Slot::Running { .. } => {
            *guard = other;
            return Err(RsiError::AlreadyRunning);
        }
        Slot::Uninitialized => {
            *guard = Slot::Uninitialized;
            return Err(RsiError::InitFailed);
        }
    };

    let handle = match EngineHandle::start(
        config.clone(),
        Arc::clone(&store),
        callbacks.data.clone(),
        callbacks.connection.clone(),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            // Restore the Initialized slot so the caller can retry.
            *guard = Slot::Initialized {
                config,
                store,
                callbacks,
            };
            return Err(e);
        }
    };

    info!("RSI engine thread started");
    *guard = Slot::Running {
        config,
        store,
        callbacks,
        handle,
    };
    Ok(())
}

/// Signal exit, join the engine thread, and close the socket. Valid only
/// from `Running`.
pub fn stop() -> RsiResult<()> {
    let mut guard = slot().lock_or_panic();
    match std::mem::replace(&mut *guard, Slot::Uninitialized) {
        Slot::Running {
            config,
            store,
            callbacks,
            handle,
        } => {
            handle.stop();
            info!("RSI engine thread stopped");
            *guard = Slot::Initialized {
                config,
                store,
                callbacks,
            };
            Ok(())
        }
        other => {
            *guard = other;
            Err(RsiError::NotRunning)
        }
    }
}

/// Tear down priority tweaks and return to `Uninitialized`, calling `stop`
/// first if still `Running`.
pub fn cleanup() -> RsiResult<()> {
    if matches!(state(), EngineState::Running) {
        stop()?;
    }
    let mut guard = slot().lock_or_panic();
    *guard = Slot::Uninitialized;
    Ok(())
}

/// Current lifecycle position.
pub fn state() -> EngineState {
    match &*slot().lock_or_panic() {
        Slot::Uninitialized => EngineState::Uninitialized,
        Slot::Initialized { .. } => EngineState::Initialized,
        Slot::Running { .. } => EngineState::Running,
    }
}

/// Copy the latest Cartesian pose. Valid only from `Running`.
pub fn get_cartesian_position() -> RsiResult<CartesianPose> {
    with_store(|store| store.cartesian())
}

/// Copy the latest joint-space pose. Valid only from `Running`.
pub fn get_joint_position() -> RsiResult<JointPose> {
    with_store(|store| store.joints())
}

/// Replace the pending Cartesian correction. Valid only from `Running`.
pub fn set_cartesian_correction(correction: CartesianCorrection) -> RsiResult<()> {
    with_store(|store| store.set_correction(correction))
}

/// Copy the statistics snapshot. Valid from `Initialized` or `Running`.
pub fn get_statistics() -> RsiResult<Statistics> {
    let guard = slot().lock_or_panic();
    match &*guard {
        Slot::Initialized { store, .. } | Slot::Running { store, .. } => Ok(store.statistics()),
        Slot::Uninitialized => Err(RsiError::InitFailed),
    }
}

fn with_store<T>(f: impl FnOnce(&StateStore) -> T) -> RsiResult<T> {
    let guard = slot().lock_or_panic();
    match &*guard {
        Slot::Running { store, .. } => Ok(f(store)),
        _ => Err(RsiError::NotRunning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset() {
        let _ = cleanup();
    }

    #[test]
    #[serial]
    fn lifecycle_rejects_illegal_transitions() {
        reset();
        assert_eq!(state(), EngineState::Uninitialized);
        assert_eq!(start(), Err(RsiError::InitFailed));

        init(Some(
            RsiConfig::default()
                .with_bind_address("127.0.0.1")
                .with_bind_port(0),
        ))
        .unwrap();
        assert_eq!(init(None), Err(RsiError::AlreadyRunning));

        start().unwrap();
        assert_eq!(start(), Err(RsiError::AlreadyRunning));
        assert!(get_cartesian_position().is_ok());

        stop().unwrap();
        assert_eq!(stop(), Err(RsiError::NotRunning));
        reset();
    }

    #[test]
    #[serial]
    fn init_rejects_invalid_bind_address() {
        reset();
        assert_eq!(
            init(Some(RsiConfig::default().with_bind_address("not-an-address"))),
            Err(RsiError::InitFailed)
        );
        assert_eq!(state(), EngineState::Uninitialized);
        reset();
    }

    #[test]
    #[serial]
    fn accessors_gated_by_state() {
        reset();
        assert_eq!(get_cartesian_position(), Err(RsiError::NotRunning));
        assert_eq!(get_statistics(), Err(RsiError::InitFailed));

        init(Some(
            RsiConfig::default()
                .with_bind_address("127.0.0.1")
                .with_bind_port(0),
        ))
        .unwrap();
        assert!(get_statistics().is_ok());
        assert_eq!(get_cartesian_position(), Err(RsiError::NotRunning));

        start().unwrap();
        assert!(get_cartesian_position().is_ok());
        set_cartesian_correction(CartesianCorrection::default()).unwrap();

        reset();
    }
}
