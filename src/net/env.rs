//! Socket library bring-up.
//!
//! Some platforms require a process-wide initialisation before any socket
//! is created and a matching cleanup afterwards. [`init`] performs it for the
//! first user and the last [`NetworkGuard`] to drop undoes it. On unix both
//! steps are no-ops, but servers and clients still hold a guard.

use crate::error::Result;

use std::sync::atomic::{AtomicUsize, Ordering};

static USERS: AtomicUsize = AtomicUsize::new(0);

/// Keeps the socket library initialised while alive.
#[derive(Debug)]
#[must_use = "the network environment is torn down when the guard drops"]
pub struct NetworkGuard {
    _private: (),
}

/// Initialises the socket library if this is the first live guard.
pub fn init() -> Result<NetworkGuard> {
    if USERS.fetch_add(1, Ordering::AcqRel) == 0 {
        if let Err(error) = startup() {
            USERS.fetch_sub(1, Ordering::AcqRel);
            return Err(error.into());
        }
        tracing::debug!("network environment initialised");
    }

    Ok(NetworkGuard { _private: () })
}

/// Returns `true` while at least one [`NetworkGuard`] is alive.
pub fn is_initialized() -> bool {
    USERS.load(Ordering::Acquire) > 0
}

impl Drop for NetworkGuard {
    fn drop(&mut self) {
        if USERS.fetch_sub(1, Ordering::AcqRel) == 1 {
            cleanup();
            tracing::debug!("network environment released");
        }
    }
}

fn startup() -> std::io::Result<()> {
    Ok(())
}

fn cleanup() {}
