// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! The pipeline is a synchronous loop, so cancellation is cooperative
//! and coarse-grained: a SIGINT/SIGTERM handler raises a shared atomic
//! flag, and the driver checks it between events and aborts the run.
//!
//! ## Usage
//!
//! ```no_run
//! use trace_analyzer_bootstrap::shutdown::ShutdownFlag;
//!
//! let flag = ShutdownFlag::install();
//! // hand `flag` to EventPipeline::with_shutdown_flag(...)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static SHUTDOWN_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

#[cfg(unix)]
extern "C" fn handle_signal(_signal: libc::c_int) {
    // only atomic stores in here - this runs in signal context
    if let Some(flag) = SHUTDOWN_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Process-wide cooperative shutdown flag.
pub struct ShutdownFlag;

impl ShutdownFlag {
    /// Installs SIGINT/SIGTERM handlers (unix) and returns the shared
    /// flag. Idempotent; repeated calls return the same flag.
    pub fn install() -> Arc<AtomicBool> {
        let flag = SHUTDOWN_FLAG
            .get_or_init(|| Arc::new(AtomicBool::new(false)))
            .clone();

        #[cfg(unix)]
        unsafe {
            libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
        }

        flag
    }

    /// Current flag without installing handlers (tests, embedding).
    pub fn flag() -> Arc<AtomicBool> {
        SHUTDOWN_FLAG
            .get_or_init(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_and_settable() {
        let a = ShutdownFlag::flag();
        let b = ShutdownFlag::flag();
        assert!(Arc::ptr_eq(&a, &b));

        a.store(true, Ordering::SeqCst);
        assert!(b.load(Ordering::SeqCst));
        a.store(false, Ordering::SeqCst);
    }
}
