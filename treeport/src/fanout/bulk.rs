//! Per-thread bulk mode
//!
//! Workers processing a batch run inside a bulk scope that relaxes the
//! store's per-item bookkeeping. The flags live in thread-local state, so
//! every worker thread enters its own scope; a scope entered on the thread
//! that launched the batch is not visible to the workers.

use std::cell::Cell;
use tracing::debug;

/// Behaviours relaxed while a bulk scope is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkMode {
    /// Do not publish change notifications
    pub suppress_events: bool,
    /// Skip per-item access checks
    pub skip_access_checks: bool,
    /// Bypass read caches
    pub disable_caching: bool,
    /// Mark work as a bulk/offline operation
    pub bulk_operation: bool,
}

impl BulkMode {
    /// Nothing relaxed
    pub const NONE: BulkMode = BulkMode {
        suppress_events: false,
        skip_access_checks: false,
        disable_caching: false,
        bulk_operation: false,
    };

    /// Scope used while serializing nodes out of the store
    pub fn extraction() -> Self {
        Self {
            bulk_operation: true,
            ..Self::NONE
        }
    }

    /// Scope used while applying nodes to the store
    pub fn installation() -> Self {
        Self {
            suppress_events: true,
            skip_access_checks: true,
            disable_caching: true,
            bulk_operation: true,
        }
    }
}

thread_local! {
    static CURRENT: Cell<BulkMode> = const { Cell::new(BulkMode::NONE) };
}

/// Bulk mode in effect on the calling thread
pub fn current() -> BulkMode {
    CURRENT.with(|mode| mode.get())
}

/// Bulk scope for the calling thread
///
/// Restores the previous mode when dropped, including while unwinding.
#[must_use = "the scope ends when the guard is dropped"]
pub struct BulkModeGuard {
    previous: BulkMode,
    // Thread-local state must be restored on the thread that set it
    _not_send: std::marker::PhantomData<*const ()>,
}

impl BulkModeGuard {
    pub fn enter(mode: BulkMode) -> Self {
        let previous = CURRENT.with(|current| current.replace(mode));
        debug!(?mode, "Entered bulk mode");
        Self {
            previous,
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for BulkModeGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| current.set(self.previous));
    }
}

/// Lower the calling thread's scheduling priority as far as allowed
///
/// Failure is logged and otherwise ignored.
#[cfg(target_os = "linux")]
pub fn lower_thread_priority() {
    // SAFETY: gettid has no preconditions; setpriority with PRIO_PROCESS and
    // a thread id only affects that thread on Linux.
    let result = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, 19)
    };

    if result != 0 {
        debug!(
            error = %std::io::Error::last_os_error(),
            "Could not lower worker thread priority"
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn lower_thread_priority() {}
