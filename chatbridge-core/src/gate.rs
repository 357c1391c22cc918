// src/gate.rs

use std::sync::Arc;
use parking_lot::Mutex;

/// Open/closed latch guarding delivery from one producer (a platform pump or
/// the demo feed). `close()` waits for any delivery in progress, so once it
/// returns nothing else passes.
#[derive(Clone)]
pub(crate) struct Gate {
    open: Arc<Mutex<bool>>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self { open: Arc::new(Mutex::new(true)) }
    }

    /// Runs `f` only while the gate is open. Returns whether it ran.
    pub(crate) fn pass<F: FnOnce()>(&self, f: F) -> bool {
        let guard = self.open.lock();
        if *guard {
            f();
            true
        } else {
            false
        }
    }

    pub(crate) fn close(&self) {
        *self.open.lock() = false;
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.open.lock()
    }
}
