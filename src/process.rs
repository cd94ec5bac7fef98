//! Process-wide worker accounting.
//!
//! One `ProcessContext` is shared by every instance loaded into a process.
//! Workers are spawned through it so the host can request shutdown and block
//! until the last worker thread has unwound; the same contract the module
//! load/unload cycle had, without mutable globals.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Shared shutdown flag plus an active-worker counter.
pub struct ProcessContext {
    shutdown: AtomicBool,
    active: Mutex<usize>,
    idle: Condvar,
}

impl ProcessContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            shutdown: AtomicBool::new(false),
            active: Mutex::new(0),
            idle: Condvar::new(),
        })
    }

    /// True once shutdown has been requested; workers poll this each cycle
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of live worker threads
    pub fn active_workers(&self) -> usize {
        *self.active.lock()
    }

    /// Spawn a named worker thread, tracked until it exits.
    ///
    /// On failure the registration is undone and the error returned, so the
    /// caller can unwind whatever state it set up for the worker.
    pub fn spawn<F>(self: &Arc<Self>, name: &str, f: F) -> std::io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        *self.active.lock() += 1;

        let ctx = Arc::clone(self);
        let builder = std::thread::Builder::new().name(name.to_string());
        let spawned = builder.spawn(move || {
            f();
            let mut active = ctx.active.lock();
            *active -= 1;
            if *active == 0 {
                ctx.idle.notify_all();
            }
        });

        if let Err(e) = spawned {
            // The closure never ran; undo the registration.
            let mut active = self.active.lock();
            *active -= 1;
            if *active == 0 {
                self.idle.notify_all();
            }
            debug!("worker spawn failed: {e}");
            return Err(e);
        }
        Ok(())
    }

    /// Raise the shutdown flag and block until every worker has exited
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let mut active = self.active.lock();
        while *active > 0 {
            self.idle.wait(&mut active);
        }
        debug!("process context drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_spawn_and_drain() {
        let ctx = ProcessContext::new();
        for i in 0..4 {
            ctx.spawn(&format!("w{i}"), || {
                std::thread::sleep(Duration::from_millis(20));
            })
            .unwrap();
        }
        assert!(ctx.active_workers() > 0);
        ctx.shutdown();
        assert_eq!(ctx.active_workers(), 0);
        assert!(ctx.is_shutdown());
    }

    #[test]
    fn test_workers_observe_shutdown() {
        let ctx = ProcessContext::new();
        let inner = Arc::clone(&ctx);
        ctx.spawn("poller", move || {
            while !inner.is_shutdown() {
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        ctx.shutdown();
        assert_eq!(ctx.active_workers(), 0);
    }
}
