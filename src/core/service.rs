//! Service worker: timer slots and the session timeout.
//!
//! One thread per instance, started on demand. Deadlines are whole epoch
//! seconds read through the instance clock; the worker polls the slot table
//! every 10ms, fires what is due and re-arms repeating slots.

use crate::config::TIMER_SLOTS;
use crate::core::event::{EngineEvent, EventKind};
use crate::core::instance::{InstanceShared, TimerMode};
use crate::errors::{EngineError, EngineResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Spawn the timer worker. Fails when it is already running or the instance
/// is tearing down.
pub(crate) fn start(shared: &Arc<InstanceShared>) -> EngineResult<()> {
    {
        let mut g = shared.general.lock();
        if g.flags.service_active {
            return Err(EngineError::ConcurrencyConflict("timers already active"));
        }
        g.flags.service_active = true;
        g.flags.service_do_stop = false;
    }

    if !shared.take() {
        let mut g = shared.general.lock();
        g.flags.service_active = false;
        return Err(EngineError::ResourceUnavailable(
            "instance is shutting down".into(),
        ));
    }

    let worker = Arc::clone(shared);
    let spawned = shared.process.spawn("ivs-service", move || {
        info!("service worker started");
        run(&worker);
        let mut g = worker.general.lock();
        g.flags.service_active = false;
        g.flags.service_do_stop = false;
        drop(g);
        worker.release();
        info!("service worker stopped");
    });

    if let Err(e) = spawned {
        let mut g = shared.general.lock();
        g.flags.service_active = false;
        drop(g);
        shared.release();
        return Err(EngineError::ResourceUnavailable(format!(
            "service worker spawn failed: {e}"
        )));
    }
    Ok(())
}

fn run(shared: &Arc<InstanceShared>) {
    loop {
        if shared.process.is_shutdown() || !shared.is_ready() || !shared.session.ready() {
            break;
        }

        let (do_stop, session_timeout) = {
            let g = shared.general.lock();
            (g.flags.service_do_stop, g.config.session_timeout_sec)
        };
        if do_stop {
            break;
        }

        let now = shared.clock.epoch_secs();
        {
            let mut timers = shared.timers.lock();

            if session_timeout > 0 {
                if timers.session_deadline == 0 {
                    // First pass after enabling; arm, do not fire.
                    timers.session_deadline = now + session_timeout;
                } else if now >= timers.session_deadline {
                    shared.push_event(EngineEvent::new(EventKind::SessionTimeout));
                    timers.session_deadline = now + session_timeout;
                }
            } else {
                timers.session_deadline = 0;
            }

            for id in 0..TIMER_SLOTS {
                let slot = &mut timers.slots[id];
                if slot.deadline == 0 || now < slot.deadline {
                    continue;
                }
                debug!("timer {id} fired");
                shared.push_event(EngineEvent::new(EventKind::TimerTimeout { timer_id: id }));
                match slot.mode {
                    TimerMode::Once => {
                        slot.deadline = 0;
                        slot.interval_sec = 0;
                    }
                    TimerMode::Repeating => slot.deadline = now + slot.interval_sec,
                }
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
