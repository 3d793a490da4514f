//! PIR motion watcher.
//!
//! ```text
//!  Stopped ──start()──▶ Running(waiting) ──rising edge──▶ Running(dispatching)
//!     ▲                      │   ▲                               │
//!     └──────stop()──────────┘   └───────handlers returned───────┘
//! ```
//!
//! The worker blocks in [`EdgeSource::wait_for_edge`] with a timeout; the
//! timeout only exists so `stop()` is observed promptly.  Handlers run on
//! the worker thread, in registration order, and must be quick: event
//! detection is stalled while they run.
//!
//! A failing wait (not a timeout) ends the worker and clears the health
//! flag.  The line is handed back to the sensor so a later `start()` can
//! retry it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::app::events::Edge;
use crate::app::ports::{EdgeSource, MotionHandler, Worker};
use crate::error::{HardwareInitError, Result};
use crate::worker::{FaultGuard, SMALL_STACK_KB, WorkerSlot, join_worker, spawn_worker};

const WORKER_NAME: &str = "motion";

struct Shared {
    running: AtomicBool,
    healthy: AtomicBool,
    rising_edges: AtomicU64,
}

pub struct DigitalEventSensor<E> {
    shared: Arc<Shared>,
    handlers: Vec<Arc<dyn MotionHandler>>,
    slot: Mutex<WorkerSlot<E>>,
    timeout: Duration,
}

impl<E: EdgeSource> DigitalEventSensor<E> {
    /// `line` is the already-requested input; an `Err` leaves the sensor
    /// unhealthy and every `start()` fails.
    pub fn new(line: Result<E>, timeout: Duration) -> Self {
        let (slot, healthy) = match line {
            Ok(line) => (WorkerSlot::Idle(line), true),
            Err(e) => {
                warn!("Motion sensor unavailable: {}", e);
                (WorkerSlot::Unavailable, false)
            }
        };
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                healthy: AtomicBool::new(healthy),
                rising_edges: AtomicU64::new(0),
            }),
            handlers: Vec::new(),
            slot: Mutex::new(slot),
            timeout,
        }
    }

    /// Add a handler.  Takes `&mut self`, so it cannot race a running
    /// worker; the worker sees the list as it was at `start()`.
    pub fn register_callback(&mut self, handler: Arc<dyn MotionHandler>) {
        self.handlers.push(handler);
    }

    /// Rising edges dispatched since construction.
    pub fn rising_edges(&self) -> u64 {
        self.shared.rising_edges.load(Ordering::Relaxed)
    }

    fn lock_slot(&self) -> MutexGuard<'_, WorkerSlot<E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: EdgeSource> Worker for DigitalEventSensor<E> {
    fn name(&self) -> &'static str {
        WORKER_NAME
    }

    fn start(&self) -> Result<()> {
        let mut slot = self.lock_slot();
        if slot.has_handle() {
            if self.shared.running.load(Ordering::Acquire) {
                return Ok(());
            }
            slot.reap(WORKER_NAME);
        }

        let Some(line) = slot.take_idle() else {
            self.shared.healthy.store(false, Ordering::Release);
            return Err(HardwareInitError::Unavailable("motion line").into());
        };

        self.shared.running.store(true, Ordering::Release);
        self.shared.healthy.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handlers: Arc<[Arc<dyn MotionHandler>]> = self.handlers.clone().into();
        let timeout = self.timeout;

        match spawn_worker(WORKER_NAME, SMALL_STACK_KB, move || {
            watch(line, &shared, &handlers, timeout)
        }) {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.healthy.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn stop(&self) {
        let mut slot = self.lock_slot();
        self.shared.running.store(false, Ordering::Release);
        slot.reap(WORKER_NAME);
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire)
    }
}

impl<E> Drop for DigitalEventSensor<E> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let WorkerSlot::Running(handle) = std::mem::replace(slot, WorkerSlot::Unavailable) {
            let _ = join_worker(WORKER_NAME, handle);
        }
    }
}

fn watch<E: EdgeSource>(
    mut line: E,
    shared: &Shared,
    handlers: &[Arc<dyn MotionHandler>],
    timeout: Duration,
) -> E {
    let _guard = FaultGuard::new(WORKER_NAME, || {
        shared.running.store(false, Ordering::Release);
        shared.healthy.store(false, Ordering::Release);
    });
    info!("Motion watcher running ({} handlers)", handlers.len());
    while shared.running.load(Ordering::Acquire) {
        match line.wait_for_edge(timeout) {
            Ok(None) => {}
            Ok(Some(event)) if event.edge == Edge::Rising => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
                shared.rising_edges.fetch_add(1, Ordering::Relaxed);
                debug!("Motion: rising edge");
                for handler in handlers {
                    handler.on_motion(&event);
                }
            }
            Ok(Some(_)) => {}
            Err(e) => {
                error!("Motion line failed, watcher exiting: {}", e);
                shared.healthy.store(false, Ordering::Release);
                break;
            }
        }
    }
    shared.running.store(false, Ordering::Release);
    info!("Motion watcher stopped");
    line
}
