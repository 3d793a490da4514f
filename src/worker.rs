//! Named worker threads.
//!
//! Every hardware-facing component owns exactly one of these.  Spawning
//! goes through [`spawn_worker`] so threads carry a name (visible in
//! panic messages, `top -H` and the log) and an explicit stack size.
//! Joining goes through [`join_worker`], which refuses to join the calling
//! thread and turns a worker panic into a log line instead of propagating
//! it across threads.

use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::error::{Error, Result};

/// Stack for the motion and sampling workers.
pub const SMALL_STACK_KB: usize = 256;
/// Stack for the capture worker (decode + classify + feed run on it).
pub const CAPTURE_STACK_KB: usize = 2048;
/// Stack for the request server.
pub const SERVER_STACK_KB: usize = 512;

/// Spawn a named thread with an explicit stack size.
pub fn spawn_worker<T, F>(name: &'static str, stack_kb: usize, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    info!("Spawning '{}' (stack={}KB)", name, stack_kb);

    thread::Builder::new()
        .name(name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .map_err(|err| {
            error!("Spawning '{}' failed: {}", name, err);
            Error::ThreadFault(name)
        })
}

/// Join a worker.  Returns its result, or `None` if it panicked or if the
/// caller *is* the worker (a handler asking its own component to stop).
pub fn join_worker<T>(name: &'static str, handle: JoinHandle<T>) -> Option<T> {
    if handle.thread().id() == thread::current().id() {
        warn!("'{}' asked to stop from its own thread; detaching instead of joining", name);
        return None;
    }
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            error!("'{}' worker panicked", name);
            None
        }
    }
}

/// Where a component keeps the resource its worker borrows.
///
/// The worker thread takes the resource by value and hands it back as its
/// return value, so a stopped component owns it again and can restart.
pub(crate) enum WorkerSlot<R> {
    Idle(R),
    Running(JoinHandle<R>),
    /// Never opened, or lost with a panicking worker.
    Unavailable,
}

impl<R> WorkerSlot<R> {
    pub(crate) fn has_handle(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Take the idle resource, leaving the slot `Unavailable`.
    pub(crate) fn take_idle(&mut self) -> Option<R> {
        match std::mem::replace(self, Self::Unavailable) {
            Self::Idle(resource) => Some(resource),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Join a worker that has been told to stop (or stopped by itself) and
    /// take its resource back.
    pub(crate) fn reap(&mut self, name: &'static str) {
        if let Self::Running(handle) = std::mem::replace(self, Self::Unavailable) {
            if let Some(resource) = join_worker(name, handle) {
                *self = Self::Idle(resource);
            }
        }
    }
}

/// Runs `on_panic` if the worker unwinds while this guard is alive.
pub(crate) struct FaultGuard<F: FnMut()> {
    name: &'static str,
    on_panic: F,
}

impl<F: FnMut()> FaultGuard<F> {
    pub(crate) fn new(name: &'static str, on_panic: F) -> Self {
        Self { name, on_panic }
    }
}

impl<F: FnMut()> Drop for FaultGuard<F> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("'{}' worker faulted; marking it unhealthy", self.name);
            (self.on_panic)();
        }
    }
}
