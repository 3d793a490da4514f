//! Still camera worker.
//!
//! `capture_image()` only raises a flag and signals a condvar; the worker
//! thread does the slow part (acquire to file, decode) and hands the frame
//! to every registered handler.  Requests that arrive while the flag is
//! already set, or while an acquisition is in flight, collapse into one
//! follow-up capture:
//!
//! ```text
//!   capture_image ×3 ─▶ requested=true ─▶ worker wakes, clears flag
//!                                          acquire ─▶ decode ─▶ handlers
//!   capture_image ×2 (during acquire) ─▶ requested=true ─▶ one more cycle
//! ```
//!
//! A failed acquisition or decode is logged and counted; the worker keeps
//! waiting for the next request.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::app::ports::{CaptureTrigger, FrameDecoder, FrameHandler, StillImageSource, Worker};
use crate::config::CameraConfig;
use crate::error::{Error, Result};
use crate::vision::{Frame, ImageFileDecoder};
use crate::worker::{CAPTURE_STACK_KB, FaultGuard, WorkerSlot, spawn_worker};

const WORKER_NAME: &str = "capture";

/// Where and how each still is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl From<&CameraConfig> for CaptureSettings {
    fn from(config: &CameraConfig) -> Self {
        Self {
            output_path: PathBuf::from(&config.output_path),
            width: config.width,
            height: config.height,
            quality: config.quality,
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    requested: bool,
    running: bool,
}

struct Shared {
    flags: Mutex<Flags>,
    wake: Condvar,
    healthy: AtomicBool,
    captures: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ImageCapturer<S, D = ImageFileDecoder> {
    shared: Arc<Shared>,
    handlers: Vec<Arc<dyn FrameHandler>>,
    settings: CaptureSettings,
    slot: Mutex<WorkerSlot<(S, D)>>,
}

impl<S, D> ImageCapturer<S, D>
where
    S: StillImageSource,
    D: FrameDecoder,
{
    pub fn new(source: S, decoder: D, settings: CaptureSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                flags: Mutex::new(Flags::default()),
                wake: Condvar::new(),
                healthy: AtomicBool::new(true),
                captures: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            handlers: Vec::new(),
            settings,
            slot: Mutex::new(WorkerSlot::Idle((source, decoder))),
        }
    }

    pub fn register_callback(&mut self, handler: Arc<dyn FrameHandler>) {
        self.handlers.push(handler);
    }

    /// Frames delivered to handlers.
    pub fn captures(&self) -> u64 {
        self.shared.captures.load(Ordering::Relaxed)
    }

    /// Acquisitions or decodes that failed.
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }
}

impl<S, D> Worker for ImageCapturer<S, D>
where
    S: StillImageSource,
    D: FrameDecoder,
{
    fn name(&self) -> &'static str {
        WORKER_NAME
    }

    fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.has_handle() {
            if self.shared.lock().running {
                return Ok(());
            }
            slot.reap(WORKER_NAME);
        }
        let Some(parts) = slot.take_idle() else {
            self.shared.healthy.store(false, Ordering::Release);
            return Err(Error::ThreadFault(WORKER_NAME));
        };

        self.shared.lock().running = true;
        let shared = Arc::clone(&self.shared);
        let handlers: Arc<[Arc<dyn FrameHandler>]> = self.handlers.clone().into();
        let settings = self.settings.clone();
        match spawn_worker(WORKER_NAME, CAPTURE_STACK_KB, move || {
            capture_loop(parts, &shared, &handlers, &settings)
        }) {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.lock().running = false;
                self.shared.healthy.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn stop(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.lock().running = false;
        self.shared.wake.notify_all();
        slot.reap(WORKER_NAME);
    }

    fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire)
    }
}

impl<S, D> CaptureTrigger for ImageCapturer<S, D>
where
    S: StillImageSource,
    D: FrameDecoder,
{
    fn capture_image(&self) {
        let mut flags = self.shared.lock();
        if flags.requested {
            debug!("Capture already pending; coalescing");
            return;
        }
        flags.requested = true;
        drop(flags);
        self.shared.wake.notify_one();
    }
}

impl<S, D> Drop for ImageCapturer<S, D> {
    fn drop(&mut self) {
        self.shared.lock().running = false;
        self.shared.wake.notify_all();
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        slot.reap(WORKER_NAME);
    }
}

fn capture_loop<S, D>(
    mut parts: (S, D),
    shared: &Shared,
    handlers: &[Arc<dyn FrameHandler>],
    settings: &CaptureSettings,
) -> (S, D)
where
    S: StillImageSource,
    D: FrameDecoder,
{
    let _guard = FaultGuard::new(WORKER_NAME, || {
        shared.lock().running = false;
        shared.healthy.store(false, Ordering::Release);
    });
    info!("Capture worker waiting for requests");
    loop {
        {
            let flags = shared.lock();
            let mut flags = shared
                .wake
                .wait_while(flags, |f| f.running && !f.requested)
                .unwrap_or_else(PoisonError::into_inner);
            if !flags.running {
                flags.requested = false;
                break;
            }
            flags.requested = false;
        }

        let (source, decoder) = &mut parts;
        let frame = source
            .acquire(&settings.output_path, settings.width, settings.height, settings.quality)
            .and_then(|()| decoder.decode(&settings.output_path));
        match frame {
            Ok(frame) => {
                shared.captures.fetch_add(1, Ordering::Relaxed);
                debug!("Captured {}x{} frame", frame.width(), frame.height());
                dispatch(handlers, frame);
            }
            Err(e) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Capture failed: {}", e);
            }
        }
    }
    info!("Capture worker stopped");
    parts
}

/// Every handler gets its own frame; the last one takes the original.
fn dispatch(handlers: &[Arc<dyn FrameHandler>], frame: Frame) {
    if let Some((last, rest)) = handlers.split_last() {
        for handler in rest {
            handler.on_frame(frame.clone());
        }
        last.on_frame(frame);
    }
}
