//! Panic reporting.
//!
//! Worker threads never propagate panics across thread boundaries: the
//! join helpers turn them into log lines and health flags.  The hook
//! installed here makes sure the panic itself is logged too, with the
//! name of the thread it happened on (every worker is named), before the
//! default hook prints its message.

use std::any::Any;
use std::panic::PanicHookInfo;

/// What the hook reports for one panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    pub thread: String,
    pub reason: String,
    pub location: Option<String>,
}

impl PanicReport {
    pub fn from_hook(info: &PanicHookInfo<'_>) -> Self {
        Self {
            thread: std::thread::current()
                .name()
                .unwrap_or("<unnamed>")
                .to_owned(),
            reason: panic_reason(info.payload()).to_owned(),
            location: info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line())),
        }
    }
}

impl core::fmt::Display for PanicReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "thread '{}' panicked", self.thread)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// The message carried by a panic payload.
pub fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Log every panic through `log`, then run the previous hook.
pub fn install_panic_handler() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC: {}", PanicReport::from_hook(info));
        previous(info);
    }));
}
