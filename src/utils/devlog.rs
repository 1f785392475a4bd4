//! Developer trace lines (pseudo level 6) with a per-thread capture sink.
//!
//! The runner emits one JSON line per execution through [`dev6!`](crate::dev6). Tests enable the
//! sink on their own thread and assert on the captured lines without touching the global logger.

use std::cell::RefCell;

/// Log target used for developer traces.
pub const DEV_TARGET: &str = "shelfquery::dev6";

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables capture for the current thread when dropped.
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Start capturing developer traces on the current thread.
#[must_use]
pub fn capture() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

/// Record a line if capture is enabled on this thread.
pub fn record(line: &str) {
    CAPTURE.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(line.to_owned());
        }
    });
}

/// Take every captured line, leaving the buffer empty.
pub fn take() -> Vec<String> {
    CAPTURE.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Emit a developer trace: captured per thread, and routed to the logger at TRACE.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __line = format!($($arg)*);
        $crate::utils::devlog::record(&__line);
        log::log!(target: $crate::utils::devlog::DEV_TARGET, log::Level::Trace, "{}", __line);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_on_current_thread() {
        let _g = capture();
        crate::dev6!("alpha {}", 1);
        crate::dev6!("beta");
        let lines = take();
        assert_eq!(lines, vec!["alpha 1".to_string(), "beta".to_string()]);
        assert!(take().is_empty());
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _g = capture();
        crate::dev6!("main");
        let child = std::thread::spawn(|| {
            crate::dev6!("child");
            take()
        })
        .join()
        .unwrap();
        assert!(child.is_empty());
        assert_eq!(take(), vec!["main".to_string()]);
    }

    #[test]
    fn nothing_recorded_after_guard_drops() {
        {
            let _g = capture();
        }
        crate::dev6!("dropped");
        assert!(take().is_empty());
    }
}
