//! Exceptions attached to log records
//!
//! `ExceptionInfo` is the error carried by a record. `StatusException` is the
//! error shape raised by the task-control system; sinks special-case it by type.
//!
//! The "currently handled" exception is a thread-local scope entered with
//! [`handling`]. The bridge sink reads it to pick a status code, independently
//! of whatever exception the record itself carries.

use std::any::type_name;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

/// Error reported by the task-control system, carrying its numeric status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StatusException {
    /// Human-readable description
    pub message: String,
    /// Status code reported alongside the message
    pub status: i64,
}

impl StatusException {
    pub fn new(message: impl Into<String>, status: i64) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

/// An error attached to a log record
#[derive(Clone)]
pub struct ExceptionInfo {
    type_name: &'static str,
    error: Arc<dyn StdError + Send + Sync + 'static>,
    backtrace: Option<Arc<str>>,
}

impl ExceptionInfo {
    /// Wrap an error, capturing a backtrace if `RUST_BACKTRACE` enables it
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let backtrace = Backtrace::capture();
        let backtrace = match backtrace.status() {
            BacktraceStatus::Captured => Some(Arc::from(backtrace.to_string())),
            _ => None,
        };

        Self {
            type_name: type_name::<E>(),
            error: Arc::new(error),
            backtrace,
        }
    }

    /// Drop any captured backtrace
    pub fn without_backtrace(mut self) -> Self {
        self.backtrace = None;
        self
    }

    /// Replace the captured backtrace text
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(Arc::from(backtrace.into()));
        self
    }

    /// Fully qualified type name of the wrapped error
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    pub fn backtrace(&self) -> Option<&str> {
        self.backtrace.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// The wrapped error as a `StatusException`, if it is one
    pub fn status_exception(&self) -> Option<&StatusException> {
        self.downcast_ref::<StatusException>()
    }
}

impl fmt::Debug for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionInfo")
            .field("type_name", &self.type_name)
            .field("error", &self.error.to_string())
            .field("backtrace", &self.backtrace.is_some())
            .finish()
    }
}

impl<E> From<E> for ExceptionInfo
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

thread_local! {
    static HANDLING: RefCell<Vec<(u64, ExceptionInfo)>> = const { RefCell::new(Vec::new()) };
    static NEXT_SCOPE: Cell<u64> = const { Cell::new(0) };
}

/// Keeps an exception current on this thread until dropped
#[must_use = "the exception stops being current when the guard is dropped"]
pub struct HandlingGuard {
    scope: u64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for HandlingGuard {
    fn drop(&mut self) {
        let _ = HANDLING.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(scope, _)| *scope == self.scope) {
                stack.remove(pos);
            }
        });
    }
}

/// Mark `exception` as the one currently being handled on this thread
///
/// Scopes nest; the most recently opened live guard wins, whatever order
/// the guards are dropped in.
pub fn handling(exception: ExceptionInfo) -> HandlingGuard {
    let scope = NEXT_SCOPE.with(|next| {
        let scope = next.get();
        next.set(scope.wrapping_add(1));
        scope
    });
    HANDLING.with(|stack| stack.borrow_mut().push((scope, exception)));
    HandlingGuard {
        scope,
        _not_send: PhantomData,
    }
}

/// The exception currently being handled on this thread, if any
pub fn current() -> Option<ExceptionInfo> {
    HANDLING
        .try_with(|stack| stack.borrow().last().map(|(_, exc)| exc.clone()))
        .ok()
        .flatten()
}

/// Status code of the current exception, if it is a `StatusException`
pub fn current_status() -> Option<i64> {
    current().and_then(|exc| exc.status_exception().map(|s| s.status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_exception_display() {
        let err = StatusException::new("bad state", 261_128_203);
        assert_eq!(err.to_string(), "bad state");
    }

    #[test]
    fn test_exception_info_downcast() {
        let info = ExceptionInfo::new(StatusException::new("bad state", 7));
        assert_eq!(info.status_exception().map(|s| s.status), Some(7));
        assert!(info.type_name().ends_with("StatusException"));

        let io = ExceptionInfo::new(std::io::Error::other("disk gone"));
        assert!(io.status_exception().is_none());
        assert!(io.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_no_exception_outside_scope() {
        assert!(current().is_none());
        assert!(current_status().is_none());
    }

    #[test]
    fn test_handling_scope_nests() {
        let outer = handling(ExceptionInfo::new(StatusException::new("outer", 1)));
        assert_eq!(current_status(), Some(1));

        {
            let _inner = handling(ExceptionInfo::new(std::io::Error::other("inner")));
            assert!(current().is_some());
            assert_eq!(current_status(), None);
        }

        assert_eq!(current_status(), Some(1));
        drop(outer);
        assert!(current().is_none());
    }

    #[test]
    fn test_handling_guards_dropped_out_of_order() {
        let outer = handling(ExceptionInfo::new(StatusException::new("outer", 1)));
        let inner = handling(ExceptionInfo::new(StatusException::new("inner", 2)));

        drop(outer);
        assert_eq!(current_status(), Some(2));

        drop(inner);
        assert!(current().is_none());
    }

    #[test]
    fn test_handling_guards_held_in_a_vec() {
        let mut guards: Vec<HandlingGuard> = (1..=3)
            .map(|status| handling(ExceptionInfo::new(StatusException::new("held", status))))
            .collect();
        assert_eq!(current_status(), Some(3));

        guards.remove(1);
        assert_eq!(current_status(), Some(3));
        guards.pop();
        assert_eq!(current_status(), Some(1));
        guards.clear();
        assert!(current().is_none());
    }

    #[test]
    fn test_without_backtrace_clears_text() {
        let info =
            ExceptionInfo::new(StatusException::new("bad state", 7)).with_backtrace("frame 0");
        assert_eq!(info.backtrace(), Some("frame 0"));
        assert!(info.without_backtrace().backtrace().is_none());
    }

    #[test]
    fn test_handling_is_thread_local() {
        let _guard = handling(ExceptionInfo::new(StatusException::new("here", 3)));
        let seen = std::thread::spawn(current_status).join().unwrap();
        assert_eq!(seen, None);
        assert_eq!(current_status(), Some(3));
    }
}
