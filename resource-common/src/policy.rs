use tracing::error;

use crate::error::LifecycleError;

/// What a manager does with a failed initialization once it has been cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInitFailure {
    /// Hand the cached error to every caller of the accessor.
    ReportError,
    /// Escalate to the process terminator. No degraded handle is ever returned.
    TerminateProcess,
}

/// The seam through which a fatal initialization failure ends the process.
pub trait Terminate: Send + Sync {
    fn terminate(&self, resource: &'static str, error: &LifecycleError) -> !;
}

/// Logs the failure and exits with a non-zero status.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitProcess;

impl Terminate for ExitProcess {
    fn terminate(&self, resource: &'static str, error: &LifecycleError) -> ! {
        error!(resource, "fatal initialization failure, exiting: {}", error);
        std::process::exit(1)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::PanicTerminator;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::Terminate;
    use crate::error::LifecycleError;

    /// Panics instead of exiting, so tests can observe the fatal path from a joined task.
    #[derive(Debug, Default)]
    pub struct PanicTerminator {
        calls: AtomicUsize,
    }

    impl PanicTerminator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Terminate for PanicTerminator {
        fn terminate(&self, resource: &'static str, error: &LifecycleError) -> ! {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("{resource} terminated the process: {error}")
        }
    }
}
