use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info};

use crate::error::{LifecycleError, LifecycleResult};
use crate::metrics::record_init;
use crate::policy::{ExitProcess, OnInitFailure, Terminate};

type Outcome<T> = LifecycleResult<Arc<T>>;
type PendingInit<T> = Shared<BoxFuture<'static, Outcome<T>>>;

/// Lifecycle of a shared resource as observed from outside its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Closed,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Uninitialized => "uninitialized",
            ResourceState::Initializing => "initializing",
            ResourceState::Ready => "ready",
            ResourceState::Failed => "failed",
            ResourceState::Closed => "closed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Slot<T> {
    Uninitialized,
    Initializing(PendingInit<T>),
    Ready(Arc<T>),
    Failed(LifecycleError),
    Closed,
}

enum Step<T> {
    Done(Outcome<T>),
    Wait(PendingInit<T>),
}

/// A once-guard holding a shared resource handle and the cached outcome of its initialization.
///
/// The first caller of `get_or_init` spawns the initializer onto the runtime. Every caller,
/// including the first, awaits that single attempt and receives a clone of the same outcome.
/// Because the attempt runs as its own task, dropping a waiting caller does not cancel it and
/// never causes a second attempt.
///
/// Once closed, a cell stays closed: no further initialization runs and the accessor reports
/// `LifecycleError::Closed`.
pub struct ResourceCell<T> {
    resource: &'static str,
    policy: OnInitFailure,
    terminator: Arc<dyn Terminate>,
    slot: Mutex<Slot<T>>,
}

impl<T> ResourceCell<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(resource: &'static str, policy: OnInitFailure) -> Self {
        Self {
            resource,
            policy,
            terminator: Arc::new(ExitProcess),
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    /// Replace the process terminator used by `OnInitFailure::TerminateProcess`.
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminate>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn policy(&self) -> OnInitFailure {
        self.policy
    }

    /// Return the shared handle, running `init` if and only if no attempt has been made yet.
    ///
    /// A failed attempt is cached: later callers observe the same error (or, under
    /// `TerminateProcess`, the terminator runs again) without `init` being retried.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> LifecycleResult<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LifecycleResult<T>> + Send + 'static,
    {
        let step = {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(handle) => Step::Done(Ok(handle.clone())),
                Slot::Failed(error) => Step::Done(Err(error.clone())),
                Slot::Closed => return Err(LifecycleError::Closed(self.resource)),
                Slot::Initializing(pending) => Step::Wait(pending.clone()),
                Slot::Uninitialized => {
                    let pending = self.spawn_init(init());
                    *slot = Slot::Initializing(pending.clone());
                    Step::Wait(pending)
                }
            }
        };

        let outcome = match step {
            Step::Done(outcome) => outcome,
            Step::Wait(pending) => self.settle(pending.await),
        };

        match outcome {
            Ok(handle) => Ok(handle),
            Err(error @ LifecycleError::Closed(_)) => Err(error),
            Err(error) => self.fail(error),
        }
    }

    /// Move the cell to `Closed`, returning the handle to the single caller that must release it.
    ///
    /// An initialization still in flight is awaited first, so its handle is not leaked. A cell
    /// that was never initialized is sealed and will not initialize later.
    pub async fn close(&self) -> Option<Arc<T>> {
        let pending = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Closed) {
                Slot::Ready(handle) => return Some(handle),
                Slot::Initializing(pending) => pending,
                Slot::Uninitialized | Slot::Failed(_) | Slot::Closed => return None,
            }
        };

        pending.await.ok()
    }

    pub fn state(&self) -> ResourceState {
        match &*self.lock() {
            Slot::Uninitialized => ResourceState::Uninitialized,
            Slot::Initializing(pending) => match pending.peek() {
                Some(Ok(_)) => ResourceState::Ready,
                Some(Err(_)) => ResourceState::Failed,
                None => ResourceState::Initializing,
            },
            Slot::Ready(_) => ResourceState::Ready,
            Slot::Failed(_) => ResourceState::Failed,
            Slot::Closed => ResourceState::Closed,
        }
    }

    fn spawn_init<Fut>(&self, init: Fut) -> PendingInit<T>
    where
        Fut: Future<Output = LifecycleResult<T>> + Send + 'static,
    {
        let resource = self.resource;
        let task = tokio::spawn(async move {
            info!(resource, "initializing resource");
            let started = Instant::now();
            let outcome = init.await.map(Arc::new);

            match &outcome {
                Ok(_) => {
                    record_init(resource, "success", started.elapsed());
                    info!(resource, "resource initialized");
                }
                Err(e) => {
                    record_init(resource, e.kind(), started.elapsed());
                    error!(resource, "resource initialization failed: {}", e);
                }
            }
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(LifecycleError::operation(resource, "initialize", e)))
        }
        .boxed()
        .shared()
    }

    /// Record a finished attempt in the slot, unless the cell was closed while it ran.
    fn settle(&self, outcome: Outcome<T>) -> Outcome<T> {
        let mut slot = self.lock();
        match &*slot {
            Slot::Closed => Err(LifecycleError::Closed(self.resource)),
            Slot::Initializing(_) => {
                *slot = match &outcome {
                    Ok(handle) => Slot::Ready(handle.clone()),
                    Err(error) => Slot::Failed(error.clone()),
                };
                outcome
            }
            _ => outcome,
        }
    }

    fn fail(&self, error: LifecycleError) -> LifecycleResult<Arc<T>> {
        match self.policy {
            OnInitFailure::ReportError => Err(error),
            OnInitFailure::TerminateProcess => self.terminator.terminate(self.resource, &error),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        // The slot is only ever swapped whole, so a poisoned lock still holds a consistent value.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::policy::PanicTerminator;

    async fn counted_init(
        counter: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    ) -> LifecycleResult<String> {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        if fail {
            Err(LifecycleError::connectivity("test", "refused"))
        } else {
            Ok("handle".to_string())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_a_single_initialization() {
        let cell = Arc::new(ResourceCell::<String>::new("test", OnInitFailure::ReportError));
        let counter = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cell = cell.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                cell.get_or_init(|| counted_init(counter, Duration::from_millis(50), false))
                    .await
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(cell.state(), ResourceState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_is_cached_and_reported_to_every_caller() {
        let cell = Arc::new(ResourceCell::<String>::new("test", OnInitFailure::ReportError));
        let counter = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                cell.get_or_init(|| counted_init(counter, Duration::from_millis(20), true))
                    .await
            }));
        }
        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert_eq!(err, LifecycleError::connectivity("test", "refused"));
        }

        // A later caller with a succeeding initializer still sees the cached failure.
        let counter_after = counter.clone();
        let err = cell
            .get_or_init(|| counted_init(counter_after, Duration::ZERO, false))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Connectivity { .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), ResourceState::Failed);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_restart_initialization() {
        let cell = Arc::new(ResourceCell::<String>::new("test", OnInitFailure::ReportError));
        let counter = Arc::new(AtomicUsize::new(0));

        let first = {
            let cell = cell.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                cell.get_or_init(|| counted_init(counter, Duration::from_millis(50), false))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        first.abort();

        let counter_second = counter.clone();
        let handle = cell
            .get_or_init(|| counted_init(counter_second, Duration::ZERO, false))
            .await
            .unwrap();

        assert_eq!(handle.as_str(), "handle");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_before_init_seals_the_cell() {
        let cell = ResourceCell::<String>::new("test", OnInitFailure::ReportError);
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(cell.close().await.is_none());
        assert_eq!(cell.state(), ResourceState::Closed);

        let counter_init = counter.clone();
        let err = cell
            .get_or_init(|| counted_init(counter_init, Duration::ZERO, false))
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::Closed("test"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_hands_out_the_handle_once() {
        let cell = ResourceCell::<String>::new("test", OnInitFailure::ReportError);
        let counter = Arc::new(AtomicUsize::new(0));

        cell.get_or_init(|| counted_init(counter, Duration::ZERO, false))
            .await
            .unwrap();

        assert!(cell.close().await.is_some());
        assert!(cell.close().await.is_none());
        assert_eq!(cell.state(), ResourceState::Closed);
    }

    #[tokio::test]
    async fn test_close_waits_for_inflight_initialization() {
        let cell = Arc::new(ResourceCell::<String>::new("test", OnInitFailure::ReportError));
        let counter = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let cell = cell.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                cell.get_or_init(|| counted_init(counter, Duration::from_millis(50), false))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cell.state(), ResourceState::Initializing);

        let released = cell.close().await;
        assert_eq!(released.as_deref().map(String::as_str), Some("handle"));

        // The caller that was waiting must not be handed a handle that is being released.
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err, LifecycleError::Closed("test"));
    }

    #[tokio::test]
    async fn test_terminate_policy_escalates_the_failure() {
        let terminator = Arc::new(PanicTerminator::new());
        let cell = Arc::new(
            ResourceCell::<String>::new("test", OnInitFailure::TerminateProcess)
                .with_terminator(terminator.clone()),
        );
        let counter = Arc::new(AtomicUsize::new(0));

        let task = {
            let cell = cell.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                cell.get_or_init(|| counted_init(counter, Duration::ZERO, true))
                    .await
            })
        };

        let joined = task.await;
        assert!(joined.unwrap_err().is_panic());
        assert_eq!(terminator.calls(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cell.state(), ResourceState::Failed);
    }
}
