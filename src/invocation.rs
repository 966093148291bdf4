//! One queued request to fan out a group with one argument.
//!
//! An [`Invocation`] is created at admission, shared between the work queue
//! and the publisher's [`InvocationHandle`], and completed exactly once by the
//! worker (or by the dispatcher when it is dropped with work still queued).
//! Completion stores the [`FanOutReport`], including every callback failure,
//! so the publisher can inspect the outcome of its own request.

use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::argument::ArgumentBox;
use crate::callback::panic_message;
use crate::group::{FanOutReport, SubscriptionGroup};
use crate::state::{AtomicState, ResultState, RunState};
use crate::DispatchError;

/// What a completed invocation resolved to.
pub type InvocationOutcome = Result<FanOutReport, DispatchError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct Invocation {
    id: u64,
    group: Mutex<Option<Arc<SubscriptionGroup>>>,
    argument: Mutex<ArgumentBox>,
    run_state: AtomicState<RunState>,
    result_state: AtomicState<ResultState>,
    created_at: Mutex<Instant>,
    outcome: Mutex<Option<InvocationOutcome>>,
    done: Condvar,
}

impl Invocation {
    pub fn new(id: u64, argument: ArgumentBox) -> Self {
        Self {
            id,
            group: Mutex::new(None),
            argument: Mutex::new(argument),
            run_state: AtomicState::new(RunState::Waiting),
            result_state: AtomicState::new(ResultState::Created),
            created_at: Mutex::new(Instant::now()),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the bound group.
    pub fn name(&self) -> Option<String> {
        lock(&self.group).as_ref().map(|g| g.name().to_string())
    }

    /// Binds the group this invocation fans out to.
    pub fn set_event_handler(&self, group: Arc<SubscriptionGroup>) {
        *lock(&self.group) = Some(group);
    }

    /// Valid when bound to a group that has at least one member.
    pub fn is_valid(&self) -> bool {
        lock(&self.group).as_ref().is_some_and(|g| g.is_valid())
    }

    /// Turns this invocation into a no-op if the worker has not reached it yet.
    pub fn set_block_state(&self) {
        self.run_state.store(RunState::Blocked);
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.load()
    }

    pub fn result_state(&self) -> ResultState {
        self.result_state.load()
    }

    /// Copy of the argument delivered to the callbacks.
    pub fn argument(&self) -> ArgumentBox {
        lock(&self.argument).clone()
    }

    /// Refreshes the creation timestamp.
    pub fn touch(&self) {
        *lock(&self.created_at) = Instant::now();
    }

    /// Time since creation or the last [`touch`](Self::touch).
    pub fn age(&self) -> Duration {
        lock(&self.created_at).elapsed()
    }

    /// Fans out to the bound group and returns the number of callbacks that
    /// succeeded.
    ///
    /// The result state ends `success` whenever the fan-out itself ran, even if
    /// no callback succeeded; individual failures live in the report.
    pub fn dispatch_all_calls(&self) -> Result<usize, DispatchError> {
        let group = match lock(&self.group).clone() {
            Some(group) if group.is_valid() => group,
            _ => {
                self.result_state.store(ResultState::Invalid);
                self.complete(Err(DispatchError::InvalidInvocation));
                return Err(DispatchError::InvalidInvocation);
            }
        };

        self.run_state.store(RunState::Running);
        self.result_state.store(ResultState::Failed);

        let outcome = {
            let argument = lock(&self.argument);
            panic::catch_unwind(AssertUnwindSafe(|| group.dispatch_all_calls(&argument))).map_err(
                |payload| DispatchError::DispatchPanicked {
                    message: panic_message(payload.as_ref()),
                },
            )
        };

        self.run_state.transition(RunState::Running, RunState::NotRunning);
        self.result_state.store(ResultState::Success);

        let successes = outcome.as_ref().map(|r| r.successes).map_err(Clone::clone);
        self.complete(outcome);
        successes
    }

    /// Stores the outcome and wakes every waiter.
    pub(crate) fn complete(&self, outcome: InvocationOutcome) {
        *lock(&self.outcome) = Some(outcome);
        self.done.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.outcome).is_some()
    }

    /// Outcome, if the invocation has completed.
    pub fn outcome(&self) -> Option<InvocationOutcome> {
        lock(&self.outcome).clone()
    }

    /// Blocks until the invocation completes.
    pub fn wait(&self) -> InvocationOutcome {
        let mut guard = lock(&self.outcome);
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self.done.wait(guard).unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Blocks until the invocation completes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<InvocationOutcome> {
        let guard = lock(&self.outcome);
        let (guard, _) = self
            .done
            .wait_timeout_while(guard, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(|p| p.into_inner());
        guard.clone()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("run_state", &self.run_state())
            .field("result_state", &self.result_state())
            .finish()
    }
}

/// Publisher-side view of an admitted invocation.
#[derive(Debug, Clone)]
pub struct InvocationHandle(Arc<Invocation>);

impl InvocationHandle {
    pub(crate) fn new(invocation: Arc<Invocation>) -> Self {
        Self(invocation)
    }
}

impl Deref for InvocationHandle {
    type Target = Invocation;

    fn deref(&self) -> &Invocation {
        &self.0
    }
}
