//! The dispatcher: name registry, bounded invocation queue and the single
//! background worker that drains it.
//!
//! ```text
//!  publishers (any thread)                      worker (one thread)
//!  ───────────────────────                      ───────────────────
//!  register(name, handler)
//!    └─► registry: find-or-create group
//!          └─► group.add_event(callback)
//!
//!  invoke(name, argument)                       loop {
//!    ├─► reject: unknown name / queue full        wait on condvar until
//!    ├─► Invocation { group, argument }             running && queue non-empty
//!    └─► queue.push ─► notify ───────────────►      or stopped (exit)
//!                                                 pop head (FIFO)
//!                                                 invocation.dispatch_all_calls()
//!                                               }
//! ```
//!
//! Registry, queue and each group's member list are guarded by separate
//! locks; no operation holds two of them across a callback. The run-state
//! mutex is only held while the worker decides whether to wait or dequeue.
//!
//! Every `stop` retires the current worker epoch. A worker only dequeues while
//! its epoch is current, so a worker stopped from inside one of its own
//! callbacks exits after that fan-out even if the dispatcher was reset in the
//! meantime. At most one worker ever executes callbacks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::argument::{Argument, ArgumentBox};
use crate::callback::{Callback, Handler};
use crate::config::DispatcherConfig;
use crate::containers::{LockedMap, LockedQueue};
use crate::event::{DispatchEvent, TraceCallback};
use crate::group::{FanOutMode, SubscriptionGroup};
use crate::invocation::{Invocation, InvocationHandle};
use crate::state::RunState;
use crate::DispatchError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Result of [`Dispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStatus {
    /// The callback was appended and will run on the next invocation.
    Added,
    /// The callback was appended without a function; it stays blocked.
    Blocked,
    /// The callback failed validation; the group was left unchanged.
    Failed,
}

impl RegisterStatus {
    pub fn is_registered(self) -> bool {
        !matches!(self, RegisterStatus::Failed)
    }
}

impl fmt::Display for RegisterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterStatus::Added => f.write_str("added"),
            RegisterStatus::Blocked => f.write_str("blocked"),
            RegisterStatus::Failed => f.write_str("failed"),
        }
    }
}

/// State shared between the dispatcher handle and its worker thread.
struct Shared {
    config: DispatcherConfig,
    registry: LockedMap<String, Arc<SubscriptionGroup>>,
    queue: LockedQueue<Arc<Invocation>>,
    state: Mutex<RunState>,
    wake: Condvar,
    next_id: AtomicU64,
    /// Bumped under the state lock by every `stop`.
    epoch: AtomicU64,
    trace: Mutex<Option<Arc<TraceCallback>>>,
}

/// The worker thread and the epoch it was started in.
struct Worker {
    epoch: u64,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_current_thread(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        lock(&self.state)
    }

    fn set_state(&self, state: RunState) {
        *self.lock_state() = state;
        self.wake.notify_all();
    }

    /// Wakes the worker. The state lock is taken so the signal cannot slip in
    /// between the worker's emptiness check and its wait.
    fn notify(&self) {
        let _state = self.lock_state();
        self.wake.notify_all();
    }

    fn emit_event(&self, event: DispatchEvent) {
        tracing::trace!(%event, "dispatch event");
        // the callback runs without the trace lock held
        let callback = lock(&self.trace).clone();
        if let Some(callback) = callback {
            callback(&event);
        }
    }

    /// Retires the running worker and wakes it.
    fn retire(&self) {
        let mut state = self.lock_state();
        *state = RunState::Stopped;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.wake.notify_all();
    }

    /// Worker loop. Returns once the run state becomes `Stopped` or `epoch`
    /// is retired.
    ///
    /// Invocations still queued at that point stay queued for the next worker.
    fn run(&self, epoch: u64) {
        tracing::info!(worker = %self.config.worker_name, epoch, "worker started");
        loop {
            let invocation = {
                let mut state = self.lock_state();
                loop {
                    if self.epoch.load(Ordering::Acquire) != epoch {
                        tracing::info!(epoch, pending = self.queue.len(), "retired worker exiting");
                        return;
                    }
                    match *state {
                        RunState::Stopped => {
                            tracing::info!(
                                pending = self.queue.len(),
                                "worker exiting"
                            );
                            return;
                        }
                        RunState::Running => {
                            if let Some(invocation) = self.queue.get() {
                                break invocation;
                            }
                        }
                        _ => {}
                    }
                    state = self.wake.wait(state).unwrap_or_else(|p| p.into_inner());
                }
            };
            self.execute(&invocation);
        }
    }

    fn execute(&self, invocation: &Invocation) {
        let name = invocation.name().unwrap_or_default();

        if invocation.run_state() == RunState::Blocked {
            tracing::debug!(id = invocation.id(), name = %name, "invocation blocked, skipping");
            invocation.complete(Err(DispatchError::InvocationBlocked));
            self.emit_event(DispatchEvent::Dispatch {
                name,
                successes: None,
            });
            return;
        }

        let result = invocation.dispatch_all_calls();
        match &result {
            Ok(successes) => tracing::debug!(
                id = invocation.id(),
                name = %name,
                successes,
                waited = ?invocation.age(),
                "invocation dispatched"
            ),
            Err(err) => tracing::warn!(
                id = invocation.id(),
                name = %name,
                label = err.as_label(),
                "invocation failed: {err}"
            ),
        }
        self.emit_event(DispatchEvent::Dispatch {
            name,
            successes: result.ok(),
        });
    }
}

/// In-process dispatcher of named callbacks.
///
/// # Examples
///
/// ```
/// use event_relay::{Dispatcher, Handler};
/// use std::sync::{Arc, Mutex};
///
/// let dispatcher = Dispatcher::default();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// dispatcher.register("email", Handler::string(move |s| {
///     sink.lock().unwrap().push(s.to_string());
///     Ok(())
/// }));
///
/// dispatcher.start().unwrap();
/// let handle = dispatcher.invoke("email", "our email to be sent").unwrap();
/// assert_eq!(handle.wait().unwrap().successes, 1);
/// dispatcher.stop();
///
/// assert_eq!(*seen.lock().unwrap(), vec!["our email to be sent".to_string()]);
/// ```
pub struct Dispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registry: LockedMap::new(),
                queue: LockedQueue::new(),
                state: Mutex::new(RunState::Running),
                wake: Condvar::new(),
                next_id: AtomicU64::new(1),
                epoch: AtomicU64::new(0),
                trace: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    // ---------------------------------------------------------------------------------------------
    // Tracing
    // ---------------------------------------------------------------------------------------------

    /// Sets a callback invoked for every registry, queue and lifecycle event.
    ///
    /// Worker-side events are emitted on the worker thread.
    pub fn set_trace_callback(&self, callback: impl Fn(&DispatchEvent) + Send + Sync + 'static) {
        *lock(&self.shared.trace) = Some(Arc::new(callback));
    }

    pub fn clear_trace_callback(&self) {
        *lock(&self.shared.trace) = None;
    }

    // ---------------------------------------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------------------------------------

    pub fn has_callback(&self, name: &str) -> bool {
        self.shared.registry.contains_key(name)
    }

    /// The group registered under `name`.
    pub fn group(&self, name: &str) -> Option<Arc<SubscriptionGroup>> {
        self.shared.registry.get(name)
    }

    /// Registers `handler` under `name`, creating the group on first use.
    ///
    /// Registration unblocks the group. Passing `None` appends an inert
    /// subscriber that is blocked from the start.
    pub fn register(&self, name: &str, handler: impl Into<Option<Handler>>) -> RegisterStatus {
        let fan_out = self.shared.config.fan_out;
        let group = self
            .shared
            .registry
            .get_or_insert_with(name.to_string(), || {
                Arc::new(SubscriptionGroup::new(name, fan_out))
            });
        group.set_block_state(false);

        let callback = Callback::new(name);
        callback.set_callback(handler.into());

        let status = if !callback.is_valid() {
            RegisterStatus::Failed
        } else {
            let blocked = callback.run_state() == RunState::Blocked;
            match group.add_event(Some(Arc::new(callback))) {
                true if blocked => RegisterStatus::Blocked,
                true => RegisterStatus::Added,
                false => RegisterStatus::Failed,
            }
        };

        tracing::debug!(name, %status, members = group.len(), "register");
        self.shared.emit_event(DispatchEvent::Register {
            name: name.to_string(),
            status,
        });
        status
    }

    /// Blocks (`true`) or unblocks (`false`) every later dispatch of `name`.
    ///
    /// Invocations the worker has already dequeued are not affected.
    pub fn block_event(&self, name: &str, blocked: bool) -> Result<(), DispatchError> {
        let group = self.lookup(name)?;
        group.set_block_state(blocked);
        tracing::debug!(name, blocked, "block");
        self.shared.emit_event(DispatchEvent::Block {
            name: name.to_string(),
            blocked,
        });
        Ok(())
    }

    /// Changes the fan-out mode of an existing group.
    pub fn set_fan_out(&self, name: &str, mode: FanOutMode) -> Result<(), DispatchError> {
        self.lookup(name)?.set_fan_out(mode);
        Ok(())
    }

    /// Number of registered names.
    pub fn callbacks_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Number of queued invocations.
    pub fn calls_count(&self) -> usize {
        self.shared.queue.len()
    }

    fn lookup(&self, name: &str) -> Result<Arc<SubscriptionGroup>, DispatchError> {
        self.shared
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::UnknownCallback {
                name: name.to_string(),
            })
    }

    // ---------------------------------------------------------------------------------------------
    // Invocation
    // ---------------------------------------------------------------------------------------------

    /// Queues a fan-out of `name` with `argument`.
    ///
    /// Returns as soon as the invocation is queued; the callbacks run later on
    /// the worker. The handle can be used to wait for the outcome.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownCallback`] if nothing was registered under `name`
    /// - [`DispatchError::QueueFull`] if the queue holds `max_capacity` invocations
    pub fn invoke(
        &self,
        name: &str,
        argument: impl Into<Argument>,
    ) -> Result<InvocationHandle, DispatchError> {
        self.admit(name, argument.into()).inspect_err(|_| {
            self.shared.emit_event(DispatchEvent::Invoke {
                name: name.to_string(),
                admitted: false,
            });
        })
    }

    fn admit(&self, name: &str, argument: Argument) -> Result<InvocationHandle, DispatchError> {
        let group = self.lookup(name).inspect_err(|_| {
            tracing::debug!(name, "invoke rejected: no such callback");
        })?;

        let capacity = self.shared.config.max_capacity;
        if self.shared.queue.len() >= capacity {
            tracing::debug!(name, capacity, "invoke rejected: queue full");
            return Err(DispatchError::QueueFull { capacity });
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let invocation = Arc::new(Invocation::new(id, ArgumentBox::from(argument)));
        invocation.set_event_handler(group);

        // traced before the worker can see it
        self.shared.emit_event(DispatchEvent::Invoke {
            name: name.to_string(),
            admitted: true,
        });
        self.shared.queue.push(invocation.clone());
        self.shared.notify();
        tracing::debug!(id, name, "invocation queued");
        Ok(InvocationHandle::new(invocation))
    }

    // ---------------------------------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------------------------------

    pub fn run_state(&self) -> RunState {
        *self.shared.lock_state()
    }

    /// Launches the worker thread.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::WorkerAlreadyRunning`] if a worker is alive, including
    ///   one stopped from inside a callback that has not returned yet
    /// - [`DispatchError::Stopped`] after [`stop`](Self::stop) without [`reset`](Self::reset)
    /// - [`DispatchError::WorkerSpawn`] if the thread could not be created
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Err(DispatchError::WorkerAlreadyRunning);
        }
        if self.run_state() == RunState::Stopped {
            return Err(DispatchError::Stopped);
        }
        if let Some(finished) = worker.take() {
            let _ = finished.handle.join();
        }

        let epoch = self.shared.epoch.load(Ordering::Acquire);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(self.shared.config.worker_name.clone())
            .spawn(move || shared.run(epoch))
            .map_err(|err| DispatchError::WorkerSpawn {
                reason: err.to_string(),
            })?;
        *worker = Some(Worker { epoch, handle });
        drop(worker);

        self.shared.emit_event(DispatchEvent::Start {});
        Ok(())
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// A fan-out in progress finishes first. Queued invocations are kept and
    /// run by the next worker after [`reset`](Self::reset) and
    /// [`start`](Self::start). Called from inside a callback, the worker is
    /// retired but not joined; it exits once that fan-out returns, and
    /// [`start`](Self::start) refuses until it has.
    pub fn stop(&self) {
        self.shared.retire();
        self.shared.emit_event(DispatchEvent::Stop {});

        let worker = {
            let mut guard = lock(&self.worker);
            if guard.as_ref().is_some_and(Worker::is_current_thread) {
                tracing::warn!("stop called from the worker thread; worker exits after this fan-out");
                None
            } else {
                guard.take()
            }
        };
        if let Some(worker) = worker {
            if worker.handle.join().is_err() {
                tracing::warn!(epoch = worker.epoch, "worker thread panicked");
            }
        }
        tracing::info!(pending = self.calls_count(), "dispatcher stopped");
    }

    /// Returns the dispatcher to the running state and wakes the worker.
    pub fn reset(&self) {
        self.shared.set_state(RunState::Running);
        self.shared.emit_event(DispatchEvent::Reset {});
    }

    /// Makes the worker stop draining the queue until [`resume`](Self::resume).
    ///
    /// Has no effect on a stopped dispatcher.
    pub fn pause(&self) {
        let mut state = self.shared.lock_state();
        if *state == RunState::Running {
            *state = RunState::Interrupt;
        }
    }

    pub fn resume(&self) {
        let mut state = self.shared.lock_state();
        if *state == RunState::Interrupt {
            *state = RunState::Running;
            self.shared.wake.notify_all();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
        for invocation in self.shared.queue.drain() {
            invocation.complete(Err(DispatchError::Discarded));
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("run_state", &self.run_state())
            .field("callbacks", &self.callbacks_count())
            .field("calls", &self.calls_count())
            .field("max_capacity", &self.shared.config.max_capacity)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
