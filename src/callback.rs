//! A single subscriber function bound to a name.
//!
//! Each [`Callback`] tracks two independent state machines:
//!
//! ```text
//! run:    waiting ─► ready ─► running ─► not_running ─► running ─► ...
//!                      │                      ▲
//!                      └──────► blocked ──────┘   (sticky until cleared)
//!
//! result: created ─► failed ─► success ─► failed ─► ...
//!                      invalid                    (sticky, never left)
//! ```
//!
//! The result state is written pessimistically: it becomes `failed` before
//! the handler runs and only turns `success` once the handler returned `Ok`.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::argument::{ArgType, Argument, ArgumentBox};
use crate::error::{CallbackFailure, FailureKind};
use crate::state::{AtomicState, ResultState, RunState};

type VoidFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type StrFn = dyn Fn(&str) -> anyhow::Result<()> + Send + Sync;
type IntFn = dyn Fn(i64) -> anyhow::Result<()> + Send + Sync;

/// A subscriber function, typed by the argument it accepts.
pub enum Handler {
    Void(Box<VoidFn>),
    Str(Box<StrFn>),
    Int(Box<IntFn>),
}

impl Handler {
    /// Handler that takes no argument; any published value is ignored.
    pub fn void(f: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Handler::Void(Box::new(f))
    }

    pub fn string(f: impl Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Handler::Str(Box::new(f))
    }

    pub fn integer(f: impl Fn(i64) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Handler::Int(Box::new(f))
    }

    /// The declared parameter type.
    pub fn arg_type(&self) -> ArgType {
        match self {
            Handler::Void(_) => ArgType::Void,
            Handler::Str(_) => ArgType::String,
            Handler::Int(_) => ArgType::Integer,
        }
    }

    /// Delivers `argument` converted to the declared parameter type.
    ///
    /// Strings accept integers (decimal rendering) and void (empty string).
    /// Integers accept decimal strings only.
    fn call(&self, argument: &ArgumentBox) -> Result<(), FailureKind> {
        let (value, _) = argument.read_value();
        match (self, value) {
            (Handler::Void(f), _) => catch(|| f()),
            (Handler::Str(f), Argument::Str(s)) => catch(|| f(s)),
            (Handler::Str(f), Argument::Int(n)) => {
                let rendered = n.to_string();
                catch(|| f(&rendered))
            }
            (Handler::Str(f), Argument::None) => catch(|| f("")),
            (Handler::Int(f), Argument::Int(n)) => catch(|| f(*n)),
            (Handler::Int(f), Argument::Str(s)) => match s.trim().parse::<i64>() {
                Ok(n) => catch(|| f(n)),
                Err(_) => Err(FailureKind::ArgumentMismatch {
                    expected: ArgType::Integer,
                    found: ArgType::String,
                }),
            },
            (Handler::Int(_), Argument::None) => Err(FailureKind::ArgumentMismatch {
                expected: ArgType::Integer,
                found: ArgType::Void,
            }),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::<{}>", self.arg_type())
    }
}

fn catch(body: impl FnOnce() -> anyhow::Result<()>) -> Result<(), FailureKind> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(FailureKind::Returned(format!("{err:#}"))),
        Err(payload) => Err(FailureKind::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result of one [`Callback::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    /// Blocked or invalid; nothing ran.
    Skipped,
    Failed(CallbackFailure),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success)
    }
}

/// One subscriber registered under a name.
pub struct Callback {
    name: String,
    handler: Mutex<Option<Arc<Handler>>>,
    run_state: AtomicState<RunState>,
    result_state: AtomicState<ResultState>,
}

impl Callback {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: Mutex::new(None),
            run_state: AtomicState::new(RunState::Waiting),
            result_state: AtomicState::new(ResultState::Created),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_handler(&self) -> MutexGuard<'_, Option<Arc<Handler>>> {
        self.handler.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Binds `handler` and makes the callback ready.
    ///
    /// Binding `None` registers a deliberately inert subscriber: the callback
    /// is blocked immediately but stays valid. Always returns `true`.
    pub fn set_callback(&self, handler: Option<Handler>) -> bool {
        let mut guard = self.lock_handler();
        self.run_state.store(RunState::Ready);
        if handler.is_none() {
            self.run_state.store(RunState::Blocked);
        }
        *guard = handler.map(Arc::new);
        true
    }

    /// Declared parameter type of the bound handler, if any.
    pub fn arg_type(&self) -> Option<ArgType> {
        self.lock_handler().as_deref().map(Handler::arg_type)
    }

    /// Blocks or unblocks this callback. A callback without a handler stays blocked.
    pub fn set_blocked(&self, blocked: bool) {
        let guard = self.lock_handler();
        if blocked {
            self.run_state.store(RunState::Blocked);
        } else if guard.is_some() {
            self.run_state.store(RunState::Ready);
        }
    }

    /// Marks the callback permanently invalid.
    pub fn invalidate(&self) {
        self.result_state.store(ResultState::Invalid);
    }

    pub fn is_valid(&self) -> bool {
        self.result_state() != ResultState::Invalid
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.load()
    }

    pub fn result_state(&self) -> ResultState {
        self.result_state.load()
    }

    /// Runs the handler with `argument`.
    ///
    /// Errors and panics raised by the handler are captured into the returned
    /// [`CallOutcome`]; they never unwind into the caller.
    ///
    /// The handler runs without the callback's lock held, so it may block,
    /// rebind or inspect its own callback. A block set from inside the handler
    /// survives the call.
    pub fn invoke(&self, argument: &ArgumentBox) -> CallOutcome {
        if self.run_state() == RunState::Blocked || !self.is_valid() {
            return CallOutcome::Skipped;
        }
        let Some(handler) = self.lock_handler().clone() else {
            // unbound concurrently with this call
            self.run_state.store(RunState::Blocked);
            return CallOutcome::Skipped;
        };

        self.result_state.store(ResultState::Failed);
        self.run_state.store(RunState::Running);
        let result = handler.call(argument);
        self.run_state.transition(RunState::Running, RunState::NotRunning);
        match result {
            Ok(()) => {
                self.result_state.store(ResultState::Success);
                CallOutcome::Success
            }
            Err(kind) => {
                let failure = CallbackFailure {
                    callback: self.name.clone(),
                    kind,
                };
                tracing::warn!(
                    callback = %self.name,
                    label = failure.as_label(),
                    "callback failed: {}",
                    failure.kind
                );
                CallOutcome::Failed(failure)
            }
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("run_state", &self.run_state())
            .field("result_state", &self.result_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    fn recording() -> (Arc<Mutex<Vec<String>>>, Handler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = Handler::string(move |s| {
            sink.lock().unwrap().push(s.to_string());
            Ok(())
        });
        (seen, handler)
    }

    #[test]
    fn test_invoke_delivers_string() {
        let (seen, handler) = recording();
        let callback = Callback::new("test");
        assert!(callback.set_callback(Some(handler)));
        assert!(callback.is_valid());
        assert_eq!(callback.arg_type(), Some(ArgType::String));

        let argument = ArgumentBox::from(Argument::from("arg"));
        assert_eq!(callback.invoke(&argument), CallOutcome::Success);
        assert_eq!(callback.run_state(), RunState::NotRunning);
        assert_eq!(callback.result_state(), ResultState::Success);
        assert_eq!(*seen.lock().unwrap(), vec!["arg".to_string()]);
    }

    #[test]
    fn test_null_handler_is_blocked_but_valid() {
        let callback = Callback::new("testBlocked");
        assert!(callback.set_callback(None));
        assert_eq!(callback.run_state(), RunState::Blocked);
        assert!(callback.is_valid());

        let argument = ArgumentBox::void();
        assert_eq!(callback.invoke(&argument), CallOutcome::Skipped);
        assert_eq!(callback.run_state(), RunState::Blocked);
        assert_eq!(callback.result_state(), ResultState::Created);

        // without a handler there is nothing to unblock
        callback.set_blocked(false);
        assert_eq!(callback.run_state(), RunState::Blocked);
    }

    #[test]
    fn test_returned_error_is_captured() {
        let callback = Callback::new("failing");
        callback.set_callback(Some(Handler::string(|s| anyhow::bail!("rejected {s}"))));

        let outcome = callback.invoke(&ArgumentBox::from(Argument::from("x")));
        assert_eq!(
            outcome,
            CallOutcome::Failed(CallbackFailure {
                callback: "failing".into(),
                kind: FailureKind::Returned("rejected x".into()),
            })
        );
        assert_eq!(callback.run_state(), RunState::NotRunning);
        assert_eq!(callback.result_state(), ResultState::Failed);
    }

    #[test]
    fn test_panic_is_captured() {
        let callback = Callback::new("panicking");
        callback.set_callback(Some(Handler::void(|| panic!("error"))));

        match callback.invoke(&ArgumentBox::void()) {
            CallOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Panicked("error".into()))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(callback.result_state(), ResultState::Failed);

        // the callback stays usable after a panic
        callback.set_callback(Some(Handler::void(|| Ok(()))));
        assert!(callback.invoke(&ArgumentBox::void()).is_success());
    }

    #[test]
    fn test_invalid_callback_is_skipped() {
        let (seen, handler) = recording();
        let callback = Callback::new("invalid");
        callback.set_callback(Some(handler));
        callback.invalidate();

        assert!(!callback.is_valid());
        assert_eq!(
            callback.invoke(&ArgumentBox::from(Argument::from("x"))),
            CallOutcome::Skipped
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_block_and_unblock() {
        let (seen, handler) = recording();
        let callback = Callback::new("toggle");
        callback.set_callback(Some(handler));

        callback.set_blocked(true);
        assert_eq!(
            callback.invoke(&ArgumentBox::from(Argument::from("a"))),
            CallOutcome::Skipped
        );
        callback.set_blocked(false);
        assert_eq!(callback.run_state(), RunState::Ready);
        assert!(callback
            .invoke(&ArgumentBox::from(Argument::from("b")))
            .is_success());
        assert_eq!(*seen.lock().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_handler_can_block_its_own_callback() {
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        let callback = Arc::new_cyclic(|me: &Weak<Callback>| {
            let me = me.clone();
            let callback = Callback::new("once");
            callback.set_callback(Some(Handler::void(move || {
                *sink.lock().unwrap() += 1;
                if let Some(me) = me.upgrade() {
                    assert_eq!(me.arg_type(), Some(ArgType::Void));
                    me.set_blocked(true);
                }
                Ok(())
            })));
            callback
        });

        assert!(callback.invoke(&ArgumentBox::void()).is_success());
        assert_eq!(callback.run_state(), RunState::Blocked);
        assert_eq!(callback.result_state(), ResultState::Success);

        assert_eq!(callback.invoke(&ArgumentBox::void()), CallOutcome::Skipped);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_argument_coercion() {
        let total = Arc::new(Mutex::new(0i64));
        let sink = total.clone();
        let callback = Callback::new("sum");
        callback.set_callback(Some(Handler::integer(move |n| {
            *sink.lock().unwrap() += n;
            Ok(())
        })));

        assert!(callback.invoke(&ArgumentBox::from(Argument::Int(2))).is_success());
        assert!(callback
            .invoke(&ArgumentBox::from(Argument::from(" 40 ")))
            .is_success());
        assert_eq!(*total.lock().unwrap(), 42);

        match callback.invoke(&ArgumentBox::from(Argument::from("forty"))) {
            CallOutcome::Failed(failure) => assert_eq!(
                failure.kind,
                FailureKind::ArgumentMismatch {
                    expected: ArgType::Integer,
                    found: ArgType::String,
                }
            ),
            other => panic!("unexpected outcome {other:?}"),
        }

        let (seen, handler) = recording();
        let text = Callback::new("text");
        text.set_callback(Some(handler));
        assert!(text.invoke(&ArgumentBox::from(Argument::Int(7))).is_success());
        assert!(text.invoke(&ArgumentBox::void()).is_success());
        assert_eq!(*seen.lock().unwrap(), vec!["7".to_string(), String::new()]);
    }
}
