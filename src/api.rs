//! Simple call-style API over an explicitly passed [`Dispatcher`].
//!
//! These functions mirror the dispatcher methods but collapse their results
//! into `bool`/`i32` and take `async_`/`verbose` flags. There is no global
//! dispatcher; create one at startup and pass it to every call site.
//!
//! ```
//! use event_relay::{api, Dispatcher, Handler};
//!
//! let bus = Dispatcher::default();
//! assert!(api::start(&bus));
//! assert!(api::register(&bus, "email", Handler::string(|_| Ok(())), true, 0));
//! assert_eq!(api::invoke(&bus, "email", "our email to be sent", true, 0), 1);
//! assert_eq!(api::invoke(&bus, "unknown", "", true, 0), 0);
//! assert!(api::stop(&bus));
//! ```

use crate::argument::Argument;
use crate::callback::Handler;
use crate::dispatcher::Dispatcher;

/// Launches the worker. Returns `false` if it could not be started.
pub fn start(dispatcher: &Dispatcher) -> bool {
    match dispatcher.start() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(label = err.as_label(), "start failed: {err}");
            false
        }
    }
}

/// Registers `handler` under `name`.
///
/// `async_` is accepted for call-site compatibility; registration is always
/// immediate. `verbose > 0` logs the call at info level.
pub fn register(
    dispatcher: &Dispatcher,
    name: &str,
    handler: impl Into<Option<Handler>>,
    async_: bool,
    verbose: u8,
) -> bool {
    if verbose > 0 {
        tracing::info!(name, async_, "add");
    }
    dispatcher.register(name, handler).is_registered()
}

/// Queues an invocation of `name`. Returns `1` if admitted, `0` if rejected.
///
/// The callbacks' own results are not reported here; use
/// [`Dispatcher::invoke`] to wait for them.
pub fn invoke(
    dispatcher: &Dispatcher,
    name: &str,
    argument: impl Into<Argument>,
    async_: bool,
    verbose: u8,
) -> i32 {
    let argument = argument.into();
    if verbose > 0 {
        tracing::info!(name, async_, ?argument, "invoke");
    }
    match dispatcher.invoke(name, argument) {
        Ok(_) => 1,
        Err(err) => {
            if verbose > 0 {
                tracing::info!(name, label = err.as_label(), "invoke rejected: {err}");
            }
            0
        }
    }
}

/// Stops and joins the worker.
pub fn stop(dispatcher: &Dispatcher) -> bool {
    dispatcher.stop();
    true
}

/// Resets a stopped dispatcher and launches a fresh worker.
pub fn reset(dispatcher: &Dispatcher) -> bool {
    dispatcher.reset();
    start(dispatcher)
}
