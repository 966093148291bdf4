//! # Event Relay
//!
//! An in-process event dispatcher: callers register named callbacks, other
//! callers invoke them by name with one argument, and neither side knows
//! about the other.
//!
//! Invocations are queued and run by a single background worker, so callback
//! bodies never run concurrently with each other. The queue has an admission
//! threshold: when it is full, `invoke` is rejected instead of blocking.
//!
//! ## Quick Start
//!
//! ```rust
//! use event_relay::{Dispatcher, Handler};
//!
//! let dispatcher = Dispatcher::default();
//! dispatcher.register("email", Handler::string(|body| {
//!     println!("sending {body}");
//!     Ok(())
//! }));
//!
//! dispatcher.start().unwrap();
//! let handle = dispatcher.invoke("email", "our email to be sent").unwrap();
//! let report = handle.wait().unwrap();
//! assert_eq!(report.successes, 1);
//! dispatcher.stop();
//! ```
//!
//! ## Features
//!
//! - **Fan-out**: every callback under a name runs, in registration order
//!   ([`FanOutMode::All`]), or the first success cancels the rest
//!   ([`FanOutMode::FirstSuccessWins`])
//! - **Blocking**: whole groups via [`Dispatcher::block_event`], single
//!   invocations via [`Invocation::set_block_state`]
//! - **Typed arguments**: [`Argument`] carries nothing, a string or an integer
//! - **Per-invocation results**: callback errors and panics are captured into
//!   the [`FanOutReport`] of the invocation that caused them
//! - **Tracing support**: `tracing` events plus an optional
//!   [`DispatchEvent`] callback
//!
//! ## Main Types
//!
//! - [`Dispatcher`] - registry, queue and worker
//! - [`Handler`] - a subscriber function
//! - [`InvocationHandle`] - wait for the outcome of one `invoke`
//! - [`api`] - `bool`/`i32` call-style wrappers

pub mod api;
mod argument;
mod callback;
mod config;
mod containers;
mod dispatcher;
mod error;
mod event;
mod group;
mod invocation;
mod state;

pub use argument::{ArgType, Argument, ArgumentBox};
pub use callback::{CallOutcome, Callback, Handler};
pub use config::DispatcherConfig;
pub use containers::{LockedMap, LockedQueue, LockedVec};
pub use dispatcher::{Dispatcher, RegisterStatus};
pub use error::{CallbackFailure, DispatchError, FailureKind};
pub use event::{DispatchEvent, TraceCallback};
pub use group::{FanOutMode, FanOutReport, SubscriptionGroup};
pub use invocation::{Invocation, InvocationHandle, InvocationOutcome};
pub use state::{ResultState, RunState};
