use std::fmt;

use crate::dispatcher::RegisterStatus;

/// Events emitted by the dispatcher during operations.
///
/// These events are passed to the tracing callback set via
/// [`Dispatcher::set_trace_callback`](crate::Dispatcher::set_trace_callback).
/// The `Clone` derive allows callbacks to store or forward events if needed.
///
/// # Examples
///
/// ```rust
/// use event_relay::DispatchEvent;
///
/// let event = DispatchEvent::Invoke { name: "email".into(), admitted: true };
/// assert_eq!(event.to_string(), "invoke { name: email, admitted: true }");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A callback was registered under a name.
    Register {
        name: String,
        status: RegisterStatus,
    },

    /// A publisher asked for a name to be invoked.
    Invoke {
        name: String,
        /// Whether the invocation was queued.
        admitted: bool,
    },

    /// The worker finished one invocation.
    Dispatch {
        name: String,
        /// Successful callbacks, or `None` if the invocation was invalid or blocked.
        successes: Option<usize>,
    },

    /// A group was blocked or unblocked.
    Block { name: String, blocked: bool },

    /// A worker thread was launched.
    Start {},

    /// The dispatcher was stopped.
    Stop {},

    /// The dispatcher was reset to running.
    Reset {},
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEvent::Register { name, status } => {
                write!(f, "register {{ name: {name}, status: {status} }}")
            }
            DispatchEvent::Invoke { name, admitted } => {
                write!(f, "invoke {{ name: {name}, admitted: {admitted} }}")
            }
            DispatchEvent::Dispatch { name, successes } => match successes {
                Some(n) => write!(f, "dispatch {{ name: {name}, successes: {n} }}"),
                None => write!(f, "dispatch {{ name: {name}, successes: none }}"),
            },
            DispatchEvent::Block { name, blocked } => {
                write!(f, "block {{ name: {name}, blocked: {blocked} }}")
            }
            DispatchEvent::Start {} => write!(f, "Starting the worker"),
            DispatchEvent::Stop {} => write!(f, "Stopping the dispatcher"),
            DispatchEvent::Reset {} => write!(f, "Resetting the dispatcher"),
        }
    }
}

/// Type alias for the user-supplied tracing callback.
///
/// The callback receives a reference to a `DispatchEvent` every time the
/// dispatcher is interacted with. It must be thread-safe because the worker
/// emits events too.
pub type TraceCallback = dyn Fn(&DispatchEvent) + Send + Sync + 'static;
