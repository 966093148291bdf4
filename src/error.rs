//! Error types for the dispatcher and for callback execution.
//!
//! - [`DispatchError`] is returned synchronously by dispatcher operations
//!   (admission, lifecycle, argument access) and by invocation dispatch.
//! - [`CallbackFailure`] describes one callback that failed during a fan-out.
//!   Failures are collected per invocation and never propagated to the
//!   publisher.

use thiserror::Error;

use crate::argument::ArgType;

/// Errors produced by the dispatcher and its components.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No subscription group is registered under the name.
    #[error("no callback registered under `{name}`")]
    UnknownCallback { name: String },

    /// The invocation queue reached its admission threshold.
    #[error("invocation queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// A value of one argument type was stored into or read from a box of another.
    #[error("argument type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ArgType, found: ArgType },

    /// The invocation has no bound group, or the group has no members.
    #[error("invocation is not bound to a valid subscription group")]
    InvalidInvocation,

    /// The invocation was blocked before the worker reached it.
    #[error("invocation was blocked before dispatch")]
    InvocationBlocked,

    /// A panic escaped the fan-out itself, outside any callback body.
    #[error("dispatch panicked: {message}")]
    DispatchPanicked { message: String },

    /// The dispatcher was dropped while the invocation was still queued.
    #[error("invocation discarded before dispatch")]
    Discarded,

    /// `start` was called while a worker is alive.
    #[error("worker is already running")]
    WorkerAlreadyRunning,

    /// `start` was called after `stop` without a `reset`.
    #[error("dispatcher is stopped; call reset before starting a new worker")]
    Stopped,

    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn worker thread: {reason}")]
    WorkerSpawn { reason: String },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::UnknownCallback { .. } => "unknown_callback",
            DispatchError::QueueFull { .. } => "queue_full",
            DispatchError::TypeMismatch { .. } => "type_mismatch",
            DispatchError::InvalidInvocation => "invalid_invocation",
            DispatchError::InvocationBlocked => "invocation_blocked",
            DispatchError::DispatchPanicked { .. } => "dispatch_panicked",
            DispatchError::Discarded => "discarded",
            DispatchError::WorkerAlreadyRunning => "worker_already_running",
            DispatchError::Stopped => "stopped",
            DispatchError::WorkerSpawn { .. } => "worker_spawn",
        }
    }

    /// Whether this is an admission rejection; nothing was queued.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownCallback { .. } | DispatchError::QueueFull { .. }
        )
    }
}

/// Why a single callback failed.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The handler returned an error.
    #[error("returned error: {0}")]
    Returned(String),

    /// The handler panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The argument could not be delivered as the handler's declared type.
    #[error("cannot deliver {found} argument to {expected} handler")]
    ArgumentMismatch { expected: ArgType, found: ArgType },
}

/// One failed callback, as recorded in a fan-out report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("callback `{callback}` {kind}")]
pub struct CallbackFailure {
    /// Name the callback was registered under.
    pub callback: String,
    pub kind: FailureKind,
}

impl CallbackFailure {
    pub fn as_label(&self) -> &'static str {
        match self.kind {
            FailureKind::Returned(_) => "callback_returned_error",
            FailureKind::Panicked(_) => "callback_panicked",
            FailureKind::ArgumentMismatch { .. } => "callback_argument_mismatch",
        }
    }
}
