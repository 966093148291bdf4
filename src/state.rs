//! Run and result state machines shared by callbacks, groups, invocations
//! and the dispatcher.
//!
//! States are stored as `u8` inside an [`AtomicState`] so they can be read
//! from any thread without taking the lock that guards the owning object.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// Execution state of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    /// Dispatcher only: the worker stops draining until resumed.
    Interrupt = 1,
    /// Dispatcher only: the worker exits.
    Stopped = 2,
    /// Sticky; short-circuits execution until explicitly cleared.
    Blocked = 3,
    NotRunning = 4,
    Ready = 5,
    Waiting = 6,
}

/// Outcome state of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultState {
    Created = 0,
    /// Sticky; the object must never be considered valid again.
    Invalid = 1,
    Failed = 2,
    Success = 3,
}

/// Conversion between a state enum and its atomic representation.
pub(crate) trait StateRepr: Copy {
    fn to_raw(self) -> u8;
    fn from_raw(raw: u8) -> Self;
}

impl StateRepr for RunState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => RunState::Running,
            1 => RunState::Interrupt,
            2 => RunState::Stopped,
            3 => RunState::Blocked,
            4 => RunState::NotRunning,
            5 => RunState::Ready,
            _ => RunState::Waiting,
        }
    }
}

impl StateRepr for ResultState {
    fn to_raw(self) -> u8 {
        self as u8
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ResultState::Created,
            1 => ResultState::Invalid,
            2 => ResultState::Failed,
            _ => ResultState::Success,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Running => "running",
            RunState::Interrupt => "interrupt",
            RunState::Stopped => "stopped",
            RunState::Blocked => "blocked",
            RunState::NotRunning => "not_running",
            RunState::Ready => "ready",
            RunState::Waiting => "waiting",
        };
        f.write_str(label)
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResultState::Created => "created",
            ResultState::Invalid => "invalid",
            ResultState::Failed => "failed",
            ResultState::Success => "success",
        };
        f.write_str(label)
    }
}

/// A lock-free cell holding one state value.
pub(crate) struct AtomicState<S> {
    raw: AtomicU8,
    _state: PhantomData<S>,
}

impl<S: StateRepr> AtomicState<S> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.to_raw()),
            _state: PhantomData,
        }
    }

    pub(crate) fn load(&self) -> S {
        S::from_raw(self.raw.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: S) {
        self.raw.store(state.to_raw(), Ordering::Release);
    }

    /// Moves `from` to `to`. Leaves the cell untouched and returns `false` if
    /// it no longer holds `from`.
    pub(crate) fn transition(&self, from: S, to: S) -> bool {
        self.raw
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<S: StateRepr + fmt::Debug> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState").field(&self.load()).finish()
    }
}
