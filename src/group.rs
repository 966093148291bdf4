//! All callbacks registered under one name.
//!
//! A [`SubscriptionGroup`] owns its members in insertion order, which is also
//! the fan-out order. The group carries its own blocked flag, consulted in
//! addition to each member's run state.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::argument::ArgumentBox;
use crate::callback::{CallOutcome, Callback};
use crate::containers::LockedVec;
use crate::error::CallbackFailure;
use crate::state::{AtomicState, ResultState, RunState};

/// How a group treats its remaining members once one of them succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanOutMode {
    /// Every valid, unblocked member runs regardless of the others.
    #[default]
    All,
    /// The first member that succeeds cancels the rest of the fan-out.
    FirstSuccessWins,
}

/// Per-invocation summary of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Members whose handler returned `Ok`.
    pub successes: usize,
    /// Members not run because they, or the whole group, were blocked or invalid.
    pub skipped: usize,
    /// Members not run because an earlier member won under [`FanOutMode::FirstSuccessWins`].
    pub cancelled: usize,
    pub failures: Vec<CallbackFailure>,
}

impl FanOutReport {
    /// Number of members whose handler actually ran.
    pub fn attempted(&self) -> usize {
        self.successes + self.failures.len()
    }
}

pub struct SubscriptionGroup {
    name: String,
    members: LockedVec<Arc<Callback>>,
    run_state: AtomicState<RunState>,
    result_state: AtomicState<ResultState>,
    fan_out: Mutex<FanOutMode>,
}

impl SubscriptionGroup {
    pub fn new(name: impl Into<String>, fan_out: FanOutMode) -> Self {
        Self {
            name: name.into(),
            members: LockedVec::new(),
            run_state: AtomicState::new(RunState::Ready),
            result_state: AtomicState::new(ResultState::Created),
            fan_out: Mutex::new(fan_out),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a member. An empty reference marks the group invalid and is
    /// not stored.
    pub fn add_event(&self, callback: Option<Arc<Callback>>) -> bool {
        match callback {
            Some(callback) => {
                self.members.push(callback);
                true
            }
            None => {
                self.result_state.store(ResultState::Invalid);
                false
            }
        }
    }

    /// A group is valid while it holds at least one member.
    pub fn is_valid(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member at `index`, in insertion order.
    pub fn member(&self, index: usize) -> Option<Arc<Callback>> {
        self.members.get(index)
    }

    /// Blocks (`true`) or readies (`false`) every later fan-out of this group.
    pub fn set_block_state(&self, blocked: bool) {
        let state = if blocked {
            RunState::Blocked
        } else {
            RunState::Ready
        };
        self.run_state.store(state);
    }

    pub fn is_blocked(&self) -> bool {
        self.run_state.load() == RunState::Blocked
    }

    pub fn result_state(&self) -> ResultState {
        self.result_state.load()
    }

    pub fn fan_out(&self) -> FanOutMode {
        *self.fan_out.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_fan_out(&self, mode: FanOutMode) {
        *self.fan_out.lock().unwrap_or_else(|p| p.into_inner()) = mode;
    }

    /// Invokes each member with `argument`, in insertion order.
    ///
    /// Members are read from a snapshot, so callbacks appended while the
    /// fan-out runs take part from the next invocation on.
    pub fn dispatch_all_calls(&self, argument: &ArgumentBox) -> FanOutReport {
        let members = self.members.snapshot();
        let mut report = FanOutReport::default();

        if self.is_blocked() {
            report.skipped = members.len();
            tracing::debug!(group = %self.name, skipped = report.skipped, "group blocked");
            return report;
        }

        let mode = self.fan_out();
        for (index, callback) in members.iter().enumerate() {
            if !callback.is_valid() {
                report.skipped += 1;
                continue;
            }
            match callback.invoke(argument) {
                CallOutcome::Success => {
                    report.successes += 1;
                    if mode == FanOutMode::FirstSuccessWins {
                        report.cancelled = members.len() - index - 1;
                        break;
                    }
                }
                CallOutcome::Skipped => report.skipped += 1,
                CallOutcome::Failed(failure) => report.failures.push(failure),
            }
        }

        tracing::debug!(
            group = %self.name,
            members = members.len(),
            successes = report.successes,
            failures = report.failures.len(),
            "fan-out finished"
        );
        report
    }
}

impl fmt::Debug for SubscriptionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGroup")
            .field("name", &self.name)
            .field("members", &self.members.len())
            .field("blocked", &self.is_blocked())
            .field("fan_out", &self.fan_out())
            .finish()
    }
}
