// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run Lifecycle State Machine
//!
//! # States
//!
//! - Idle: constructed, nothing attempted
//! - Running: provider calls in progress
//! - Succeeded: every targeted node (or the single provider call) succeeded
//! - PartiallyFailed: at least one node failed or was skipped
//! - Failed: the operation could not be carried out at all
//!
//! # Inputs
//!
//! - Start: Idle → Running
//! - Succeed / PartiallyFail / Fail: Running → terminal
//!
//! Terminal states accept no input.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// State of one lifecycle invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

/// Input driving a [`RunState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunInput {
    Start,
    Succeed,
    PartiallyFail,
    Fail,
}

impl RunState {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::PartiallyFailed => "partially-failed",
            Self::Failed => "failed",
        }
    }

    /// Whether this is the only outcome that counts as success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for RunInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self {
            Self::Start => RunState::Running,
            Self::Succeed => RunState::Succeeded,
            Self::PartiallyFail => RunState::PartiallyFailed,
            Self::Fail => RunState::Failed,
        };
        write!(f, "{}", target)
    }
}

impl StateMachine for RunState {
    type Input = RunInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use RunInput::*;
        use RunState::*;

        match (self, input) {
            (Idle, Start) => Ok((Running, ())),
            (Running, Succeed) => Ok((Succeeded, ())),
            (Running, PartiallyFail) => Ok((PartiallyFailed, ())),
            (Running, Fail) => Ok((Failed, ())),
            (from, to) => Err(TransitionError::invalid(from, to)),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::PartiallyFailed | RunState::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RunInput::Succeed, RunState::Succeeded)]
    #[test_case(RunInput::PartiallyFail, RunState::PartiallyFailed)]
    #[test_case(RunInput::Fail, RunState::Failed)]
    fn test_running_concludes(input: RunInput, expected: RunState) {
        let (state, _) = RunState::Running.transition(&input).unwrap();
        assert_eq!(state, expected);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_cannot_conclude_before_start() {
        assert_eq!(
            RunState::Idle.transition(&RunInput::Succeed),
            Err(TransitionError::InvalidTransition {
                from: "idle".to_string(),
                to: "succeeded".to_string(),
            })
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [RunState::Succeeded, RunState::PartiallyFailed, RunState::Failed] {
            for input in [RunInput::Start, RunInput::Succeed, RunInput::Fail] {
                assert!(!state.can_transition(&input));
            }
        }
    }
}
