// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic state machine types used to model lifecycles. Transitions are
//! deterministic functions with no side effects; the orchestrator performs
//! the side effects and feeds their results back as inputs.
//!
//! # Mealy Machine
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Machines in this crate
//!
//! - [`RunState`] - one lifecycle invocation: `Idle → Running → terminal`
//! - [`NodeStatus`] - one node within a run: written once from `Pending`
//!
//! # Example
//!
//! ```rust
//! use cim_cluster::state_machine::{RunInput, RunState, StateMachine};
//!
//! let (running, _) = RunState::Idle.transition(&RunInput::Start).unwrap();
//! let (done, _) = running.transition(&RunInput::Succeed).unwrap();
//! assert_eq!(done, RunState::Succeeded);
//! assert!(done.transition(&RunInput::Start).is_err());
//! ```

pub mod node_lifecycle;
pub mod run_lifecycle;

pub use node_lifecycle::{NodeInput, NodeStatus, SkipReason};
pub use run_lifecycle::{RunInput, RunState};

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The machine addressed by the input does not exist
    #[error("No state machine for '{0}'")]
    UnknownSubject(String),
}

impl TransitionError {
    /// Build an invalid-transition error from displayable endpoints
    pub fn invalid(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        TransitionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Trait for finite state machines
///
/// Implement this trait to define a state machine with typed states,
/// inputs, and outputs.
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    ///
    /// # Returns
    /// - Ok((new_state, output)) if transition is valid
    /// - Err(TransitionError) if transition is invalid
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Whether no input leads anywhere from this state
    fn is_terminal(&self) -> bool;
}

/// Transition metadata
///
/// Records information about a state transition for auditing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Transition<S, I> {
    /// State before transition
    pub from: S,

    /// State after transition
    pub to: S,

    /// Input that triggered transition
    pub input: I,

    /// Timestamp of transition
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<S, I> Transition<S, I> {
    /// Create a new transition record
    pub fn new(from: S, to: S, input: I, timestamp: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
        }
    }
}

/// State machine with history
///
/// Wraps a state machine and tracks transition history.
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    /// Current state
    pub current: FSM,

    /// Transition history
    pub history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    /// Create a new state machine with history tracking
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition with history recording
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> TransitionResult<FSM::Output> {
        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;

        self.history
            .push(Transition::new(from, to.clone(), input, timestamp));

        self.current = to;
        Ok(output)
    }

    /// Get transition history
    pub fn get_history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    /// Get current state
    pub fn current_state(&self) -> &FSM {
        &self.current
    }
}
