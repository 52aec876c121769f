//! The virtual user.
//!
//! A virtual user alternates between performing one shopping action and
//! thinking about the next. [`StateMachine`] holds the transitions free of any
//! IO, [`Shopper`] follows its output against a real or simulated storefront.
//!
//! ## Metrics
//!
//! `actions_performed`: Actions that ran to completion, labelled by `action`
//! `action_failure`: Actions aborted by a failed request, labelled by `action`
//!

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace};

use crate::{
    action::{self, Action, Context},
    clock::Clock,
    runner::Driver,
    target::Transport,
    weighted::Weighted,
};

/// Lower bound of the think-time, in time units, inclusive.
pub const THINK_MIN_UNITS: u64 = 1;
/// Upper bound of the think-time, in time units, exclusive.
pub const THINK_MAX_UNITS: u64 = 10;

/// The state of a virtual user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// About to select an action and run it. Initial state.
    SelectAndRun,
    /// Pausing between actions
    Think,
    /// Stopped by the runner. Terminal.
    Stopped,
}

/// Operations the state machine can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Select one action and run it to completion
    RunAction,
    /// Pause for a think-time
    Pause,
    /// Do nothing further
    Exit,
}

/// Events that can drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The action ran to completion
    ActionCompleted,
    /// The action was aborted by a failed request
    ActionFailed,
    /// The think-time elapsed
    PauseElapsed,
    /// The runner is stopping this user
    Stop,
}

/// Errors produced by [`StateMachine`] and [`Shopper`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transition is not valid
    #[error("Invalid transition from {from:?} via {via:?}")]
    InvalidTransition {
        /// State at the time of the event
        from: State,
        /// The rejected event
        via: Event,
    },
    /// The action failed; the user paused regardless.
    #[error("Action {action} failed: {source}")]
    Action {
        /// Name of the failed action
        action: &'static str,
        /// Underlying failure
        #[source]
        source: action::Error,
    },
}

/// State machine for a virtual user
///
/// The goal of this component is to contain the logic for state transitions
/// _without_ IO encumbrance, neither timing information nor requests. That is
/// left to [`Shopper`], which follows the output of `next` without
/// consideration.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine in [`State::SelectAndRun`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::SelectAndRun,
        }
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Process an event and return the next operation
    ///
    /// State transitions:
    /// ```text
    /// Format: CurrentState --[Event]--> NextState (Operation)
    ///
    /// SelectAndRun --[ActionCompleted]--> Think (Pause)
    /// SelectAndRun --[ActionFailed]--> Think (Pause)
    ///
    /// Think --[PauseElapsed]--> SelectAndRun (RunAction)
    ///
    /// SelectAndRun --[Stop]--> Stopped (Exit)
    /// Think --[Stop]--> Stopped (Exit)
    /// ```
    ///
    /// # Errors
    ///
    /// Function will error with `InvalidTransition` if the `event` is not valid
    /// for the present state.
    pub fn next(&mut self, event: Event) -> Result<Operation, Error> {
        let (next_state, operation) = match (self.state, event) {
            (State::SelectAndRun, Event::ActionCompleted | Event::ActionFailed) => {
                (State::Think, Operation::Pause)
            }
            (State::Think, Event::PauseElapsed) => (State::SelectAndRun, Operation::RunAction),
            (State::SelectAndRun | State::Think, Event::Stop) => (State::Stopped, Operation::Exit),
            _ => {
                return Err(Error::InvalidTransition {
                    from: self.state,
                    via: event,
                });
            }
        };

        self.state = next_state;
        Ok(operation)
    }
}

/// Draw a think-time uniformly from `[THINK_MIN_UNITS, THINK_MAX_UNITS)` time
/// units.
pub fn think_time<R>(rng: &mut R, unit: Duration) -> Duration
where
    R: Rng + ?Sized,
{
    // Drawn in whole nanoseconds so the upper bound stays exclusive.
    let unit_nanos = u64::try_from(unit.as_nanos()).unwrap_or(u64::MAX / THINK_MAX_UNITS);
    if unit_nanos == 0 {
        return Duration::ZERO;
    }
    let low = unit_nanos.saturating_mul(THINK_MIN_UNITS);
    let high = unit_nanos.saturating_mul(THINK_MAX_UNITS);
    Duration::from_nanos(rng.random_range(low..high))
}

/// The random number generator owned by user `user`. With a `seed` every
/// user gets a distinct, reproducible stream, otherwise the stream is drawn
/// from the thread-local generator.
#[must_use]
pub fn user_rng(seed: Option<u64>, user: u32) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(user))),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// A virtual user browsing and buying from the storefront.
#[derive(Debug)]
pub struct Shopper<T, C> {
    id: u32,
    machine: StateMachine,
    catalog: Arc<Weighted<Action>>,
    target: T,
    clock: C,
    time_unit: Duration,
    rng: StdRng,
}

impl<T, C> Shopper<T, C>
where
    T: Transport,
    C: Clock,
{
    /// Create a new [`Shopper`]. `rng` is owned by this user alone.
    pub fn new(
        id: u32,
        catalog: Arc<Weighted<Action>>,
        target: T,
        clock: C,
        time_unit: Duration,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            machine: StateMachine::new(),
            catalog,
            target,
            clock,
            time_unit,
            rng,
        }
    }

    /// The present state of this user.
    #[must_use]
    pub fn state(&self) -> State {
        self.machine.state()
    }

    async fn run_action(&mut self) -> Result<Event, Error> {
        let action = *self.catalog.sample(&mut self.rng);
        trace!(user = self.id, action = action.name(), "running action");
        let labels = vec![("action".to_string(), action.name().to_string())];

        let ctx = Context {
            target: &self.target,
            clock: &self.clock,
            time_unit: self.time_unit,
        };
        match ctx.perform(action, &mut self.rng).await {
            Ok(()) => {
                counter!("actions_performed", &labels).increment(1);
                Ok(Event::ActionCompleted)
            }
            Err(source) => {
                counter!("action_failure", &labels).increment(1);
                Err(Error::Action {
                    action: action.name(),
                    source,
                })
            }
        }
    }
}

#[async_trait]
impl<T, C> Driver for Shopper<T, C>
where
    T: Transport,
    C: Clock,
{
    type Error = Error;

    async fn start(&mut self) -> Result<(), Error> {
        debug!(user = self.id, "shopper starting");
        Ok(())
    }

    /// Select and run one action, then think. A failed action is still
    /// followed by the think-time; its error is returned after the pause.
    async fn run_iteration(&mut self) -> Result<(), Error> {
        let mut operation = match self.machine.state() {
            State::SelectAndRun => Operation::RunAction,
            State::Think => Operation::Pause,
            State::Stopped => Operation::Exit,
        };
        let mut outcome = Ok(());

        loop {
            match operation {
                Operation::RunAction => {
                    let event = match self.run_action().await {
                        Ok(event) => event,
                        Err(err) => {
                            outcome = Err(err);
                            Event::ActionFailed
                        }
                    };
                    operation = self.machine.next(event)?;
                }
                Operation::Pause => {
                    let pause = think_time(&mut self.rng, self.time_unit);
                    self.clock.sleep(pause).await;
                    self.machine.next(Event::PauseElapsed)?;
                    break;
                }
                Operation::Exit => break,
            }
        }

        outcome
    }

    async fn stop(&mut self) {
        if self.machine.next(Event::Stop).is_err() {
            debug!(user = self.id, "shopper already stopped");
        }
        debug!(user = self.id, "shopper stopped");
    }
}
