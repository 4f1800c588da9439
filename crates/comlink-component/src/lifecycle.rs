use std::sync::atomic::{AtomicU8, Ordering};

/// Component lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    New = 0,
    Bootstrapped = 1,
    Initialized = 2,
    Binding = 3,
    Ready = 4,
    Terminating = 5,
    Terminated = 6,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            State::New => "new",
            State::Bootstrapped => "bootstrapped",
            State::Initialized => "initialized",
            State::Binding => "binding",
            State::Ready => "ready",
            State::Terminating => "terminating",
            State::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

impl State {
    fn from_u8(value: u8) -> State {
        match value {
            0 => State::New,
            1 => State::Bootstrapped,
            2 => State::Initialized,
            3 => State::Binding,
            4 => State::Ready,
            5 => State::Terminating,
            _ => State::Terminated,
        }
    }
}

/// Lifecycle trigger.
///
/// Every public operation and inbound delivery maps to `Execute`, the
/// Ready→Ready self-transition, so legality enforcement and normal
/// execution share one dispatch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Bootstrap,
    Initialize,
    Bind,
    BindComplete,
    Execute,
    Terminate,
    TerminateComplete,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Trigger::Bootstrap => "bootstrap",
            Trigger::Initialize => "initialize",
            Trigger::Bind => "bind",
            Trigger::BindComplete => "bind-complete",
            Trigger::Execute => "execute",
            Trigger::Terminate => "terminate",
            Trigger::TerminateComplete => "terminate-complete",
        };
        f.write_str(name)
    }
}

/// A `(state, trigger)` pair outside the transition table. This signals a
/// caller or engine bug, not a recoverable application condition.
#[derive(Debug, Clone, thiserror::Error)]
#[error("trigger {trigger} is illegal in state {state}")]
pub struct LifecycleError {
    pub state: State,
    pub trigger: Trigger,
}

/// The transition table. Every pair not listed here is an error.
pub fn transition(state: State, trigger: Trigger) -> Result<State, LifecycleError> {
    use State::*;
    use Trigger::*;

    let next = match (state, trigger) {
        (New, Bootstrap) => Bootstrapped,
        (Bootstrapped, Initialize) => Initialized,
        (Initialized, Bind) => Binding,
        (Binding, BindComplete) => Ready,
        (Ready, Execute) => Ready,
        (Ready, Terminate) => Terminating,
        // Terminate is idempotent once shutdown has begun.
        (Terminating, Terminate) => Terminating,
        (Terminated, Terminate) => Terminated,
        (Terminating, TerminateComplete) => Terminated,
        (state, trigger) => return Err(LifecycleError { state, trigger }),
    };
    Ok(next)
}

/// Relaxed mirror of the authoritative state owned by the dispatch thread.
/// Public operations read it to fail fast without crossing the queue.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn store(&self, state: State) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [State; 7] = [
        State::New,
        State::Bootstrapped,
        State::Initialized,
        State::Binding,
        State::Ready,
        State::Terminating,
        State::Terminated,
    ];
    const ALL_TRIGGERS: [Trigger; 7] = [
        Trigger::Bootstrap,
        Trigger::Initialize,
        Trigger::Bind,
        Trigger::BindComplete,
        Trigger::Execute,
        Trigger::Terminate,
        Trigger::TerminateComplete,
    ];

    #[test]
    fn happy_path_reaches_terminated() {
        let mut state = State::New;
        for trigger in [
            Trigger::Bootstrap,
            Trigger::Initialize,
            Trigger::Bind,
            Trigger::BindComplete,
            Trigger::Execute,
            Trigger::Execute,
            Trigger::Terminate,
            Trigger::TerminateComplete,
        ] {
            state = transition(state, trigger).unwrap();
        }
        assert_eq!(state, State::Terminated);
    }

    #[test]
    fn execute_is_a_ready_self_loop() {
        assert_eq!(
            transition(State::Ready, Trigger::Execute).unwrap(),
            State::Ready
        );
        for state in ALL_STATES {
            if state != State::Ready {
                assert!(transition(state, Trigger::Execute).is_err(), "{state}");
            }
        }
    }

    #[test]
    fn terminate_is_idempotent_once_started() {
        assert_eq!(
            transition(State::Terminating, Trigger::Terminate).unwrap(),
            State::Terminating
        );
        assert_eq!(
            transition(State::Terminated, Trigger::Terminate).unwrap(),
            State::Terminated
        );
    }

    #[test]
    fn undeclared_pairs_all_error() {
        let declared: &[(State, Trigger)] = &[
            (State::New, Trigger::Bootstrap),
            (State::Bootstrapped, Trigger::Initialize),
            (State::Initialized, Trigger::Bind),
            (State::Binding, Trigger::BindComplete),
            (State::Ready, Trigger::Execute),
            (State::Ready, Trigger::Terminate),
            (State::Terminating, Trigger::Terminate),
            (State::Terminated, Trigger::Terminate),
            (State::Terminating, Trigger::TerminateComplete),
        ];
        for state in ALL_STATES {
            for trigger in ALL_TRIGGERS {
                let expected_ok = declared.contains(&(state, trigger));
                let result = transition(state, trigger);
                assert_eq!(result.is_ok(), expected_ok, "({state}, {trigger})");
            }
        }
    }

    #[test]
    fn state_cell_round_trips() {
        let cell = StateCell::new(State::New);
        assert_eq!(cell.load(), State::New);
        for state in ALL_STATES {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }
}
