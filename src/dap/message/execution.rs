use super::{optional_int, HandleResult, ValidationError};
use crate::dap::state::SessionState;
use crate::engine::SimulationState;
use log::debug;
use serde_json::{json, Value};

/// Requests that move the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum Execution {
    Next,
    StepIn,
    StepOut,
    Continue,
    StepBack,
    ReverseContinue,
    Pause,
    RestartFrame,
}

impl Execution {
    pub fn from_command(command: &str) -> Option<Self> {
        command.parse().ok()
    }

    /// Only the shape of `threadId`/`frameId` is checked, there is a single thread.
    pub fn parse(self, args: &Value) -> Result<Self, ValidationError> {
        optional_int(args, "threadId")?;
        if self == Execution::RestartFrame {
            optional_int(args, "frameId")?;
        }
        Ok(self)
    }

    /// Whether the client expects a `stopped` event describing where execution ended.
    pub fn reports_stop(&self) -> bool {
        *self != Execution::Pause
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        let engine = state.engine.as_mut();
        debug!(target: "dap", "{self} at instruction {}", engine.get_current_instruction());
        let body = match self {
            Execution::Next => engine.step_over_forward().map(|_| None),
            Execution::StepIn => engine.step_forward().map(|_| None),
            Execution::StepOut => engine.step_out_forward().map(|_| None),
            Execution::Continue => engine
                .run_simulation()
                .map(|_| Some(json!({ "allThreadsContinued": true }))),
            Execution::StepBack => engine.step_over_backward().map(|_| None),
            Execution::ReverseContinue => engine.run_simulation_backward().map(|_| None),
            Execution::Pause => engine.pause_simulation().map(|_| None),
            Execution::RestartFrame => restart_frame(engine).map(|_| None),
        }?;
        state.sync_phase();
        Ok(body)
    }
}

fn restart_frame(engine: &mut dyn SimulationState) -> crate::engine::Result<()> {
    if engine.get_stack_depth()? <= 1 {
        return engine.reset_simulation();
    }
    engine.step_out_backward()?;
    engine.step_forward()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dap::message::Command;
    use crate::dap::state::Phase;
    use crate::engine::mock::MockState;

    #[test]
    fn test_from_command() {
        assert_eq!(Execution::from_command("stepIn"), Some(Execution::StepIn));
        assert_eq!(
            Execution::from_command("reverseContinue"),
            Some(Execution::ReverseContinue)
        );
        assert_eq!(Execution::from_command("StepIn"), None);
        assert_eq!(Execution::from_command("evaluate"), None);
    }

    #[test]
    fn test_engine_calls() {
        struct TestCase {
            command: &'static str,
            call: &'static str,
            body: Option<Value>,
        }

        let cases = [
            TestCase {
                command: "next",
                call: "step_over_forward",
                body: None,
            },
            TestCase {
                command: "stepIn",
                call: "step_forward",
                body: None,
            },
            TestCase {
                command: "stepOut",
                call: "step_out_forward",
                body: None,
            },
            TestCase {
                command: "continue",
                call: "run_simulation",
                body: Some(json!({"allThreadsContinued": true})),
            },
            TestCase {
                command: "stepBack",
                call: "step_over_backward",
                body: None,
            },
            TestCase {
                command: "reverseContinue",
                call: "run_simulation_backward",
                body: None,
            },
            TestCase {
                command: "pause",
                call: "pause_simulation",
                body: None,
            },
            TestCase {
                command: "restartFrame",
                call: "reset_simulation",
                body: None,
            },
        ];

        for tc in cases {
            let mock = MockState::with_instructions(vec![(0, 9)]);
            let calls = mock.calls.clone();
            let mut state = SessionState::new(Box::new(mock));
            state.phase = Phase::Running;

            let command = Command::parse(tc.command, &json!({"threadId": 1}))
                .unwrap()
                .unwrap();
            assert_eq!(command.handle(&mut state).unwrap(), tc.body, "{}", tc.command);
            assert_eq!(*calls.borrow(), vec![tc.call], "{}", tc.command);
        }
    }

    #[test]
    fn test_phase_after_step() {
        let mut mock = MockState::with_instructions(vec![(0, 9), (11, 20)]);
        mock.assertion_failed = true;
        let mut state = SessionState::new(Box::new(mock));

        let err = Command::Execute(Execution::Next)
            .handle(&mut state)
            .unwrap_err();
        assert_eq!(err.to_string(), "No program has been launched.");

        state.phase = Phase::Launched;
        Command::Execute(Execution::Next).handle(&mut state).unwrap();
        assert_eq!(state.phase, Phase::StoppedOnException);
    }
}
