use super::{optional_bool, HandleResult, ValidationError};
use crate::dap::position::IndexConvention;
use crate::dap::protocol::Capabilities;
use crate::dap::state::{Phase, SessionState};
use log::{debug, info};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeArgs {
    pub convention: IndexConvention,
}

impl InitializeArgs {
    pub fn parse(args: &Value) -> Result<Self, ValidationError> {
        Ok(Self {
            convention: IndexConvention {
                lines_start_at_one: optional_bool(args, "linesStartAtOne")?.unwrap_or(true),
                columns_start_at_one: optional_bool(args, "columnsStartAtOne")?.unwrap_or(true),
            },
        })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        state.convention = self.convention;
        debug!(target: "dap", "client convention: {:?}", self.convention);
        let caps = serde_json::to_value(Capabilities::default())
            .map_err(|e| ValidationError::new(e.to_string()))?;
        Ok(Some(caps))
    }
}

pub fn terminate(state: &mut SessionState) -> HandleResult {
    if state.source.is_some() {
        if let Err(e) = state.engine.reset_simulation() {
            debug!(target: "dap", "reset on terminate: {e}");
        }
    }
    state.set_phase(Phase::Terminated);
    info!(target: "dap", "debug session terminated");
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dap::message::Command;
    use crate::engine::mock::MockState;
    use serde_json::json;

    #[test]
    fn test_initialize() {
        let mut state = SessionState::new(Box::new(MockState::default()));
        let command = Command::parse(
            "initialize",
            &json!({"clientID": "vscode", "linesStartAtOne": false}),
        )
        .unwrap()
        .unwrap();

        let body = command.handle(&mut state).unwrap().unwrap();
        assert_eq!(body["supportsRestartRequest"], true);
        assert!(!state.convention.lines_start_at_one);
        assert!(state.convention.columns_start_at_one);
        assert_eq!(state.phase, Phase::Uninitialized);
    }

    #[test]
    fn test_terminate() {
        let mock = MockState::default();
        let calls = mock.calls.clone();
        let mut state = SessionState::new(Box::new(mock));
        Command::Terminate.handle(&mut state).unwrap();
        assert_eq!(state.phase, Phase::Terminated);
        assert!(calls.borrow().is_empty());

        let err = Command::Scopes.handle(&mut state).unwrap_err();
        assert_eq!(err.to_string(), "The debug session has terminated.");
    }
}
