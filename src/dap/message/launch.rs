use super::{optional_bool, optional_str, HandleResult, ValidationError};
use crate::dap::protocol::SourceDescriptor;
use crate::dap::state::{Phase, SessionState};
use crate::engine::Error;
use log::{info, warn};
use serde_json::Value;
use std::path::PathBuf;

/// Arguments of `launch` and `restart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    /// `None` only for `restart`, which then reuses the current program.
    pub program: Option<PathBuf>,
    pub stop_on_entry: bool,
    pub no_debug: bool,
}

impl LaunchArgs {
    pub fn parse(args: &Value) -> Result<Self, ValidationError> {
        let program = optional_str(args, "program")?
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ValidationError::new("The 'program' field is required."))?;
        Self::parse_with(args, Some(program))
    }

    /// `restart` carries the launch configuration under `arguments`; a missing
    /// program means "the same one again".
    pub fn parse_restart(args: &Value) -> Result<Self, ValidationError> {
        let config = match args.get("arguments") {
            Some(inner @ Value::Object(_)) => inner,
            _ => args,
        };
        let program = optional_str(config, "program")?.filter(|p| !p.trim().is_empty());
        Self::parse_with(config, program)
    }

    fn parse_with(args: &Value, program: Option<&str>) -> Result<Self, ValidationError> {
        let program = program.map(PathBuf::from);
        if let Some(path) = &program {
            if !path.exists() {
                return Err(ValidationError::new(format!(
                    "The file '{}' does not exist.",
                    path.display()
                )));
            }
        }
        Ok(Self {
            program,
            stop_on_entry: optional_bool(args, "stopOnEntry")?.unwrap_or(false),
            no_debug: optional_bool(args, "noDebug")?.unwrap_or(false),
        })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        let path = match (&self.program, &state.source) {
            (Some(path), _) => path.clone(),
            (None, Some(source)) => PathBuf::from(&source.path),
            (None, None) => return Err(ValidationError::new("No program has been launched.")),
        };

        let bytes = std::fs::read(&path).map_err(|e| {
            ValidationError::new(format!("Failed to read '{}': {e}", path.display()))
        })?;
        let code = match String::from_utf8(bytes) {
            Ok(code) => code,
            Err(e) => {
                warn!(target: "dap", "{} is not valid UTF-8, invalid sequences replaced", path.display());
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        state.source = Some(SourceDescriptor {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_string_lossy().into_owned(),
        });
        state.source_code = code;
        state.pending_highlights.clear();
        state.set_phase(Phase::Launched);
        info!(target: "dap", "launching {}", path.display());

        match state.engine.load_code(&state.source_code) {
            Ok(()) => {
                if self.no_debug {
                    state.engine.clear_breakpoints()?;
                }
                if !self.stop_on_entry {
                    state.engine.run_simulation()?;
                    state.sync_phase();
                }
            }
            Err(Error::Parsing(e)) => {
                warn!(target: "dap", "failed to parse {}: {e}", path.display());
                state.queue_parse_error(&e);
                if let Err(e) = state.engine.reset_simulation() {
                    warn!(target: "dap", "reset after parse failure: {e}");
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dap::diagnostics::HighlightReason;
    use crate::dap::message::Command;
    use crate::engine::mock::MockState;
    use crate::engine::ParsingError;
    use serde_json::json;

    fn program_file(code: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("qdap-{}.qasm", uuid::Uuid::new_v4()));
        std::fs::write(&path, code).unwrap();
        path
    }

    #[test]
    fn test_launch_validation() {
        struct TestCase {
            arguments: Value,
            error: String,
        }

        let cases = [
            TestCase {
                arguments: json!({}),
                error: "The 'program' field is required.".to_string(),
            },
            TestCase {
                arguments: json!({"program": "  "}),
                error: "The 'program' field is required.".to_string(),
            },
            TestCase {
                arguments: json!({"program": "/definitely/missing.qasm"}),
                error: "The file '/definitely/missing.qasm' does not exist.".to_string(),
            },
            TestCase {
                arguments: json!({"program": 7}),
                error: "The 'program' argument must be a string.".to_string(),
            },
        ];

        for tc in cases {
            let err = Command::parse("launch", &tc.arguments)
                .unwrap()
                .unwrap_err();
            assert_eq!(err.to_string(), tc.error);
        }
    }

    #[test]
    fn test_launch_runs_program() {
        let path = program_file("qreg q[1];\nh q[0];\n");
        let mock = MockState::with_instructions(vec![(0, 9), (11, 17)]);
        let calls = mock.calls.clone();
        let mut state = SessionState::new(Box::new(mock));

        let command = Command::parse("launch", &json!({"program": path.to_str().unwrap()}))
            .unwrap()
            .unwrap();
        assert_eq!(command.handle(&mut state).unwrap(), None);

        assert_eq!(*calls.borrow(), vec!["load_code", "run_simulation"]);
        let source = state.source.clone().unwrap();
        assert_eq!(source.path, path.to_str().unwrap());
        assert!(source.name.starts_with("qdap-"));
        assert_eq!(state.source_code, "qreg q[1];\nh q[0];\n");
        assert_eq!(state.phase, Phase::Running);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_launch_stop_on_entry_no_debug() {
        let path = program_file("qreg q[1];");
        let mock = MockState::with_instructions(vec![(0, 9)]);
        let calls = mock.calls.clone();
        let mut state = SessionState::new(Box::new(mock));

        let command = Command::parse(
            "launch",
            &json!({"program": path.to_str().unwrap(), "stopOnEntry": true, "noDebug": true}),
        )
        .unwrap()
        .unwrap();
        command.handle(&mut state).unwrap();

        assert_eq!(*calls.borrow(), vec!["load_code", "clear_breakpoints"]);
        assert_eq!(state.phase, Phase::Launched);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_launch_parse_error() {
        let path = program_file("qreg q[1];\nfoo q[0];\n");
        let mut mock = MockState::default();
        mock.load_error = Some(ParsingError::at(2, 1, "unknown gate 'foo'"));
        let calls = mock.calls.clone();
        let mut state = SessionState::new(Box::new(mock));

        let command = Command::parse("launch", &json!({"program": path.to_str().unwrap()}))
            .unwrap()
            .unwrap();
        assert!(command.handle(&mut state).is_ok());

        assert_eq!(*calls.borrow(), vec!["load_code", "reset_simulation"]);
        assert_eq!(state.pending_highlights.len(), 1);
        let entry = &state.pending_highlights[0];
        assert_eq!(entry.reason, HighlightReason::ParseError);
        assert_eq!(entry.range.start.line, 2);
        assert_eq!(entry.code, "foo q[0];");
        assert_eq!(entry.message, "unknown gate 'foo'");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_restart_reuses_program() {
        let path = program_file("qreg q[1];");
        let mock = MockState::with_instructions(vec![(0, 9)]);
        let calls = mock.calls.clone();
        let mut state = SessionState::new(Box::new(mock));

        let restart = Command::parse("restart", &json!({"arguments": {"stopOnEntry": true}}))
            .unwrap()
            .unwrap();
        let err = restart.handle(&mut state).unwrap_err();
        assert_eq!(err.to_string(), "No program has been launched.");

        Command::parse("launch", &json!({"program": path.to_str().unwrap()}))
            .unwrap()
            .unwrap()
            .handle(&mut state)
            .unwrap();
        restart.handle(&mut state).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec!["load_code", "run_simulation", "load_code"]
        );
        assert_eq!(state.source.clone().unwrap().path, path.to_str().unwrap());
        std::fs::remove_file(path).unwrap();
    }
}
