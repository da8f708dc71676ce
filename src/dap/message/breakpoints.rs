use super::{optional_index, optional_str, HandleResult, ValidationError};
use crate::dap::state::SessionState;
use log::{debug, warn};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceBreakpoint {
    pub line: usize,
    pub column: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBreakpointsArgs {
    pub path: Option<String>,
    pub breakpoints: Vec<SourceBreakpoint>,
}

impl SetBreakpointsArgs {
    pub fn parse(args: &Value) -> Result<Self, ValidationError> {
        let path = match args.get("source") {
            Some(source) => optional_str(source, "path")?.map(str::to_string),
            None => None,
        };

        let breakpoints = match args.get("breakpoints") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| -> Result<SourceBreakpoint, ValidationError> {
                    let line = optional_index(item, "line")?.ok_or_else(|| {
                        ValidationError::new("Every breakpoint requires a 'line'.")
                    })?;
                    Ok(SourceBreakpoint {
                        line,
                        column: optional_index(item, "column")?,
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ValidationError::new(
                    "The 'breakpoints' argument must be an array.",
                ))
            }
        };

        Ok(Self { path, breakpoints })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        if let (Some(requested), Some(current)) = (&self.path, &state.source) {
            if *requested != current.path {
                warn!(target: "dap", "breakpoints for {requested} applied to {}", current.path);
            }
        }

        state.engine.clear_breakpoints()?;
        let first_column = usize::from(state.convention.columns_start_at_one);

        let mut result = Vec::with_capacity(self.breakpoints.len());
        for bp in &self.breakpoints {
            let offset = state
                .mapper()
                .to_offset(bp.line, bp.column.unwrap_or(first_column));
            match state.engine.set_breakpoint(offset) {
                Ok(instruction) => {
                    let (line, column) = state.instruction_location(instruction)?;
                    debug!(target: "dap", "breakpoint at line {} bound to instruction {instruction}", bp.line);
                    result.push(json!({
                        "verified": true,
                        "line": line,
                        "column": column,
                        "source": state.source_descriptor(),
                    }));
                }
                Err(e) => result.push(json!({
                    "verified": false,
                    "line": bp.line,
                    "message": e.to_string(),
                })),
            }
        }

        Ok(Some(json!({ "breakpoints": result })))
    }
}

pub fn parse_exception_filters(args: &Value) -> Result<Vec<String>, ValidationError> {
    match args.get("filters") {
        None | Some(Value::Null) => Ok(vec![]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ValidationError::new("Exception filters must be strings.")
                })
            })
            .collect(),
        Some(_) => Err(ValidationError::new(
            "The 'filters' argument must be an array.",
        )),
    }
}

pub fn set_exception_filters(state: &mut SessionState, filters: &[String]) -> HandleResult {
    state.exception_filters = filters.to_vec();
    let breakpoints: Vec<Value> = filters.iter().map(|_| json!({"verified": true})).collect();
    Ok(Some(json!({ "breakpoints": breakpoints })))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dap::message::Command;
    use crate::dap::state::Phase;
    use crate::engine::mock::MockState;

    fn launched(mock: MockState, code: &str) -> SessionState {
        let mut state = SessionState::new(Box::new(mock));
        state.source_code = code.to_string();
        state.phase = Phase::Launched;
        state
    }

    #[test]
    fn test_set_breakpoints() {
        let code = "qreg q[2];\nh q[0];\ncx q[0], q[1];";
        let mock = MockState::with_instructions(vec![(0, 9), (11, 17), (19, 32)]);
        let calls = mock.calls.clone();
        let mut state = launched(mock, code);

        let command = Command::parse(
            "setBreakpoints",
            &json!({"source": {"path": "/tmp/a.qasm"}, "breakpoints": [{"line": 2}, {"line": 3, "column": 4}, {"line": 9}]}),
        )
        .unwrap()
        .unwrap();
        let body = command.handle(&mut state).unwrap().unwrap();

        let bps = body["breakpoints"].as_array().unwrap();
        assert_eq!(bps.len(), 3);
        assert_eq!(bps[0]["verified"], true);
        assert_eq!(bps[0]["line"], 2);
        assert_eq!(bps[0]["column"], 1);
        assert_eq!(bps[1]["verified"], true);
        assert_eq!(bps[1]["line"], 3);
        assert_eq!(bps[2]["verified"], false);
        assert_eq!(bps[2]["line"], 9);
        assert!(bps[2]["message"].is_string());
        assert_eq!(calls.borrow()[0], "clear_breakpoints");
    }

    #[test]
    fn test_set_breakpoints_requires_program() {
        let mut state = SessionState::new(Box::new(MockState::default()));
        let command = Command::parse("setBreakpoints", &json!({"breakpoints": []}))
            .unwrap()
            .unwrap();
        let err = command.handle(&mut state).unwrap_err();
        assert_eq!(err.to_string(), "No program has been launched.");

        let err = Command::parse("setBreakpoints", &json!({"breakpoints": [{"column": 1}]}))
            .unwrap()
            .unwrap_err();
        assert_eq!(err.to_string(), "Every breakpoint requires a 'line'.");
    }

    #[test]
    fn test_set_exception_breakpoints() {
        let mut state = SessionState::new(Box::new(MockState::default()));
        let command = Command::parse("setExceptionBreakpoints", &json!({"filters": ["assertions", "other"]}))
            .unwrap()
            .unwrap();
        let body = command.handle(&mut state).unwrap().unwrap();
        assert_eq!(
            body,
            json!({"breakpoints": [{"verified": true}, {"verified": true}]})
        );
        assert_eq!(state.exception_filters, vec!["assertions", "other"]);

        assert!(Command::parse("setExceptionBreakpoints", &json!({"filters": [1]}))
            .unwrap()
            .is_err());
    }
}
