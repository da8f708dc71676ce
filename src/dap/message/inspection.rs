use super::{bool_text, optional_index, optional_int, HandleResult, ValidationError};
use crate::dap::protocol::THREAD_ID;
use crate::dap::state::SessionState;
use crate::engine::{Complex, VariableValue};
use itertools::Itertools;
use serde_json::{json, Value};

/// Reference of the classical register scope.
pub const CLASSICAL_SCOPE: i64 = 1;
/// Reference of the quantum amplitude scope.
pub const QUANTUM_SCOPE: i64 = 2;
/// Registers are addressed as `REGISTER_BASE + register index`.
pub const REGISTER_BASE: i64 = 10;

const END_OF_PROGRAM: &str = "<end of program>";

pub fn threads() -> HandleResult {
    Ok(Some(json!({
        "threads": [{ "id": THREAD_ID, "name": "Main Thread" }],
    })))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackTraceArgs {
    pub start_frame: usize,
    /// `0` means all frames.
    pub levels: usize,
}

impl StackTraceArgs {
    pub fn parse(args: &Value) -> Result<Self, ValidationError> {
        optional_int(args, "threadId")?;
        Ok(Self {
            start_frame: optional_index(args, "startFrame")?.unwrap_or(0),
            levels: optional_index(args, "levels")?.unwrap_or(0),
        })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        let depth = state.engine.get_stack_depth()?;
        let trace = state.engine.get_stack_trace(depth)?;
        let count = state.engine.get_instruction_count();
        let source = state.source_descriptor();

        let levels = if self.levels == 0 {
            trace.len()
        } else {
            self.levels
        };
        let mut frames = vec![];
        for (id, instruction) in trace.iter().enumerate().skip(self.start_frame).take(levels) {
            let (name, (line, column)) = if *instruction < count {
                let code = state.instruction_code(*instruction)?;
                let name = code.lines().next().unwrap_or_default().trim().to_string();
                (name, state.instruction_location(*instruction)?)
            } else {
                let end = state.source_code.len();
                (END_OF_PROGRAM.to_string(), state.mapper().to_line_column(end))
            };
            frames.push(json!({
                "id": id,
                "name": name,
                "line": line,
                "column": column,
                "source": source,
            }));
        }

        Ok(Some(json!({
            "stackFrames": frames,
            "totalFrames": trace.len(),
        })))
    }
}

pub fn scopes(state: &mut SessionState) -> HandleResult {
    let num_qubits = state.engine.get_num_qubits();
    Ok(Some(json!({
        "scopes": [
            {
                "name": "Classical Registers",
                "variablesReference": CLASSICAL_SCOPE,
                "expensive": false,
            },
            {
                "name": "Quantum State",
                "variablesReference": QUANTUM_SCOPE,
                "indexedVariables": 1u64 << num_qubits,
                "expensive": false,
            },
        ],
    })))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariablesArgs {
    pub reference: i64,
    pub start: usize,
    /// `0` means everything from `start`.
    pub count: usize,
}

impl VariablesArgs {
    pub fn parse(args: &Value) -> Result<Self, ValidationError> {
        let reference = optional_int(args, "variablesReference")?.ok_or_else(|| {
            ValidationError::new("The 'variables' request requires a 'variablesReference'.")
        })?;
        Ok(Self {
            reference,
            start: optional_index(args, "start")?.unwrap_or(0),
            count: optional_index(args, "count")?.unwrap_or(0),
        })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        let variables: Vec<Value> = match self.reference {
            CLASSICAL_SCOPE => registers(state)?
                .into_iter()
                .enumerate()
                .map(|(idx, (name, bits))| {
                    json!({
                        "name": name,
                        "value": format!("{} bits", bits.len()),
                        "type": "register",
                        "variablesReference": REGISTER_BASE + idx as i64,
                    })
                })
                .collect(),
            QUANTUM_SCOPE => self.amplitudes(state)?,
            r if r >= REGISTER_BASE => {
                let registers = registers(state)?;
                let (_, bits) = usize::try_from(r - REGISTER_BASE)
                    .ok()
                    .and_then(|idx| registers.get(idx))
                    .ok_or_else(|| unknown_reference(r))?;
                let mut values = Vec::with_capacity(bits.len());
                for name in bits {
                    values.push(classical_variable(state, name)?);
                }
                values
            }
            r => return Err(unknown_reference(r)),
        };

        Ok(Some(json!({ "variables": variables })))
    }

    fn amplitudes(&self, state: &SessionState) -> Result<Vec<Value>, ValidationError> {
        let num_qubits = state.engine.get_num_qubits();
        if num_qubits == 0 {
            return Ok(vec![]);
        }
        let total = 1usize << num_qubits;
        let end = if self.count == 0 {
            total
        } else {
            self.start.saturating_add(self.count).min(total)
        };

        let mut result = vec![];
        for index in self.start.min(end)..end {
            let bitstring = format!("{index:0num_qubits$b}");
            let amplitude = state.engine.get_amplitude_bitstring(&bitstring)?;
            result.push(json!({
                "name": format!("|{bitstring}>"),
                "value": format_complex(amplitude),
                "type": "complex",
                "variablesReference": 0,
            }));
        }
        Ok(result)
    }
}

fn unknown_reference(reference: i64) -> ValidationError {
    ValidationError::new(format!("Unknown variables reference {reference}."))
}

/// Classical variables grouped by the register name in front of `[`, in engine order.
fn registers(state: &SessionState) -> Result<Vec<(String, Vec<String>)>, ValidationError> {
    let names = (0..state.engine.get_num_classical_variables())
        .map(|idx| state.engine.get_classical_variable_name(idx))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names
        .into_iter()
        .group_by(|name| name.split('[').next().unwrap_or_default().to_string())
        .into_iter()
        .map(|(register, bits)| (register, bits.collect()))
        .collect())
}

fn classical_variable(state: &SessionState, name: &str) -> Result<Value, ValidationError> {
    let var = state.engine.get_classical_variable(name)?;
    let (value, ty) = match var.value {
        VariableValue::Bool(b) => (bool_text(b).to_string(), "boolean"),
        VariableValue::Int(i) => (i.to_string(), "int"),
        VariableValue::Float(f) => (f.to_string(), "float"),
    };
    Ok(json!({
        "name": var.name,
        "value": value,
        "type": ty,
        "variablesReference": 0,
    }))
}

pub fn exception_info(state: &mut SessionState) -> HandleResult {
    if !state.engine.did_assertion_fail() {
        return Err(ValidationError::new("No assertion has failed."));
    }
    let current = state.engine.get_current_instruction();
    let line = state.instruction_line(current)?;
    let code = state.instruction_code(current)?;
    Ok(Some(json!({
        "exceptionId": "assertion-failed",
        "description": format!("Assertion failed on line {line}"),
        "breakMode": "always",
        "details": { "message": code },
    })))
}

/// Render an amplitude with six significant digits, `a + bi` or `a - bi`.
pub fn format_complex(value: Complex) -> String {
    let sign = if value.imaginary < 0.0 { '-' } else { '+' };
    format!(
        "{} {sign} {}i",
        format_general(value.real),
        format_general(value.imaginary.abs())
    )
}

/// `%.6g` formatting: fixed notation for moderate exponents, scientific otherwise,
/// trailing zeros removed.
fn format_general(value: f64) -> String {
    const PRECISION: i32 = 6;
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", strip_zeros(mantissa), exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        strip_zeros(&format!("{value:.decimals$}")).to_string()
    }
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
