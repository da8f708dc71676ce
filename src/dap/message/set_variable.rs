//! `setVariable`: amplitudes in the quantum scope, bits everywhere else.

use super::inspection::{format_complex, CLASSICAL_SCOPE, QUANTUM_SCOPE, REGISTER_BASE};
use super::{bool_text, optional_int, Command, HandleResult, ValidationError};
use crate::dap::state::SessionState;
use crate::engine::{Complex, VariableType};
use log::debug;
use serde_json::{json, Value};

/// Amplitudes closer than this to the requested value are left alone.
const EPS: f64 = 1e-9;

const TRUE_VALUES: [&str; 5] = ["1", "true", "t", "yes", "on"];
const FALSE_VALUES: [&str; 5] = ["0", "false", "f", "no", "off"];

pub fn parse(args: &Value) -> Result<Command, ValidationError> {
    let reference = optional_int(args, "variablesReference").map_err(|_| {
        ValidationError::new(
            "The 'setVariable' request requires an integer 'variablesReference' argument.",
        )
    })?;
    let name = variable_name(args);

    match reference {
        Some(QUANTUM_SCOPE) => AmplitudeChange::parse(name, args).map(Command::SetAmplitude),
        None | Some(CLASSICAL_SCOPE) => BitChange::parse(name, args).map(Command::SetBit),
        Some(r) if r >= REGISTER_BASE => BitChange::parse(name, args).map(Command::SetBit),
        Some(_) => Err(ValidationError::new(
            "Only classical variables can be changed.",
        )),
    }
}

/// `variableName` wins over the DAP standard `name`.
fn variable_name(args: &Value) -> Option<&str> {
    ["variableName", "name"]
        .iter()
        .filter_map(|key| args.get(*key).and_then(Value::as_str))
        .find(|name| !name.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeChange {
    pub name: String,
    pub value: String,
}

impl AmplitudeChange {
    fn parse(name: Option<&str>, args: &Value) -> Result<Self, ValidationError> {
        let name = name.ok_or_else(|| {
            ValidationError::new(
                "The 'setVariable' request requires a non-empty 'variableName' argument.",
            )
        })?;
        let value = args.get("value").and_then(Value::as_str).ok_or_else(|| {
            ValidationError::new("The 'setVariable' request for quantum amplitudes must provide the new complex value as a string.")
        })?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        let bitstring = self.bitstring()?;
        let num_qubits = state.engine.get_num_qubits();
        if bitstring.len() != num_qubits {
            return Err(ValidationError::new(format!(
                "The bitstring '{bitstring}' must have length {num_qubits}."
            )));
        }
        let desired = parse_complex(&self.value)?;

        let current = state.engine.get_amplitude_bitstring(bitstring)?;
        let updated = if (current.real - desired.real).abs() <= EPS
            && (current.imaginary - desired.imaginary).abs() <= EPS
        {
            current
        } else {
            debug!(target: "dap", "amplitude |{bitstring}> := {desired}");
            state.engine.change_amplitude_value(bitstring, desired)?;
            state.engine.get_amplitude_bitstring(bitstring)?
        };

        Ok(Some(json!({
            "value": format_complex(updated),
            "type": "complex",
            "variablesReference": 0,
        })))
    }

    fn bitstring(&self) -> Result<&str, ValidationError> {
        let bitstring = self
            .name
            .trim()
            .strip_prefix('|')
            .and_then(|n| n.strip_suffix('>'))
            .ok_or_else(|| {
                ValidationError::new(
                    "Quantum amplitudes must be addressed using the '|...>' notation.",
                )
            })?;
        if bitstring.is_empty() || !bitstring.chars().all(|c| c == '0' || c == '1') {
            return Err(ValidationError::new(format!(
                "'{}' is not a valid computational basis state.",
                self.name
            )));
        }
        Ok(bitstring)
    }
}

/// Parse `a`, `bi`, `a+bi` or `a-bi`, with `i` or `j` as the imaginary unit and
/// any whitespace.
pub fn parse_complex(text: &str) -> Result<Complex, ValidationError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ValidationError::new(
            "The new amplitude value must not be empty.",
        ));
    }
    let invalid =
        || ValidationError::new(format!("The provided value '{text}' is not a valid complex number."));

    if compact.contains('i') && compact.contains('j') {
        return Err(invalid());
    }
    let normalized = compact.replace('j', "i");
    let literal = normalized
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(&normalized);

    let (real, imaginary) = match literal.strip_suffix('i') {
        Some(body) => {
            // the sign that separates the parts is the last one not belonging to an exponent
            let split = body
                .char_indices()
                .filter(|(idx, c)| {
                    (*c == '+' || *c == '-')
                        && *idx > 0
                        && !matches!(body.as_bytes()[idx - 1], b'e' | b'E')
                })
                .map(|(idx, _)| idx)
                .last();
            let (real, imaginary) = match split {
                Some(idx) => (parse_float(&body[..idx]), imaginary_coefficient(&body[idx..])),
                None => (Some(0.0), imaginary_coefficient(body)),
            };
            (real.ok_or_else(invalid)?, imaginary.ok_or_else(invalid)?)
        }
        None => (parse_float(literal).ok_or_else(invalid)?, 0.0),
    };
    Ok(Complex::new(real, imaginary))
}

fn imaginary_coefficient(text: &str) -> Option<f64> {
    match text {
        "" => None,
        "+" => Some(1.0),
        "-" => Some(-1.0),
        _ => parse_float(text),
    }
}

fn parse_float(text: &str) -> Option<f64> {
    if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitValue {
    Toggle,
    Set(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitChange {
    pub name: String,
    pub value: BitValue,
}

impl BitChange {
    fn parse(name: Option<&str>, args: &Value) -> Result<Self, ValidationError> {
        let name = name.ok_or_else(|| {
            ValidationError::new(
                "The 'setVariable' request requires a non-empty 'variableName' or 'name' argument.",
            )
        })?;
        let value = match args.get("value") {
            None | Some(Value::Null) => BitValue::Toggle,
            Some(Value::Bool(b)) => BitValue::Set(*b),
            Some(Value::String(s)) => BitValue::Set(parse_bool(s)?),
            Some(_) => {
                return Err(ValidationError::new(
                    "The 'setVariable' request only accepts boolean or string values.",
                ))
            }
        };
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        let variable = state
            .engine
            .get_classical_variable(&self.name)
            .map_err(|_| {
                ValidationError::new(format!(
                    "The variable '{}' is not a classical bit.",
                    self.name
                ))
            })?;
        let current = match (variable.r#type, variable.bool_value()) {
            (VariableType::Bool, Some(b)) => b,
            _ => {
                return Err(ValidationError::new(
                    "Only boolean classical variables can be changed.",
                ))
            }
        };

        let desired = match self.value {
            BitValue::Toggle => !current,
            BitValue::Set(b) => b,
        };
        if desired != current {
            state.engine.change_classical_value(&self.name)?;
            let updated = state.engine.get_classical_variable(&self.name)?.bool_value();
            if updated != Some(desired) {
                return Err(ValidationError::new(format!(
                    "Failed to change '{}' to {}.",
                    self.name,
                    bool_text(desired)
                )));
            }
        }

        Ok(Some(json!({
            "value": bool_text(desired),
            "type": "boolean",
            "variablesReference": 0,
        })))
    }
}

fn parse_bool(text: &str) -> Result<bool, ValidationError> {
    let normalized = text.trim().to_lowercase();
    if TRUE_VALUES.contains(&normalized.as_str()) {
        Ok(true)
    } else if FALSE_VALUES.contains(&normalized.as_str()) {
        Ok(false)
    } else {
        Err(ValidationError::new(
            "Only boolean values (0/1/true/false) are supported for classical bits.",
        ))
    }
}
