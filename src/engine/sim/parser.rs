//! Parser for the OpenQASM 2 subset understood by the built-in backend.

use crate::engine::ParsingError;
use std::collections::HashMap;

/// Hard cap on the simulated register width.
pub const MAX_QUBITS: usize = 16;
/// Cap on the total number of classical bits.
pub const MAX_CLASSICAL_BITS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    X,
    Y,
    Z,
    H,
    S,
    Sdg,
    T,
    Tdg,
    Cx,
    Cz,
    Swap,
}

impl Gate {
    fn from_name(name: &str) -> Option<Gate> {
        Some(match name {
            "x" => Gate::X,
            "y" => Gate::Y,
            "z" => Gate::Z,
            "h" => Gate::H,
            "s" => Gate::S,
            "sdg" => Gate::Sdg,
            "t" => Gate::T,
            "tdg" => Gate::Tdg,
            "cx" | "CX" => Gate::Cx,
            "cz" => Gate::Cz,
            "swap" => Gate::Swap,
            _ => return None,
        })
    }

    pub fn arity(&self) -> usize {
        match self {
            Gate::Cx | Gate::Cz | Gate::Swap => 2,
            _ => 1,
        }
    }

    /// Gates whose first operand acts as a control.
    pub fn is_controlled(&self) -> bool {
        matches!(self, Gate::Cx | Gate::Cz)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Declarations, headers and barriers.
    Nop,
    Gate { gate: Gate, targets: Vec<usize> },
    Measure { qubit: usize, bit: usize },
    Reset { qubit: usize },
    AssertEntanglement(Vec<usize>),
    AssertSuperposition(Vec<usize>),
}

impl Operation {
    pub fn qubits(&self) -> &[usize] {
        match self {
            Operation::Nop => &[],
            Operation::Gate { targets, .. } => targets,
            Operation::Measure { qubit, .. } | Operation::Reset { qubit } => {
                std::slice::from_ref(qubit)
            }
            Operation::AssertEntanglement(q) | Operation::AssertSuperposition(q) => q,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Operation::AssertEntanglement(_) | Operation::AssertSuperposition(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    /// Offset of the first character of the statement.
    pub start: usize,
    /// Offset of the terminating `;`.
    pub end: usize,
    pub op: Operation,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub num_qubits: usize,
    /// Flat list of classical bit names (`c[0]`, `c[1]`, ...).
    pub classical_bits: Vec<String>,
}

#[derive(Default)]
struct Registers {
    quantum: HashMap<String, (usize, usize)>,
    classical: HashMap<String, (usize, usize)>,
}

/// Parse program text into instructions.
pub fn parse(code: &str) -> Result<Program, ParsingError> {
    let mut program = Program::default();
    let mut registers = Registers::default();

    for (start, end) in statements(code)? {
        let text = &code[start..end];
        let op = parse_statement(text, &mut registers, &mut program)
            .map_err(|detail| error_at(code, start, detail))?;
        program.instructions.push(Instruction { start, end, op });
    }

    Ok(program)
}

/// Split code into `(start, end)` statement ranges, `end` pointing at the `;`.
fn statements(code: &str) -> Result<Vec<(usize, usize)>, ParsingError> {
    let bytes = code.as_bytes();
    let mut result = vec![];
    let mut start: Option<usize> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if b == b';' {
            match start.take() {
                Some(s) => result.push((s, i)),
                None => return Err(error_at(code, i, "empty statement")),
            }
        } else if start.is_none() && !b.is_ascii_whitespace() {
            start = Some(i);
        }
        i += 1;
    }

    if start.is_some() {
        return Err(error_at(code, code.len(), "expected ';'"));
    }
    Ok(result)
}

fn error_at(code: &str, offset: usize, detail: impl Into<String>) -> ParsingError {
    let before = &code[..offset.min(code.len())];
    let line = before.matches('\n').count() + 1;
    let column = offset - before.rfind('\n').map(|p| p + 1).unwrap_or(0) + 1;
    ParsingError::at(line, column, detail)
}

fn parse_statement(
    text: &str,
    registers: &mut Registers,
    program: &mut Program,
) -> Result<Operation, String> {
    let text = text.trim();
    let (keyword, rest) = match text.find(|c: char| c.is_whitespace()) {
        Some(idx) => (&text[..idx], text[idx..].trim()),
        None => (text, ""),
    };

    match keyword {
        "OPENQASM" | "include" | "barrier" => Ok(Operation::Nop),
        "qreg" => {
            let (name, size) = parse_declaration(rest)?;
            if registers.quantum.contains_key(&name) {
                return Err(format!("register '{name}' is already declared"));
            }
            if size > MAX_QUBITS - program.num_qubits {
                return Err(format!("at most {MAX_QUBITS} qubits are supported"));
            }
            registers
                .quantum
                .insert(name, (program.num_qubits, size));
            program.num_qubits += size;
            Ok(Operation::Nop)
        }
        "creg" => {
            let (name, size) = parse_declaration(rest)?;
            if registers.classical.contains_key(&name) {
                return Err(format!("register '{name}' is already declared"));
            }
            if size > MAX_CLASSICAL_BITS - program.classical_bits.len() {
                return Err(format!(
                    "at most {MAX_CLASSICAL_BITS} classical bits are supported"
                ));
            }
            registers
                .classical
                .insert(name.clone(), (program.classical_bits.len(), size));
            program
                .classical_bits
                .extend((0..size).map(|i| format!("{name}[{i}]")));
            Ok(Operation::Nop)
        }
        "measure" => {
            let (q, c) = rest
                .split_once("->")
                .ok_or_else(|| "expected 'measure <qubit> -> <bit>'".to_string())?;
            let qubit = resolve(&registers.quantum, q)?;
            let bit = resolve(&registers.classical, c)?;
            Ok(Operation::Measure { qubit, bit })
        }
        "reset" => Ok(Operation::Reset {
            qubit: resolve(&registers.quantum, rest)?,
        }),
        "assert-ent" | "assert-sup" => {
            let qubits = operands(&registers.quantum, rest)?;
            if keyword == "assert-ent" {
                if qubits.len() < 2 {
                    return Err("entanglement assertions need at least two qubits".to_string());
                }
                Ok(Operation::AssertEntanglement(qubits))
            } else {
                Ok(Operation::AssertSuperposition(qubits))
            }
        }
        name => {
            let gate = Gate::from_name(name).ok_or_else(|| format!("unknown gate '{name}'"))?;
            let targets = operands(&registers.quantum, rest)?;
            if targets.len() != gate.arity() {
                return Err(format!(
                    "gate '{name}' expects {} operand(s), got {}",
                    gate.arity(),
                    targets.len()
                ));
            }
            Ok(Operation::Gate { gate, targets })
        }
    }
}

fn parse_declaration(rest: &str) -> Result<(String, usize), String> {
    let (name, index) = split_indexed(rest)?;
    if index == 0 {
        return Err(format!("register '{name}' must not be empty"));
    }
    Ok((name.to_string(), index))
}

fn operands(registers: &HashMap<String, (usize, usize)>, rest: &str) -> Result<Vec<usize>, String> {
    let mut result: Vec<usize> = vec![];
    for operand in rest.split(',') {
        let q = resolve(registers, operand)?;
        if result.contains(&q) {
            return Err(format!("qubit '{}' is used twice", operand.trim()));
        }
        result.push(q);
    }
    Ok(result)
}

fn resolve(registers: &HashMap<String, (usize, usize)>, operand: &str) -> Result<usize, String> {
    let (name, index) = split_indexed(operand)?;
    let (offset, size) = registers
        .get(name)
        .ok_or_else(|| format!("unknown register '{name}'"))?;
    if index >= *size {
        return Err(format!("index {index} is out of range for register '{name}'"));
    }
    Ok(offset + index)
}

fn split_indexed(operand: &str) -> Result<(&str, usize), String> {
    let operand = operand.trim();
    let invalid = || format!("expected '<name>[<index>]', found '{operand}'");
    let (name, tail) = operand.split_once('[').ok_or_else(invalid)?;
    let index = tail.strip_suffix(']').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }
    let index = index.trim().parse::<usize>().map_err(|_| invalid())?;
    Ok((name, index))
}
