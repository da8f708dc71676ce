//! Simulation engine seam.
//!
//! The DAP session drives quantum programs exclusively through [`SimulationState`].
//! A built-in state-vector backend lives in [`sim`]; any other backend can be plugged in
//! by implementing the trait.

mod error;
#[cfg(test)]
pub mod mock;
pub mod sim;

pub use error::{Error, ParsingError, ParsingErrorLocation, Result};

use std::fmt::{Display, Formatter};

/// Complex amplitude of a computational basis state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub real: f64,
    pub imaginary: f64,
}

impl Complex {
    pub const ZERO: Complex = Complex::new(0.0, 0.0);
    pub const ONE: Complex = Complex::new(1.0, 0.0);

    pub const fn new(real: f64, imaginary: f64) -> Self {
        Self { real, imaginary }
    }

    pub fn norm_sqr(&self) -> f64 {
        self.real * self.real + self.imaginary * self.imaginary
    }

    pub fn conj(&self) -> Self {
        Self::new(self.real, -self.imaginary)
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.real * factor, self.imaginary * factor)
    }
}

impl std::ops::Add for Complex {
    type Output = Complex;

    fn add(self, rhs: Self) -> Self::Output {
        Complex::new(self.real + rhs.real, self.imaginary + rhs.imaginary)
    }
}

impl std::ops::Sub for Complex {
    type Output = Complex;

    fn sub(self, rhs: Self) -> Self::Output {
        Complex::new(self.real - rhs.real, self.imaginary - rhs.imaginary)
    }
}

impl std::ops::Mul for Complex {
    type Output = Complex;

    fn mul(self, rhs: Self) -> Self::Output {
        Complex::new(
            self.real * rhs.real - self.imaginary * rhs.imaginary,
            self.real * rhs.imaginary + self.imaginary * rhs.real,
        )
    }
}

impl Display for Complex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} + {}i", self.real, self.imaginary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Bool,
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Classical variable as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub r#type: VariableType,
    pub value: VariableValue,
}

impl Variable {
    pub fn bool_value(&self) -> Option<bool> {
        match self.value {
            VariableValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCauseType {
    Unknown,
    MissingInteraction,
    ControlAlwaysZero,
}

/// A potential reason for the last assertion failure, anchored at an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCause {
    pub instruction: usize,
    pub r#type: ErrorCauseType,
}

/// Operations a quantum simulation backend offers to the debug session.
///
/// Positions are byte offsets into the loaded program text; instruction ranges
/// are end-inclusive.
pub trait SimulationState {
    fn load_code(&mut self, code: &str) -> Result<()>;
    fn reset_simulation(&mut self) -> Result<()>;

    fn step_forward(&mut self) -> Result<()>;
    fn step_over_forward(&mut self) -> Result<()>;
    fn step_out_forward(&mut self) -> Result<()>;
    fn step_backward(&mut self) -> Result<()>;
    fn step_over_backward(&mut self) -> Result<()>;
    fn step_out_backward(&mut self) -> Result<()>;
    fn run_simulation(&mut self) -> Result<()>;
    fn run_simulation_backward(&mut self) -> Result<()>;
    fn pause_simulation(&mut self) -> Result<()>;

    fn can_step_forward(&self) -> bool;
    fn can_step_backward(&self) -> bool;
    fn is_finished(&self) -> bool;
    fn did_assertion_fail(&self) -> bool;
    fn was_breakpoint_hit(&self) -> bool;

    fn get_current_instruction(&self) -> usize;
    fn get_instruction_count(&self) -> usize;
    fn get_instruction_position(&self, instruction: usize) -> Result<(usize, usize)>;
    fn get_stack_depth(&self) -> Result<usize>;
    /// Instructions of the active frames, innermost first.
    fn get_stack_trace(&self, max_depth: usize) -> Result<Vec<usize>>;

    fn get_num_qubits(&self) -> usize;
    fn get_amplitude_bitstring(&self, bitstring: &str) -> Result<Complex>;
    fn change_amplitude_value(&mut self, bitstring: &str, value: Complex) -> Result<()>;

    fn get_num_classical_variables(&self) -> usize;
    fn get_classical_variable_name(&self, index: usize) -> Result<String>;
    fn get_classical_variable(&self, name: &str) -> Result<Variable>;
    /// Flip a boolean classical variable.
    fn change_classical_value(&mut self, name: &str) -> Result<()>;

    /// Set a breakpoint near `desired_position`, returns the chosen instruction.
    fn set_breakpoint(&mut self, desired_position: usize) -> Result<usize>;
    fn clear_breakpoints(&mut self) -> Result<()>;

    /// Instructions the given instruction causally depends on (itself included).
    fn get_data_dependencies(&self, instruction: usize) -> Result<Vec<usize>>;
    fn potential_error_causes(&self) -> Result<Vec<ErrorCause>>;
}
