//! Scriptable engine used by unit tests of the DAP session.

use super::{
    Complex, Error, ErrorCause, ParsingError, Result, SimulationState, Variable, VariableType,
    VariableValue,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
pub struct MockState {
    pub load_error: Option<ParsingError>,
    pub positions: Vec<(usize, usize)>,
    pub current: usize,
    pub finished: bool,
    pub assertion_failed: bool,
    pub breakpoint_hit: bool,
    pub can_step_back: bool,
    pub num_qubits: usize,
    pub amplitudes: HashMap<String, Complex>,
    pub variables: Vec<Variable>,
    pub dependencies: Vec<usize>,
    pub causes: Vec<ErrorCause>,
    pub breakpoints: Vec<usize>,
    /// Names of every mutating engine call, in order. Shared so tests can inspect
    /// it after the mock was boxed.
    pub calls: Rc<RefCell<Vec<&'static str>>>,
    /// When set, flipping a variable leaves it unchanged.
    pub stuck_variables: bool,
}

impl MockState {
    pub fn with_instructions(positions: Vec<(usize, usize)>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }

    pub fn with_bool(mut self, name: &str, value: bool) -> Self {
        self.variables.push(Variable {
            name: name.to_string(),
            r#type: VariableType::Bool,
            value: VariableValue::Bool(value),
        });
        self
    }

    pub fn with_int(mut self, name: &str, value: i64) -> Self {
        self.variables.push(Variable {
            name: name.to_string(),
            r#type: VariableType::Int,
            value: VariableValue::Int(value),
        });
        self
    }

    pub fn called(&self, name: &str) -> bool {
        self.calls.borrow().contains(&name)
    }
}

impl SimulationState for MockState {
    fn load_code(&mut self, _code: &str) -> Result<()> {
        self.calls.borrow_mut().push("load_code");
        match self.load_error.clone() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn reset_simulation(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("reset_simulation");
        self.current = 0;
        self.finished = false;
        Ok(())
    }

    fn step_forward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("step_forward");
        Ok(())
    }

    fn step_over_forward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("step_over_forward");
        Ok(())
    }

    fn step_out_forward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("step_out_forward");
        Ok(())
    }

    fn step_backward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("step_backward");
        Ok(())
    }

    fn step_over_backward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("step_over_backward");
        Ok(())
    }

    fn step_out_backward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("step_out_backward");
        Ok(())
    }

    fn run_simulation(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("run_simulation");
        Ok(())
    }

    fn run_simulation_backward(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("run_simulation_backward");
        Ok(())
    }

    fn pause_simulation(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("pause_simulation");
        Ok(())
    }

    fn can_step_forward(&self) -> bool {
        !self.finished
    }

    fn can_step_backward(&self) -> bool {
        self.can_step_back
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn did_assertion_fail(&self) -> bool {
        self.assertion_failed
    }

    fn was_breakpoint_hit(&self) -> bool {
        self.breakpoint_hit
    }

    fn get_current_instruction(&self) -> usize {
        self.current
    }

    fn get_instruction_count(&self) -> usize {
        self.positions.len()
    }

    fn get_instruction_position(&self, instruction: usize) -> Result<(usize, usize)> {
        self.positions
            .get(instruction)
            .copied()
            .ok_or(Error::InvalidInstruction(instruction))
    }

    fn get_stack_depth(&self) -> Result<usize> {
        Ok(1)
    }

    fn get_stack_trace(&self, _max_depth: usize) -> Result<Vec<usize>> {
        Ok(vec![self.current])
    }

    fn get_num_qubits(&self) -> usize {
        self.num_qubits
    }

    fn get_amplitude_bitstring(&self, bitstring: &str) -> Result<Complex> {
        self.amplitudes
            .get(bitstring)
            .copied()
            .ok_or_else(|| Error::InvalidBitstring(bitstring.to_string(), self.num_qubits))
    }

    fn change_amplitude_value(&mut self, bitstring: &str, value: Complex) -> Result<()> {
        self.calls.borrow_mut().push("change_amplitude_value");
        if value.norm_sqr() > 1.0 + 1e-9 {
            return Err(Error::AmplitudeTooLarge(value.norm_sqr().sqrt()));
        }
        self.amplitudes.insert(bitstring.to_string(), value);
        Ok(())
    }

    fn get_num_classical_variables(&self) -> usize {
        self.variables.len()
    }

    fn get_classical_variable_name(&self, index: usize) -> Result<String> {
        self.variables
            .get(index)
            .map(|v| v.name.clone())
            .ok_or(Error::VariableIndex(index))
    }

    fn get_classical_variable(&self, name: &str) -> Result<Variable> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    fn change_classical_value(&mut self, name: &str) -> Result<()> {
        self.calls.borrow_mut().push("change_classical_value");
        let stuck = self.stuck_variables;
        let var = self
            .variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        match var.value {
            VariableValue::Bool(b) if !stuck => var.value = VariableValue::Bool(!b),
            VariableValue::Bool(_) => {}
            _ => return Err(Error::NotBoolean(name.to_string())),
        }
        Ok(())
    }

    fn set_breakpoint(&mut self, desired_position: usize) -> Result<usize> {
        self.calls.borrow_mut().push("set_breakpoint");
        let idx = self
            .positions
            .iter()
            .position(|(_, end)| *end >= desired_position)
            .ok_or(Error::NoInstructionAt(desired_position))?;
        self.breakpoints.push(idx);
        Ok(idx)
    }

    fn clear_breakpoints(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("clear_breakpoints");
        self.breakpoints.clear();
        Ok(())
    }

    fn get_data_dependencies(&self, _instruction: usize) -> Result<Vec<usize>> {
        Ok(self.dependencies.clone())
    }

    fn potential_error_causes(&self) -> Result<Vec<ErrorCause>> {
        Ok(self.causes.clone())
    }
}
