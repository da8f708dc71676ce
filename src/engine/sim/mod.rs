//! Built-in state-vector backend for a small OpenQASM 2 subset.
//!
//! Every statement is one instruction. Forward execution snapshots the state before each
//! instruction, so backward stepping restores the exact earlier state (including measurement
//! outcomes).

mod parser;
mod state;

pub use parser::{Gate, Operation, Program, MAX_QUBITS};

use crate::engine::{
    Complex, Error, ErrorCause, ErrorCauseType, Result, SimulationState, Variable, VariableType,
    VariableValue,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use state::StateVector;
use std::collections::BTreeSet;

/// What was observed about the control qubit of a controlled gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlObservation {
    NotExecuted,
    AlwaysZero,
    SeenOne,
}

#[derive(Debug, Clone)]
struct Snapshot {
    state: StateVector,
    bits: Vec<bool>,
    current: usize,
    assertion_failed: bool,
    controls: Vec<ControlObservation>,
}

pub struct QasmSimulation {
    program: Option<Program>,
    state: StateVector,
    bits: Vec<bool>,
    current: usize,
    assertion_failed: bool,
    breakpoint_hit: bool,
    breakpoints: BTreeSet<usize>,
    controls: Vec<ControlObservation>,
    history: Vec<Snapshot>,
    rng: StdRng,
}

impl Default for QasmSimulation {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl QasmSimulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulation with reproducible measurement outcomes.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            program: None,
            state: StateVector::new(0),
            bits: vec![],
            current: 0,
            assertion_failed: false,
            breakpoint_hit: false,
            breakpoints: BTreeSet::new(),
            controls: vec![],
            history: vec![],
            rng,
        }
    }

    fn program(&self) -> Result<&Program> {
        self.program.as_ref().ok_or(Error::NoProgram)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            bits: self.bits.clone(),
            current: self.current,
            assertion_failed: self.assertion_failed,
            controls: self.controls.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.state = snapshot.state;
        self.bits = snapshot.bits;
        self.current = snapshot.current;
        self.assertion_failed = snapshot.assertion_failed;
        self.controls = snapshot.controls;
    }

    /// Execute the current instruction, returns `false` if it is a failing assertion.
    fn execute_current(&mut self) -> Result<bool> {
        let op = self
            .program()?
            .instructions
            .get(self.current)
            .map(|i| i.op.clone())
            .ok_or(Error::InvalidInstruction(self.current))?;

        match op {
            Operation::Nop => {}
            Operation::Gate { gate, targets } => {
                if gate.is_controlled() {
                    let seen_one = self.state.probability_one(targets[0]) > state::EPS;
                    let observation = &mut self.controls[self.current];
                    *observation = match (*observation, seen_one) {
                        (_, true) | (ControlObservation::SeenOne, _) => ControlObservation::SeenOne,
                        _ => ControlObservation::AlwaysZero,
                    };
                }
                self.state.apply(gate, &targets);
            }
            Operation::Measure { qubit, bit } => {
                let outcome = self.measure(qubit);
                self.bits[bit] = outcome;
            }
            Operation::Reset { qubit } => {
                if self.measure(qubit) {
                    self.state.apply(Gate::X, &[qubit]);
                }
            }
            Operation::AssertEntanglement(qubits) => {
                let holds = qubits.iter().enumerate().all(|(i, a)| {
                    qubits[i + 1..]
                        .iter()
                        .all(|b| self.state.are_correlated(*a, *b))
                });
                if !holds {
                    log::debug!(target: "engine", "entanglement assertion failed at {}", self.current);
                }
                return Ok(holds);
            }
            Operation::AssertSuperposition(qubits) => {
                let holds = self.state.is_superposition(&qubits);
                if !holds {
                    log::debug!(target: "engine", "superposition assertion failed at {}", self.current);
                }
                return Ok(holds);
            }
        }
        Ok(true)
    }

    fn measure(&mut self, qubit: usize) -> bool {
        let p_one = self.state.probability_one(qubit);
        let outcome = self.rng.gen::<f64>() < p_one;
        self.state.collapse(qubit, outcome);
        outcome
    }

    fn parse_bitstring(&self, bitstring: &str) -> Result<usize> {
        let num_qubits = self.get_num_qubits();
        let invalid = || Error::InvalidBitstring(bitstring.to_string(), num_qubits);
        if bitstring.len() != num_qubits || !bitstring.chars().all(|c| c == '0' || c == '1') {
            return Err(invalid());
        }
        usize::from_str_radix(bitstring, 2).map_err(|_| invalid())
    }

    fn bit_index(&self, name: &str) -> Result<usize> {
        self.program()?
            .classical_bits
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    /// Union-find roots of qubits that interacted through instructions before `until`.
    fn interaction_groups(&self, until: usize) -> Result<Vec<usize>> {
        let program = self.program()?;
        let mut parent: Vec<usize> = (0..program.num_qubits).collect();
        fn find(parent: &mut [usize], mut q: usize) -> usize {
            while parent[q] != q {
                parent[q] = parent[parent[q]];
                q = parent[q];
            }
            q
        }
        for instruction in program.instructions.iter().take(until) {
            if let Operation::Gate { targets, .. } = &instruction.op {
                if let [a, b] = targets.as_slice() {
                    let (ra, rb) = (find(&mut parent, *a), find(&mut parent, *b));
                    parent[ra] = rb;
                }
            }
        }
        Ok((0..program.num_qubits)
            .map(|q| find(&mut parent, q))
            .collect())
    }
}

impl SimulationState for QasmSimulation {
    fn load_code(&mut self, code: &str) -> Result<()> {
        self.program = None;
        self.breakpoints.clear();
        let program = parser::parse(code)?;
        log::info!(
            target: "engine",
            "loaded program: {} instructions, {} qubits",
            program.instructions.len(),
            program.num_qubits
        );
        self.program = Some(program);
        self.reset_simulation()
    }

    fn reset_simulation(&mut self) -> Result<()> {
        let (qubits, bits, instructions) = self
            .program
            .as_ref()
            .map(|p| (p.num_qubits, p.classical_bits.len(), p.instructions.len()))
            .unwrap_or_default();
        self.state = StateVector::new(qubits);
        self.bits = vec![false; bits];
        self.controls = vec![ControlObservation::NotExecuted; instructions];
        self.current = 0;
        self.assertion_failed = false;
        self.breakpoint_hit = false;
        self.history.clear();
        Ok(())
    }

    fn step_forward(&mut self) -> Result<()> {
        if self.program()?.instructions.len() <= self.current {
            return Err(Error::CannotStep("forward", "the program has finished"));
        }
        self.breakpoint_hit = false;
        self.history.push(self.snapshot());
        if self.assertion_failed {
            self.assertion_failed = false;
            self.current += 1;
            return Ok(());
        }
        if self.execute_current()? {
            self.current += 1;
        } else {
            self.assertion_failed = true;
        }
        Ok(())
    }

    fn step_over_forward(&mut self) -> Result<()> {
        self.step_forward()
    }

    fn step_out_forward(&mut self) -> Result<()> {
        // Programs have a single frame: leaving it means running to the end.
        self.run_simulation()
    }

    fn step_backward(&mut self) -> Result<()> {
        let snapshot = self
            .history
            .pop()
            .ok_or(Error::CannotStep("backward", "already at the start"))?;
        self.restore(snapshot);
        self.breakpoint_hit = false;
        Ok(())
    }

    fn step_over_backward(&mut self) -> Result<()> {
        self.step_backward()
    }

    fn step_out_backward(&mut self) -> Result<()> {
        self.run_simulation_backward()
    }

    fn run_simulation(&mut self) -> Result<()> {
        self.program()?;
        let mut moved = false;
        while !self.is_finished() {
            if moved && self.breakpoints.contains(&self.current) {
                self.breakpoint_hit = true;
                break;
            }
            self.step_forward()?;
            moved = true;
            if self.assertion_failed {
                break;
            }
        }
        Ok(())
    }

    fn run_simulation_backward(&mut self) -> Result<()> {
        self.program()?;
        while !self.history.is_empty() {
            self.step_backward()?;
            if self.breakpoints.contains(&self.current) {
                self.breakpoint_hit = true;
                break;
            }
        }
        Ok(())
    }

    fn pause_simulation(&mut self) -> Result<()> {
        // Execution is synchronous: by the time a pause arrives the simulation is already halted.
        Ok(())
    }

    fn can_step_forward(&self) -> bool {
        self.program
            .as_ref()
            .is_some_and(|p| self.current < p.instructions.len())
    }

    fn can_step_backward(&self) -> bool {
        !self.history.is_empty()
    }

    fn is_finished(&self) -> bool {
        self.current >= self.get_instruction_count()
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
        self.program
            .as_ref()
            .map(|p| p.instructions.len())
            .unwrap_or(0)
    }

    fn get_instruction_position(&self, instruction: usize) -> Result<(usize, usize)> {
        self.program()?
            .instructions
            .get(instruction)
            .map(|i| (i.start, i.end))
            .ok_or(Error::InvalidInstruction(instruction))
    }

    fn get_stack_depth(&self) -> Result<usize> {
        self.program()?;
        Ok(1)
    }

    fn get_stack_trace(&self, max_depth: usize) -> Result<Vec<usize>> {
        self.program()?;
        Ok(std::iter::once(self.current).take(max_depth).collect())
    }

    fn get_num_qubits(&self) -> usize {
        self.program.as_ref().map(|p| p.num_qubits).unwrap_or(0)
    }

    fn get_amplitude_bitstring(&self, bitstring: &str) -> Result<Complex> {
        let index = self.parse_bitstring(bitstring)?;
        self.state
            .amplitude(index)
            .ok_or_else(|| Error::InvalidBitstring(bitstring.to_string(), self.get_num_qubits()))
    }

    fn change_amplitude_value(&mut self, bitstring: &str, value: Complex) -> Result<()> {
        let index = self.parse_bitstring(bitstring)?;
        self.state.set_amplitude(index, value)
    }

    fn get_num_classical_variables(&self) -> usize {
        self.bits.len()
    }

    fn get_classical_variable_name(&self, index: usize) -> Result<String> {
        self.program()?
            .classical_bits
            .get(index)
            .cloned()
            .ok_or(Error::VariableIndex(index))
    }

    fn get_classical_variable(&self, name: &str) -> Result<Variable> {
        let index = self.bit_index(name)?;
        Ok(Variable {
            name: name.to_string(),
            r#type: VariableType::Bool,
            value: VariableValue::Bool(self.bits[index]),
        })
    }

    fn change_classical_value(&mut self, name: &str) -> Result<()> {
        let index = self.bit_index(name)?;
        self.bits[index] = !self.bits[index];
        Ok(())
    }

    fn set_breakpoint(&mut self, desired_position: usize) -> Result<usize> {
        let instruction = self
            .program()?
            .instructions
            .iter()
            .position(|i| i.end >= desired_position)
            .ok_or(Error::NoInstructionAt(desired_position))?;
        self.breakpoints.insert(instruction);
        Ok(instruction)
    }

    fn clear_breakpoints(&mut self) -> Result<()> {
        self.breakpoints.clear();
        Ok(())
    }

    fn get_data_dependencies(&self, instruction: usize) -> Result<Vec<usize>> {
        let instructions = &self.program()?.instructions;
        let target = instructions
            .get(instruction)
            .ok_or(Error::InvalidInstruction(instruction))?;

        let mut relevant: BTreeSet<usize> = target.op.qubits().iter().copied().collect();
        let mut dependencies = vec![instruction];
        for (idx, candidate) in instructions.iter().enumerate().take(instruction).rev() {
            let qubits = candidate.op.qubits();
            if qubits.is_empty() {
                dependencies.push(idx);
                continue;
            }
            if qubits.iter().any(|q| relevant.contains(q)) && !candidate.op.is_assertion() {
                dependencies.push(idx);
                if qubits.len() > 1 {
                    relevant.extend(qubits.iter().copied());
                }
            }
        }
        dependencies.sort_unstable();
        Ok(dependencies)
    }

    fn potential_error_causes(&self) -> Result<Vec<ErrorCause>> {
        if !self.assertion_failed {
            return Ok(vec![]);
        }
        let failing = self.current;
        let program = self.program()?;
        let mut causes = vec![];

        if let Some(Operation::AssertEntanglement(qubits)) =
            program.instructions.get(failing).map(|i| &i.op)
        {
            let groups = self.interaction_groups(failing)?;
            let never_interacted = qubits.iter().enumerate().any(|(i, a)| {
                qubits[i + 1..].iter().any(|b| groups[*a] != groups[*b])
            });
            if never_interacted {
                causes.push(ErrorCause {
                    instruction: failing,
                    r#type: ErrorCauseType::MissingInteraction,
                });
            }
        }

        for dependency in self.get_data_dependencies(failing)? {
            if self.controls.get(dependency) == Some(&ControlObservation::AlwaysZero) {
                causes.push(ErrorCause {
                    instruction: dependency,
                    r#type: ErrorCauseType::ControlAlwaysZero,
                });
            }
        }

        Ok(causes)
    }
}
