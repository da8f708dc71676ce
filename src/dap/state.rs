use crate::dap::diagnostics::{self, HighlightEntry};
use crate::dap::message::ValidationError;
use crate::dap::position::{IndexConvention, PositionMapper};
use crate::dap::protocol::SourceDescriptor;
use crate::engine::{ParsingError, SimulationState};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Uninitialized,
    Launched,
    Running,
    StoppedAtBreakpoint,
    StoppedOnException,
    Terminated,
}

/// Everything a request handler may read or change.
pub struct SessionState {
    pub engine: Box<dyn SimulationState>,
    pub phase: Phase,
    pub source: Option<SourceDescriptor>,
    pub source_code: String,
    pub convention: IndexConvention,
    pub exception_filters: Vec<String>,
    /// Highlights waiting for the next flush.
    pub pending_highlights: Vec<HighlightEntry>,
    /// Suppresses the `exited` event while the client still has to look at diagnostics.
    pub prevent_exit: bool,
    /// Last `supportsStepBack` value announced to the client.
    pub can_step_back: bool,
}

impl SessionState {
    pub fn new(engine: Box<dyn SimulationState>) -> Self {
        Self {
            engine,
            phase: Phase::Uninitialized,
            source: None,
            source_code: String::new(),
            convention: IndexConvention::default(),
            exception_filters: vec![],
            pending_highlights: vec![],
            prevent_exit: false,
            can_step_back: false,
        }
    }

    pub fn mapper(&self) -> PositionMapper<'_> {
        PositionMapper::new(&self.source_code, self.convention)
    }

    pub fn source_descriptor(&self) -> SourceDescriptor {
        self.source.clone().unwrap_or_default()
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(target: "dap", "session phase {} -> {phase}", self.phase);
            self.phase = phase;
        }
    }

    /// Derive the phase from the engine after it executed something.
    pub fn sync_phase(&mut self) {
        let phase = if self.engine.did_assertion_fail() {
            Phase::StoppedOnException
        } else if self.engine.was_breakpoint_hit() {
            Phase::StoppedAtBreakpoint
        } else {
            Phase::Running
        };
        self.set_phase(phase);
    }

    /// Fails unless a program was launched and the session is still alive.
    pub fn require_program(&self) -> Result<(), ValidationError> {
        match self.phase {
            Phase::Uninitialized => Err(ValidationError::new("No program has been launched.")),
            Phase::Terminated => Err(ValidationError::new("The debug session has terminated.")),
            _ => Ok(()),
        }
    }

    /// Client coordinates of the first character of `instruction`.
    pub fn instruction_location(&self, instruction: usize) -> Result<(usize, usize), ValidationError> {
        let (start, _) = self.engine.get_instruction_position(instruction)?;
        Ok(self.mapper().to_line_column(start))
    }

    /// 1-based line of `instruction` for user-facing messages.
    pub fn instruction_line(&self, instruction: usize) -> Result<usize, ValidationError> {
        let (start, _) = self.engine.get_instruction_position(instruction)?;
        Ok(self.mapper().line_number(start))
    }

    /// Trimmed source text of `instruction`.
    pub fn instruction_code(&self, instruction: usize) -> Result<String, ValidationError> {
        let (start, end) = self.engine.get_instruction_position(instruction)?;
        Ok(diagnostics::snippet(&self.source_code, start, end))
    }

    pub fn queue_parse_error(&mut self, error: &ParsingError) {
        match diagnostics::parse_error_highlight(error, &self.source_code, self.convention) {
            Some(entry) => self.pending_highlights = vec![entry],
            None => debug!(target: "dap", "no highlight for parse error: {error}"),
        }
    }
}
