//! Typed DAP requests.
//!
//! Every supported command is parsed into a [`Command`] before anything touches
//! the session. Parsing checks argument shapes, handling checks them against the
//! session and the engine. Both kinds of failure surface as [`ValidationError`]
//! and end up in a `success: false` response.

mod breakpoints;
mod execution;
mod inspection;
mod launch;
mod lifecycle;
mod set_variable;

pub use execution::Execution;
pub use launch::LaunchArgs;

use crate::dap::state::SessionState;
use serde_json::Value;

/// Rejected request arguments, the message is shown to the user as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<crate::engine::Error> for ValidationError {
    fn from(e: crate::engine::Error) -> Self {
        Self(e.to_string())
    }
}

pub type HandleResult = Result<Option<Value>, ValidationError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Initialize(lifecycle::InitializeArgs),
    Launch(LaunchArgs),
    Restart(LaunchArgs),
    ConfigurationDone,
    Disconnect,
    Terminate,
    SetBreakpoints(breakpoints::SetBreakpointsArgs),
    SetExceptionBreakpoints(Vec<String>),
    Threads,
    StackTrace(inspection::StackTraceArgs),
    Scopes,
    Variables(inspection::VariablesArgs),
    ExceptionInfo,
    SetAmplitude(set_variable::AmplitudeChange),
    SetBit(set_variable::BitChange),
    Execute(Execution),
}

impl Command {
    /// Parse a request. `None` means the command is not supported at all.
    pub fn parse(command: &str, arguments: &Value) -> Option<Result<Command, ValidationError>> {
        let result = match command {
            "initialize" => lifecycle::InitializeArgs::parse(arguments).map(Command::Initialize),
            "launch" => LaunchArgs::parse(arguments).map(Command::Launch),
            "restart" => LaunchArgs::parse_restart(arguments).map(Command::Restart),
            "configurationDone" => Ok(Command::ConfigurationDone),
            "disconnect" => Ok(Command::Disconnect),
            "terminate" => Ok(Command::Terminate),
            "setBreakpoints" => {
                breakpoints::SetBreakpointsArgs::parse(arguments).map(Command::SetBreakpoints)
            }
            "setExceptionBreakpoints" => {
                breakpoints::parse_exception_filters(arguments).map(Command::SetExceptionBreakpoints)
            }
            "threads" => Ok(Command::Threads),
            "stackTrace" => inspection::StackTraceArgs::parse(arguments).map(Command::StackTrace),
            "scopes" => Ok(Command::Scopes),
            "variables" => inspection::VariablesArgs::parse(arguments).map(Command::Variables),
            "exceptionInfo" => Ok(Command::ExceptionInfo),
            "setVariable" => set_variable::parse(arguments),
            other => Execution::from_command(other)
                .map(|execution| execution.parse(arguments).map(Command::Execute))?,
        };
        Some(result)
    }

    pub fn handle(&self, state: &mut SessionState) -> HandleResult {
        if self.requires_program() {
            state.require_program()?;
        }
        match self {
            Command::Initialize(args) => args.handle(state),
            Command::Launch(args) | Command::Restart(args) => args.handle(state),
            Command::ConfigurationDone | Command::Disconnect => Ok(None),
            Command::Terminate => lifecycle::terminate(state),
            Command::SetBreakpoints(args) => args.handle(state),
            Command::SetExceptionBreakpoints(filters) => {
                breakpoints::set_exception_filters(state, filters)
            }
            Command::Threads => inspection::threads(),
            Command::StackTrace(args) => args.handle(state),
            Command::Scopes => inspection::scopes(state),
            Command::Variables(args) => args.handle(state),
            Command::ExceptionInfo => inspection::exception_info(state),
            Command::SetAmplitude(change) => change.handle(state),
            Command::SetBit(change) => change.handle(state),
            Command::Execute(execution) => execution.handle(state),
        }
    }

    fn requires_program(&self) -> bool {
        !matches!(
            self,
            Command::Initialize(_)
                | Command::Launch(_)
                | Command::Restart(_)
                | Command::ConfigurationDone
                | Command::Disconnect
                | Command::Terminate
                | Command::SetExceptionBreakpoints(_)
                | Command::Threads
        )
    }

    /// Commands after which a pending `exited` event may be sent again.
    pub fn clears_exit_suppression(&self) -> bool {
        matches!(
            self,
            Command::Execute(_) | Command::Launch(_) | Command::Restart(_) | Command::Terminate
        )
    }

    pub fn launch_args(&self) -> Option<&LaunchArgs> {
        match self {
            Command::Launch(args) | Command::Restart(args) => Some(args),
            _ => None,
        }
    }

    pub fn execution(&self) -> Option<Execution> {
        match self {
            Command::Execute(execution) => Some(*execution),
            _ => None,
        }
    }
}

fn optional_bool(args: &Value, key: &str) -> Result<Option<bool>, ValidationError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ValidationError::new(format!(
            "The '{key}' argument must be a boolean."
        ))),
    }
}

fn optional_int(args: &Value, key: &str) -> Result<Option<i64>, ValidationError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            ValidationError::new(format!("The '{key}' argument must be an integer."))
        }),
    }
}

fn optional_index(args: &Value, key: &str) -> Result<Option<usize>, ValidationError> {
    optional_int(args, key)?
        .map(|v| {
            usize::try_from(v).map_err(|_| {
                ValidationError::new(format!("The '{key}' argument must not be negative."))
            })
        })
        .transpose()
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ValidationError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::new(format!(
            "The '{key}' argument must be a string."
        ))),
    }
}

/// `"True"`/`"False"`, the spelling clients of this adapter display.
fn bool_text(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
