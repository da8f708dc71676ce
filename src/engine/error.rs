/// Location of a parse failure, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsingErrorLocation {
    pub line: usize,
    pub column: usize,
    pub detail: String,
}

/// Program text could not be turned into instructions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParsingError {
    message: String,
    location: Option<ParsingErrorLocation>,
}

impl ParsingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(line: usize, column: usize, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            message: format!("<input>:{line}:{column}: {detail}"),
            location: Some(ParsingErrorLocation {
                line,
                column,
                detail,
            }),
        }
    }

    pub fn location(&self) -> Option<&ParsingErrorLocation> {
        self.location.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- program state ---------------------------------------------
    #[error("no program is loaded")]
    NoProgram,
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    #[error("cannot step {0}: {1}")]
    CannotStep(&'static str, &'static str),

    // --------------------------------- entity not found ------------------------------------------
    #[error("instruction {0} does not exist")]
    InvalidInstruction(usize),
    #[error("no instruction at or after position {0}")]
    NoInstructionAt(usize),
    #[error("classical variable `{0}` not found")]
    UnknownVariable(String),
    #[error("classical variable index {0} out of range")]
    VariableIndex(usize),

    // --------------------------------- state mutation --------------------------------------------
    #[error("invalid bitstring `{0}`: expected {1} binary digits")]
    InvalidBitstring(String, usize),
    #[error("classical variable `{0}` is not a boolean")]
    NotBoolean(String),
    #[error("amplitude magnitude {0} exceeds 1")]
    AmplitudeTooLarge(f64),
    #[error("the state vector cannot be renormalized around the new amplitude")]
    NotNormalizable,
}

pub type Result<T> = std::result::Result<T, Error>;
