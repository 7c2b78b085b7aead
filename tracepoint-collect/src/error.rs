//! Errors raised while compiling tracepoint actions

use agent_expr::Flaw;
use thiserror::Error;

/// Result type for collection-list operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Why a program was judged malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformation {
    #[error("{0}")]
    Flaw(Flaw),
    #[error("stack underflow, minimum height {0}")]
    Underflow(i32),
}

/// Which budget a program exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Complexity {
    #[error("{len} bytes of bytecode")]
    Length { len: usize },
    #[error("stack depth {max_height}")]
    Height { max_height: i32 },
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// The code generator produced a broken program
    #[error("internal error: expression is malformed: {0}")]
    Malformed(Malformation),

    /// The expression does not fit the agent's limits
    #[error("Expression is too complicated ({0}).")]
    TooComplex(Complexity),

    /// A register index past the collection mask width
    #[error("remote register {index} does not fit a {width}-bit register mask")]
    Configuration { index: u32, width: u32 },

    /// A range whose end does not fit a 64-bit address
    #[error("range of {len} bytes at {base:#x} overflows the address space")]
    RangeOverflow { base: i64, len: u64 },

    /// An architecture register with no remote number
    #[error("register {0} is not available to the remote agent")]
    UnknownRegister(u32),

    /// A collect or eval action with nothing to do
    #[error("empty expression in '{0}' action")]
    EmptyExpression(&'static str),

    /// A condition the surrounding command grammar should have ruled out
    #[error("internal error: {0}")]
    InvariantViolation(&'static str),

    /// Failure inside symbol lookup or code generation
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl CompileError {
    /// Whether the error points at a defect rather than bad user input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CompileError::Malformed(_)
                | CompileError::Configuration { .. }
                | CompileError::InvariantViolation(_)
        )
    }
}
