//! Interfaces to the debugger's symbol tables and code generator
//!
//! The action encoder never parses source expressions itself. It asks a
//! [`SymbolResolver`] what an expression denotes and a [`ExprCompiler`] for
//! bytecode when no direct primitive fits.

use agent_expr::AgentExpr;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Where a variable lives at the tracepoint's address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// Held in an architecture register
    Register(u32),
    /// Fixed address
    Static(u64),
    /// Offset from the frame base
    FrameRelative(i64),
    /// The register holds the variable's address
    RegisterParamAddr(u32),
    /// Location needs a computed expression
    Computed,
    /// Symbol known only by name, resolved at run time
    Unresolved,
    /// Compile-time constant
    Constant(i64),
    OptimizedOut,
    /// Argument passed by reference
    RefArg,
}

/// Broad shape of a variable's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCode {
    Scalar,
    Float,
    /// struct, union or class; may carry static members elsewhere in memory
    Record,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub class: StorageClass,
    /// Size of the type in bytes
    pub size: u64,
    pub type_code: TypeCode,
}

impl Symbol {
    pub fn new(name: impl Into<String>, class: StorageClass, size: u64) -> Self {
        Self {
            name: name.into(),
            class,
            size,
            type_code: TypeCode::Scalar,
        }
    }

    pub fn with_type(mut self, type_code: TypeCode) -> Self {
        self.type_code = type_code;
        self
    }
}

/// What a single collect expression denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A bare register, by architecture number
    Register(u32),
    /// A bare variable
    Variable(Symbol),
    /// Anything else; needs bytecode
    Expression,
}

/// Symbol lookup at a code address
pub trait SymbolResolver {
    /// Classify the expression `expr` as seen from `scope`
    fn classify(&self, expr: &str, scope: u64) -> Result<Classified>;

    /// Arguments of the function containing `scope`
    fn args(&self, scope: u64) -> Result<Vec<Symbol>>;

    /// Locals visible at `scope`
    fn locals(&self, scope: u64) -> Result<Vec<Symbol>>;

    /// Frame base register and offset used for frame-relative variables
    fn virtual_frame_pointer(&self, scope: u64) -> Result<(u32, i64)>;
}

/// Bytecode generation for expressions the encoder cannot lower itself
pub trait ExprCompiler {
    /// Code that records the memory the expression reads
    fn compile_expression(&self, expr: &str, scope: u64) -> Result<AgentExpr>;

    /// Code that evaluates the expression for its side effects only
    fn compile_eval(&self, expr: &str, scope: u64) -> Result<AgentExpr>;

    /// Code that records a variable with a computed location; `None` when
    /// the variable has no location at `scope`
    fn compile_variable(&self, symbol: &Symbol, scope: u64) -> Result<Option<AgentExpr>>;

    /// Code that records the current function's return address
    fn compile_return_address(&self, scope: u64) -> Result<AgentExpr>;
}
