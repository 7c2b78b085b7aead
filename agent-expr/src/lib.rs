//! Agent Expr - bytecode programs for remote data collection
//!
//! An agent expression is a small stack-machine program that a remote
//! collection agent runs each time a tracepoint fires. This crate holds the
//! program representation, an emitter for code generators, and the static
//! analyzer that predicts what a program needs before it is shipped.
//!
//! # Usage
//!
//! ```
//! use agent_expr::{analyze, AgentExpr, Op};
//!
//! // Collect four bytes at (r6 + 8)
//! let mut ax = AgentExpr::new(0x401000);
//! ax.reg(6).unwrap();
//! ax.const_l(8).simple(Op::Add);
//! ax.trace_quick(4).unwrap();
//! ax.simple(Op::End);
//!
//! let reqs = analyze(&ax);
//! assert!(reqs.flaw.is_none());
//! assert_eq!(reqs.max_height, 2);
//! ```

pub mod analyze;
pub mod expr;
pub mod op;

pub use analyze::{analyze, Flaw, Requirements};
pub use expr::{AgentExpr, EmitError};
pub use op::{Op, OpInfo};
