//! Tracepoint Collect - compile tracepoint actions into agent packets
//!
//! A tracepoint records data without stopping the program. This crate turns
//! a tracepoint's action list into collection lists (registers, memory
//! ranges, verified agent expressions) and serializes each list into the
//! bounded packets a remote collection agent expects.
//!
//! # Overview
//!
//! * [`encode_actions`] lowers `collect`, `teval` and `while-stepping`
//!   actions, using a [`SymbolResolver`] and an [`ExprCompiler`] supplied by
//!   the debugger.
//! * [`finalize`] runs the static analyzer over every agent expression and
//!   rejects those the agent cannot run.
//! * [`CollectionList::stringify`] produces the wire packets: `L`, `R<mask>`,
//!   `M<kind>,<start>,<len>` and `X<len>,<bytes>`.
//!
//! # Usage
//!
//! ```
//! use tracepoint_collect::{CollectionList, RangeKind, TargetDescription};
//!
//! let target = TargetDescription::uniform(32, 4);
//! let mut list = CollectionList::for_target(&target);
//! list.add_remote_register(0).unwrap();
//! list.add_memrange(&target, RangeKind::Register(29), 8, 4).unwrap();
//! list.finish();
//!
//! assert_eq!(list.stringify(), vec!["R20000001", "M1D,8,4"]);
//! ```

pub mod actions;
pub mod collection;
pub mod error;
pub mod finalize;
pub mod memrange;
pub mod packet;
pub mod symbol;
pub mod target;

pub use actions::{encode_actions, encode_actions_rsp, Action, Diagnostic, EncodedActions, Tracepoint};
pub use collection::CollectionList;
pub use error::{CompileError, Complexity, Malformation, Result};
pub use finalize::{finalize, VerifiedExpr, MAX_AGENT_EXPR_LEN, MAX_STACK_HEIGHT};
pub use memrange::{merge_ranges, MemRange, RangeKind};
pub use packet::PacketBuilder;
pub use symbol::{Classified, ExprCompiler, StorageClass, Symbol, SymbolResolver, TypeCode};
pub use target::{EncodeConfig, PseudoRegister, RegisterDesc, TargetDescription};

/// A process-wide trace state variable
///
/// Collected through agent expressions (`getv`/`tracev`), never by direct
/// primitives.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TraceStateVariable {
    pub name: String,
    pub number: u32,
    pub initial_value: i64,
}
