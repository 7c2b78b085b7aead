//! Static analysis of agent expressions
//!
//! Computes stack-height bounds and detects structural flaws without running
//! the expression. The result is a fresh [`Requirements`] value; the
//! expression itself is left untouched.

use crate::expr::AgentExpr;
use crate::op::Op;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Structural defect found by [`analyze`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Flaw {
    /// A byte that is not a known opcode
    #[error("bad instruction")]
    BadInstruction,
    /// An instruction whose operand runs past the end of the buffer
    #[error("incomplete instruction")]
    IncompleteInstruction,
    /// A jump outside the buffer or into the middle of an instruction
    #[error("bad jump target")]
    BadJumpTarget,
    /// Two paths reach the same point with different stack heights
    #[error("stack height mismatch")]
    HeightMismatch,
    /// Code after an unconditional jump that no jump reaches
    #[error("unreachable code")]
    UnreachableCode,
}

/// What an expression needs from the agent, as predicted statically
///
/// Heights are relative to the stack depth on entry. When `flaw` is set the
/// remaining fields describe only the prefix scanned before the flaw.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirements {
    pub flaw: Option<Flaw>,
    pub min_height: i32,
    pub max_height: i32,
    pub final_height: i32,
    /// Widest value fetched or pushed, in bits
    pub max_data_size: u32,
    /// Registers read by `reg` ops, plus those the generator reported
    pub reg_mask: BTreeSet<u32>,
}

#[derive(Clone, Copy, Default)]
struct Slot {
    target: bool,
    boundary: bool,
    height: i32,
}

/// Analyze `expr` and report its requirements
pub fn analyze(expr: &AgentExpr) -> Requirements {
    let mut reqs = Requirements {
        reg_mask: expr.reg_mask.clone(),
        ..Requirements::default()
    };
    if let Err(flaw) = scan(&expr.bytes, &mut reqs) {
        tracing::debug!("agent expression flaw at scope {:#x}: {}", expr.scope, flaw);
        reqs.flaw = Some(flaw);
    }
    reqs
}

fn scan(bytes: &[u8], reqs: &mut Requirements) -> Result<(), Flaw> {
    let len = bytes.len();
    let mut slots = vec![Slot::default(); len];
    let mut height = 0i32;
    let mut i = 0;

    while i < len {
        let op = Op::from_byte(bytes[i]).ok_or(Flaw::BadInstruction)?;
        let info = op.info();
        if i + 1 + info.op_size > len {
            return Err(Flaw::IncompleteInstruction);
        }

        // A forward jump landing here must agree on the height.
        if slots[i].target && slots[i].height != height {
            return Err(Flaw::HeightMismatch);
        }
        slots[i].boundary = true;
        slots[i].height = height;

        height -= info.consumed;
        reqs.min_height = reqs.min_height.min(height);
        height += info.produced;
        reqs.max_height = reqs.max_height.max(height);
        reqs.max_data_size = reqs.max_data_size.max(info.data_size);

        if op.is_jump() {
            let target = read_u16(bytes, i + 1) as usize;
            if target >= len {
                return Err(Flaw::BadJumpTarget);
            }
            let slot = &mut slots[target];
            if (slot.target || slot.boundary) && slot.height != height {
                return Err(Flaw::HeightMismatch);
            }
            slot.target = true;
            slot.height = height;
        }

        // Whatever follows an unconditional jump is only reachable by
        // another jump, which fixes its height.
        if op == Op::Goto && i + 3 < len {
            if !slots[i + 3].target {
                return Err(Flaw::UnreachableCode);
            }
            height = slots[i + 3].height;
        }

        if op == Op::Reg {
            reqs.reg_mask.insert(read_u16(bytes, i + 1) as u32);
        }

        i += 1 + info.op_size;
    }

    if slots.iter().any(|s| s.target && !s.boundary) {
        return Err(Flaw::BadJumpTarget);
    }
    reqs.final_height = height;
    Ok(())
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}
