//! Agent expression buffers and the emitter used by code generators

use crate::op::Op;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Sentinel left in unpatched jump operands
const UNPATCHED: u16 = 0xffff;

/// Errors raised while emitting bytecode
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    /// An immediate operand does not fit the op's operand field
    #[error("operand {value} out of range for {op}")]
    OperandOutOfRange { op: Op, value: i64 },
    /// A jump target does not fit in 16 bits
    #[error("label target {0} out of range")]
    LabelOutOfRange(usize),
    /// `label` was given an offset that is not a jump operand
    #[error("no jump operand at offset {0}")]
    BadPatch(usize),
}

/// An agent expression: raw bytecode plus the registers it needs
///
/// The register set is filled by whoever generates the code. It may hold
/// registers the emitted bytes never read, e.g. ones the source expression
/// referenced before an optimization dropped them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentExpr {
    /// Program counter the expression was compiled for
    pub scope: u64,
    /// Bytecode, in execution order
    pub bytes: Vec<u8>,
    /// Machine registers the expression may read
    pub reg_mask: BTreeSet<u32>,
}

impl AgentExpr {
    /// Create an empty expression for the given scope
    pub fn new(scope: u64) -> Self {
        Self {
            scope,
            bytes: Vec::new(),
            reg_mask: BTreeSet::new(),
        }
    }

    /// Wrap already generated bytes
    pub fn from_bytes(scope: u64, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            scope,
            bytes: bytes.into(),
            reg_mask: BTreeSet::new(),
        }
    }

    /// Length of the bytecode in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex rendering of the bytecode
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Record that the expression needs `reg`
    pub fn mark_register(&mut self, reg: u32) {
        self.reg_mask.insert(reg);
    }

    /// Append an operand-less op
    pub fn simple(&mut self, op: Op) -> &mut Self {
        self.bytes.push(op as u8);
        self
    }

    /// Append `pick depth`
    pub fn pick(&mut self, depth: u32) -> Result<&mut Self, EmitError> {
        self.byte_operand(Op::Pick, depth as i64)
    }

    /// Sign-extend the top of stack from `bits` bits
    pub fn ext(&mut self, bits: u32) -> Result<&mut Self, EmitError> {
        self.byte_operand(Op::Ext, bits as i64)
    }

    /// Zero-extend the top of stack from `bits` bits
    pub fn zero_ext(&mut self, bits: u32) -> Result<&mut Self, EmitError> {
        self.byte_operand(Op::ZeroExt, bits as i64)
    }

    /// Record `n` bytes starting at the address on top of the stack
    pub fn trace_quick(&mut self, n: u32) -> Result<&mut Self, EmitError> {
        self.byte_operand(Op::TraceQuick, n as i64)
    }

    /// Like `trace_quick`, with a 16-bit length
    pub fn trace16(&mut self, n: u32) -> Result<&mut Self, EmitError> {
        self.word_operand(Op::Trace16, n as i64)
    }

    /// Push a constant using the narrowest encoding that reproduces it
    pub fn const_l(&mut self, value: i64) -> &mut Self {
        let (op, size) = [(Op::Const8, 8u32), (Op::Const16, 16), (Op::Const32, 32)]
            .into_iter()
            .find(|&(_, size)| {
                let lim = 1i64 << (size - 1);
                -lim <= value && value < lim
            })
            .unwrap_or((Op::Const64, 64));

        self.bytes.push(op as u8);
        let be = value.to_be_bytes();
        self.bytes.extend_from_slice(&be[be.len() - (size / 8) as usize..]);

        // The constant ops zero-extend, so negative narrow values need a fixup.
        if value < 0 && size < 64 {
            self.bytes.extend_from_slice(&[Op::Ext as u8, size as u8]);
        }
        self
    }

    /// Push the value of machine register `reg`
    pub fn reg(&mut self, reg: u32) -> Result<&mut Self, EmitError> {
        self.word_operand(Op::Reg, reg as i64)?;
        self.mark_register(reg);
        Ok(self)
    }

    /// Push the value of a trace state variable
    pub fn getv(&mut self, tsv: u32) -> Result<&mut Self, EmitError> {
        self.word_operand(Op::Getv, tsv as i64)
    }

    /// Store the top of stack into a trace state variable
    pub fn setv(&mut self, tsv: u32) -> Result<&mut Self, EmitError> {
        self.word_operand(Op::Setv, tsv as i64)
    }

    /// Record the value of a trace state variable
    pub fn tracev(&mut self, tsv: u32) -> Result<&mut Self, EmitError> {
        self.word_operand(Op::Tracev, tsv as i64)
    }

    /// Append an unpatched jump and return the offset of its operand
    pub fn goto(&mut self, op: Op) -> usize {
        debug_assert!(op.is_jump(), "{} is not a jump", op);
        self.bytes.push(op as u8);
        self.bytes.extend_from_slice(&UNPATCHED.to_be_bytes());
        self.bytes.len() - 2
    }

    /// Point the jump whose operand sits at `patch` to `target`
    pub fn label(&mut self, patch: usize, target: usize) -> Result<(), EmitError> {
        if target >= UNPATCHED as usize {
            return Err(EmitError::LabelOutOfRange(target));
        }
        let is_jump = patch
            .checked_sub(1)
            .and_then(|at| self.bytes.get(at))
            .and_then(|&b| Op::from_byte(b))
            .is_some_and(Op::is_jump);
        if !is_jump || patch + 2 > self.bytes.len() {
            return Err(EmitError::BadPatch(patch));
        }
        self.bytes[patch..patch + 2].copy_from_slice(&(target as u16).to_be_bytes());
        Ok(())
    }

    /// Render one instruction per line, for log output
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < self.bytes.len() {
            let Some(op) = Op::from_byte(self.bytes[i]) else {
                out.push_str(&format!("{:4}  <bad opcode {:02x}>\n", i, self.bytes[i]));
                break;
            };
            let size = op.info().op_size;
            let operand = self.bytes.get(i + 1..i + 1 + size);
            match operand {
                Some([]) => out.push_str(&format!("{:4}  {}\n", i, op)),
                Some(raw) => {
                    let value = raw.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                    out.push_str(&format!("{:4}  {} {}\n", i, op, value));
                }
                None => {
                    out.push_str(&format!("{:4}  {} <truncated>\n", i, op));
                    break;
                }
            }
            i += 1 + size;
        }
        out
    }

    fn byte_operand(&mut self, op: Op, value: i64) -> Result<&mut Self, EmitError> {
        let n = u8::try_from(value).map_err(|_| EmitError::OperandOutOfRange { op, value })?;
        self.bytes.extend_from_slice(&[op as u8, n]);
        Ok(self)
    }

    fn word_operand(&mut self, op: Op, value: i64) -> Result<&mut Self, EmitError> {
        let n = u16::try_from(value).map_err(|_| EmitError::OperandOutOfRange { op, value })?;
        self.bytes.push(op as u8);
        self.bytes.extend_from_slice(&n.to_be_bytes());
        Ok(self)
    }
}
