//! Verification of agent expressions before they join a collection list

use crate::error::{CompileError, Complexity, Malformation, Result};
use agent_expr::{analyze, AgentExpr, Requirements};

/// Longest agent expression, in hex characters, that fits one packet
pub const MAX_AGENT_EXPR_LEN: usize = 184;

/// Deepest operand stack an expression may predict
pub const MAX_STACK_HEIGHT: i32 = 20;

/// An agent expression that passed [`finalize`]
///
/// Only `finalize` builds one, so holding a `VerifiedExpr` is proof the
/// checks ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedExpr {
    expr: AgentExpr,
    reqs: Requirements,
}

impl VerifiedExpr {
    pub fn expr(&self) -> &AgentExpr {
        &self.expr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.expr.bytes
    }

    pub fn requirements(&self) -> &Requirements {
        &self.reqs
    }
}

/// Analyze `expr` and accept it only if the agent can run it
pub fn finalize(expr: AgentExpr) -> Result<VerifiedExpr> {
    let reqs = analyze(&expr);

    if expr.len() * 2 > MAX_AGENT_EXPR_LEN {
        return Err(CompileError::TooComplex(Complexity::Length { len: expr.len() }));
    }
    if let Some(flaw) = reqs.flaw {
        return Err(CompileError::Malformed(Malformation::Flaw(flaw)));
    }
    if reqs.min_height < 0 {
        return Err(CompileError::Malformed(Malformation::Underflow(reqs.min_height)));
    }
    if reqs.max_height > MAX_STACK_HEIGHT {
        return Err(CompileError::TooComplex(Complexity::Height {
            max_height: reqs.max_height,
        }));
    }

    tracing::debug!(
        "accepted {}-byte agent expression, max height {}",
        expr.len(),
        reqs.max_height
    );
    Ok(VerifiedExpr { expr, reqs })
}
