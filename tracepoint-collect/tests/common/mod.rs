//! Stand-ins for the debugger's symbol tables and code generator

#![allow(dead_code)]

use agent_expr::{AgentExpr, Op};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use tracepoint_collect::{
    Classified, ExprCompiler, Symbol, SymbolResolver, TargetDescription, TraceStateVariable,
};

/// Register used as the frame base
pub const FRAME_REG: u32 = 29;
/// Register holding the return address
pub const LINK_REG: u32 = 31;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 32 four-byte registers `r0..r31`, remote numbers equal to their index
pub fn target() -> TargetDescription {
    TargetDescription::uniform(32, 4)
}

#[derive(Default)]
pub struct FakeSymbols {
    pub target: TargetDescription,
    pub symbols: HashMap<String, Symbol>,
    pub args: Vec<Symbol>,
    pub locals: Vec<Symbol>,
    pub frame_offset: i64,
}

impl FakeSymbols {
    pub fn new() -> Self {
        Self {
            target: target(),
            ..Self::default()
        }
    }

    pub fn with_symbol(mut self, sym: Symbol) -> Self {
        self.symbols.insert(sym.name.clone(), sym);
        self
    }

    pub fn with_local(mut self, sym: Symbol) -> Self {
        self.locals.push(sym.clone());
        self.with_symbol(sym)
    }

    pub fn with_arg(mut self, sym: Symbol) -> Self {
        self.args.push(sym.clone());
        self.with_symbol(sym)
    }
}

impl SymbolResolver for FakeSymbols {
    fn classify(&self, expr: &str, _scope: u64) -> Result<Classified> {
        if let Some(name) = expr.strip_prefix('$') {
            if let Some(regno) = self.target.register_by_name(name) {
                return Ok(Classified::Register(regno));
            }
            return Ok(Classified::Expression);
        }
        if let Some(sym) = self.symbols.get(expr) {
            return Ok(Classified::Variable(sym.clone()));
        }
        if expr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("No symbol \"{}\" in current context.", expr);
        }
        Ok(Classified::Expression)
    }

    fn args(&self, _scope: u64) -> Result<Vec<Symbol>> {
        Ok(self.args.clone())
    }

    fn locals(&self, _scope: u64) -> Result<Vec<Symbol>> {
        Ok(self.locals.clone())
    }

    fn virtual_frame_pointer(&self, _scope: u64) -> Result<(u32, i64)> {
        Ok((FRAME_REG, self.frame_offset))
    }
}

#[derive(Default)]
pub struct FakeCompiler {
    pub tsvs: Vec<TraceStateVariable>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tsv(mut self, name: &str, number: u32) -> Self {
        self.tsvs.push(TraceStateVariable {
            name: name.to_string(),
            number,
            initial_value: 0,
        });
        self
    }

    fn tsv(&self, name: &str) -> Option<&TraceStateVariable> {
        self.tsvs.iter().find(|t| t.name == name)
    }
}

/// `*(int*)ADDR` with ADDR in hex
fn deref_address(expr: &str) -> Option<i64> {
    let hex = expr.strip_prefix("*(int*)0x")?;
    i64::from_str_radix(hex, 16).ok()
}

impl ExprCompiler for FakeCompiler {
    fn compile_expression(&self, expr: &str, scope: u64) -> Result<AgentExpr> {
        let mut ax = AgentExpr::new(scope);
        if let Some(addr) = deref_address(expr) {
            ax.const_l(addr);
            ax.trace_quick(4)?;
            ax.simple(Op::Ref32);
        } else if let Some(tsv) = expr.strip_prefix('$').and_then(|n| self.tsv(n)) {
            ax.getv(tsv.number)?;
            ax.tracev(tsv.number)?;
        } else if expr == "huge()" {
            ax.const_l(0);
            for _ in 0..100 {
                ax.simple(Op::LogNot);
            }
        } else if expr == "deep()" {
            for n in 0..21 {
                ax.const_l(n);
            }
        } else if expr == "broken()" {
            ax.simple(Op::Add);
        } else if expr == "elided()" {
            // Register 12 was read by the source but folded away.
            ax.const_l(0);
            ax.mark_register(12);
        } else {
            return Err(anyhow!("cannot compile '{}'", expr));
        }
        ax.simple(Op::End);
        Ok(ax)
    }

    fn compile_eval(&self, expr: &str, scope: u64) -> Result<AgentExpr> {
        let name = expr
            .strip_prefix('$')
            .and_then(|rest| rest.strip_suffix("++"))
            .ok_or_else(|| anyhow!("cannot evaluate '{}'", expr))?;
        let tsv = self
            .tsv(name)
            .ok_or_else(|| anyhow!("no trace state variable ${}", name))?;

        let mut ax = AgentExpr::new(scope);
        ax.getv(tsv.number)?;
        ax.const_l(1).simple(Op::Add);
        ax.setv(tsv.number)?;
        ax.simple(Op::Pop).simple(Op::End);
        Ok(ax)
    }

    fn compile_variable(&self, symbol: &Symbol, scope: u64) -> Result<Option<AgentExpr>> {
        if symbol.name.starts_with("gone") {
            return Ok(None);
        }
        // Stand-in location: 16 bytes past r6
        let mut ax = AgentExpr::new(scope);
        ax.reg(6)?;
        ax.const_l(16).simple(Op::Add);
        ax.trace_quick(symbol.size as u32)?;
        ax.simple(Op::End);
        Ok(Some(ax))
    }

    fn compile_return_address(&self, scope: u64) -> Result<AgentExpr> {
        let mut ax = AgentExpr::new(scope);
        ax.reg(LINK_REG)?;
        ax.simple(Op::End);
        Ok(ax)
    }
}
