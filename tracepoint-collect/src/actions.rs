//! Lowering of tracepoint actions into collection lists
//!
//! Each collect expression is lowered to the cheapest primitive that
//! captures it: a register bit, a memory range, or as a last resort an
//! agent expression from the code generator.

use crate::collection::CollectionList;
use crate::error::{CompileError, Result};
use crate::finalize::finalize;
use crate::memrange::RangeKind;
use crate::symbol::{Classified, ExprCompiler, StorageClass, Symbol, SymbolResolver, TypeCode};
use crate::target::{EncodeConfig, TargetDescription};
use serde::{Deserialize, Serialize};

/// One line of a tracepoint's action list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Comma-separated expressions to record
    Collect(String),
    /// Comma-separated expressions to evaluate without recording
    Eval(String),
    /// Actions run at each of `steps` single steps after the hit
    WhileStepping { steps: u32, actions: Vec<Action> },
    End,
}

/// A tracepoint location and its actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracepoint {
    pub number: u32,
    pub address: u64,
    pub actions: Vec<Action>,
}

/// Why something named in a collect action was left out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Constant { name: String, value: i64 },
    OptimizedOut { name: String },
    RefArg { name: String },
    NoArgs,
    NoLocals,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Constant { name, value } => {
                write!(f, "constant {} (value {}) will not be collected.", name, value)
            }
            Diagnostic::OptimizedOut { name } => {
                write!(f, "{} has been optimized out of existence.", name)
            }
            Diagnostic::RefArg { name } => {
                write!(f, "{} is passed by reference and will not be collected.", name)
            }
            Diagnostic::NoArgs => f.write_str("No args."),
            Diagnostic::NoLocals => f.write_str("No locals."),
        }
    }
}

/// Both collection lists of a tracepoint, finished and ready to stringify
#[derive(Debug, Clone)]
pub struct EncodedActions {
    /// What to collect when the tracepoint is hit
    pub tracepoint: CollectionList,
    /// What to collect at each while-stepping step
    pub stepping: CollectionList,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile all actions of `tp`, including the configured default-collect
/// expressions, into finished collection lists
pub fn encode_actions<R, C>(
    tp: &Tracepoint,
    target: &TargetDescription,
    resolver: &R,
    compiler: &C,
    config: &EncodeConfig,
) -> Result<EncodedActions>
where
    R: SymbolResolver,
    C: ExprCompiler,
{
    tracing::info!(
        "Encoding {} actions for tracepoint {} at {:#x}",
        tp.actions.len(),
        tp.number,
        tp.address
    );

    let (frame_reg, frame_offset) = resolver.virtual_frame_pointer(tp.address)?;
    let mut encoder = ActionEncoder {
        target,
        resolver,
        compiler,
        scope: tp.address,
        frame_reg,
        frame_offset,
        diagnostics: Vec::new(),
    };

    let mut tracepoint = CollectionList::for_target(target);
    let mut stepping = CollectionList::for_target(target);

    if let Some(default_collect) = config.default_collect.as_deref() {
        if !default_collect.trim().is_empty() {
            let defaults = [Action::Collect(default_collect.to_string())];
            encoder.encode_list(&defaults, &mut tracepoint, Some(&mut stepping))?;
        }
    }
    encoder.encode_list(&tp.actions, &mut tracepoint, Some(&mut stepping))?;

    tracepoint.finish();
    stepping.finish();

    for diagnostic in &encoder.diagnostics {
        tracing::warn!("{}", diagnostic);
    }
    Ok(EncodedActions {
        tracepoint,
        stepping,
        diagnostics: encoder.diagnostics,
    })
}

/// Compile and stringify: returns the hit-time packets and the
/// while-stepping packets
pub fn encode_actions_rsp<R, C>(
    tp: &Tracepoint,
    target: &TargetDescription,
    resolver: &R,
    compiler: &C,
    config: &EncodeConfig,
) -> Result<(Vec<String>, Vec<String>)>
where
    R: SymbolResolver,
    C: ExprCompiler,
{
    let encoded = encode_actions(tp, target, resolver, compiler, config)?;
    let tdp_actions = encoded.tracepoint.stringify();
    let stepping_actions = encoded.stepping.stringify();
    tracing::info!(
        "Tracepoint {}: {} action packets, {} stepping packets",
        tp.number,
        tdp_actions.len(),
        stepping_actions.len()
    );
    Ok((tdp_actions, stepping_actions))
}

struct ActionEncoder<'a, R, C> {
    target: &'a TargetDescription,
    resolver: &'a R,
    compiler: &'a C,
    scope: u64,
    frame_reg: u32,
    frame_offset: i64,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, R: SymbolResolver, C: ExprCompiler> ActionEncoder<'a, R, C> {
    fn encode_list(
        &mut self,
        actions: &[Action],
        collect: &mut CollectionList,
        mut stepping: Option<&mut CollectionList>,
    ) -> Result<()> {
        for action in actions {
            match action {
                Action::Collect(text) => {
                    for exp in split_expressions(text, "collect")? {
                        self.encode_collect(exp, collect)?;
                    }
                }
                Action::Eval(text) => {
                    for exp in split_expressions(text, "teval")? {
                        let aexpr = finalize(self.compiler.compile_eval(exp, self.scope)?)?;
                        // Not collected, but the agent still has to run it.
                        collect.add_aexpr(aexpr);
                    }
                }
                Action::WhileStepping { steps, actions } => {
                    let Some(stepping) = stepping.as_deref_mut() else {
                        return Err(CompileError::InvariantViolation("nested while-stepping"));
                    };
                    tracing::debug!("while-stepping {} steps", steps);
                    self.encode_list(actions, stepping, None)?;
                }
                Action::End => break,
            }
        }
        Ok(())
    }

    fn encode_collect(&mut self, exp: &str, collect: &mut CollectionList) -> Result<()> {
        if exp.eq_ignore_ascii_case("$reg") {
            for regno in 0..self.target.num_regs() {
                // Registers without a remote number cannot be collected.
                if let Some(remote) = self.target.remote_register_number(regno) {
                    collect.add_remote_register(remote)?;
                }
            }
        } else if exp.eq_ignore_ascii_case("$arg") {
            let args = self.resolver.args(self.scope)?;
            self.add_local_symbols(&args, Diagnostic::NoArgs, collect)?;
        } else if exp.eq_ignore_ascii_case("$loc") {
            let locals = self.resolver.locals(self.scope)?;
            self.add_local_symbols(&locals, Diagnostic::NoLocals, collect)?;
        } else if exp.eq_ignore_ascii_case("$_ret") {
            let aexpr = finalize(self.compiler.compile_return_address(self.scope)?)?;
            collect.add_ax_registers(&aexpr)?;
            collect.add_aexpr(aexpr);
        } else if exp.eq_ignore_ascii_case("$_sdata") {
            collect.add_static_trace_data();
        } else {
            match self.resolver.classify(exp, self.scope)? {
                Classified::Register(regno) => collect.add_local_register(self.target, regno)?,
                Classified::Variable(sym) => {
                    if self.collect_symbol(&sym, collect)? {
                        collect.add_wholly_collected(sym.name);
                    }
                }
                Classified::Expression => {
                    let aexpr = finalize(self.compiler.compile_expression(exp, self.scope)?)?;
                    collect.add_ax_registers(&aexpr)?;
                    collect.add_aexpr(aexpr);
                    collect.append_exp(exp);
                }
            }
        }
        Ok(())
    }

    fn add_local_symbols(
        &mut self,
        symbols: &[Symbol],
        none_found: Diagnostic,
        collect: &mut CollectionList,
    ) -> Result<()> {
        if symbols.is_empty() {
            self.diagnostics.push(none_found);
            return Ok(());
        }
        for sym in symbols {
            if self.collect_symbol(sym, collect)? {
                collect.add_wholly_collected(sym.name.clone());
            }
        }
        Ok(())
    }

    /// Lower one variable; returns whether anything was collected
    fn collect_symbol(&mut self, sym: &Symbol, collect: &mut CollectionList) -> Result<bool> {
        let target = self.target;
        let treat_as_expr = match sym.class {
            StorageClass::Constant(value) => {
                self.skip(Diagnostic::Constant {
                    name: sym.name.clone(),
                    value,
                });
                return Ok(false);
            }
            StorageClass::OptimizedOut => {
                self.skip(Diagnostic::OptimizedOut {
                    name: sym.name.clone(),
                });
                return Ok(false);
            }
            StorageClass::RefArg => {
                self.skip(Diagnostic::RefArg {
                    name: sym.name.clone(),
                });
                return Ok(false);
            }
            // Records may have static members outside this range.
            StorageClass::Static(_) if sym.type_code == TypeCode::Record => true,
            StorageClass::Static(addr) => {
                tracing::debug!("static {}: collect {} bytes at {:#x}", sym.name, sym.size, addr);
                collect.add_memrange(target, RangeKind::Absolute, addr as i64, sym.size)?;
                false
            }
            StorageClass::Register(regno) => {
                tracing::debug!("register variable {}: collect register {}", sym.name, regno);
                collect.add_local_register(target, regno)?;
                // A double may span two registers.
                let reg_size = target.register_size(regno).unwrap_or(0) as u64;
                if sym.type_code == TypeCode::Float && sym.size > reg_size {
                    collect.add_local_register(target, regno + 1)?;
                }
                false
            }
            StorageClass::FrameRelative(offset) => {
                let base = self.frame_offset.checked_add(offset).ok_or(
                    CompileError::RangeOverflow {
                        base: offset,
                        len: sym.size,
                    },
                )?;
                tracing::debug!(
                    "frame variable {}: collect {} bytes at offset {} from frame register {}",
                    sym.name,
                    sym.size,
                    base,
                    self.frame_reg
                );
                collect.add_memrange(target, RangeKind::Register(self.frame_reg), base, sym.size)?;
                false
            }
            StorageClass::RegisterParamAddr(regno) => {
                collect.add_memrange(target, RangeKind::Register(regno), 0, sym.size)?;
                false
            }
            StorageClass::Computed | StorageClass::Unresolved => true,
        };

        if treat_as_expr {
            let Some(aexpr) = self.compiler.compile_variable(sym, self.scope)? else {
                self.skip(Diagnostic::OptimizedOut {
                    name: sym.name.clone(),
                });
                return Ok(false);
            };
            let aexpr = finalize(aexpr)?;
            collect.add_ax_registers(&aexpr)?;
            collect.add_aexpr(aexpr);
        }
        Ok(true)
    }

    fn skip(&mut self, diagnostic: Diagnostic) {
        tracing::debug!("skipping: {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

/// Split an action's argument at top-level commas
fn split_expressions<'t>(text: &'t str, action: &'static str) -> Result<Vec<&'t str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);

    let parts: Vec<&str> = parts.into_iter().map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(CompileError::EmptyExpression(action));
    }
    Ok(parts)
}
