use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::define_entity;
use crate::entity::PrimaryMap;
use crate::error::StructuralCheck;

define_entity!(VarId);

/// A local variable of the method being emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    /// Target-language type spelling (`int`, `float`, `ulong`, ...).
    pub ty: String,
}

/// Statement payload. Expressions are already lowered to target text; the
/// emitter only places statements, it never looks inside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stmt {
    /// `dst = expr;`
    Assign { dst: VarId, expr: String },
    /// `expr;`
    Expr { expr: String },
    /// Header of the block's two-way branch.
    If { cond: String },
    /// Header of the block's multi-way dispatch.
    Switch { value: String },
    Return {
        #[serde(default)]
        value: Option<String>,
    },
    /// First clause of a counted loop header.
    LoopInit { init: String },
    /// Continue-while condition of a loop.
    LoopCondition { cond: String },
    /// Third clause of a counted loop header.
    LoopPost { update: String },
    /// Leave the innermost loop.
    Break,
    /// Everything after this marker runs when the block's scope closes
    /// instead of inside it.
    RelocateMarker,
}

impl Stmt {
    /// The target-language text this statement carries, if any.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            Stmt::Assign { expr, .. } | Stmt::Expr { expr } => Some(expr),
            Stmt::If { cond } | Stmt::LoopCondition { cond } => Some(cond),
            Stmt::Switch { value } => Some(value),
            Stmt::Return { value } => value.as_mut(),
            Stmt::LoopInit { init } => Some(init),
            Stmt::LoopPost { update } => Some(update),
            Stmt::Break | Stmt::RelocateMarker => None,
        }
    }
}

/// One instruction of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inst {
    pub stmt: Stmt,
    /// Variables this statement reads.
    #[serde(default)]
    pub reads: Vec<VarId>,
    /// Set when a loop condition has been folded into its `for` header.
    #[serde(default)]
    pub header_clause: bool,
}

impl Inst {
    pub fn new(stmt: Stmt) -> Self {
        Inst {
            stmt,
            reads: Vec::new(),
            header_clause: false,
        }
    }

    pub fn with_reads(mut self, reads: &[VarId]) -> Self {
        self.reads = reads.to_vec();
        self
    }

    /// The variable this instruction assigns, if any.
    pub fn writes(&self) -> Option<VarId> {
        match self.stmt {
            Stmt::Assign { dst, .. } => Some(dst),
            _ => None,
        }
    }

    /// Render as a complete statement line.
    ///
    /// Returns `None` for instructions that only make sense as part of a
    /// scope header (`if`, `switch` and the loop clauses) and for relocation
    /// markers.
    pub fn render(&self, vars: &PrimaryMap<VarId, Var>) -> Result<Option<String>, StructuralCheck> {
        let mut out = String::new();
        match &self.stmt {
            Stmt::Assign { dst, expr } => {
                let var = vars.get(*dst).ok_or(StructuralCheck::UnknownVar(*dst))?;
                let _ = write!(out, "{} = {expr};", var.name);
            }
            Stmt::Expr { expr } => {
                let _ = write!(out, "{expr};");
            }
            Stmt::Return { value: Some(v) } => {
                let _ = write!(out, "return {v};");
            }
            Stmt::Return { value: None } => out.push_str("return;"),
            Stmt::Break => out.push_str("break;"),
            Stmt::If { .. }
            | Stmt::Switch { .. }
            | Stmt::LoopInit { .. }
            | Stmt::LoopCondition { .. }
            | Stmt::LoopPost { .. }
            | Stmt::RelocateMarker => return Ok(None),
        }
        Ok(Some(out))
    }
}
