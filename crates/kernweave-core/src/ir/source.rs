//! Plain JSON description of compilation units.
//!
//! Blocks are listed in id order (the first is the entry) with their
//! instructions and terminator only; every annotation is computed by the
//! [`GraphBuilder`] when the source is converted.

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::error::CoreError;

use super::block::{BlockId, CaseKey};
use super::builder::GraphBuilder;
use super::inst::{Inst, Var};
use super::method::{default_return_ty, CompilationUnit, Method, MethodKind, Param};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSource {
    pub name: String,
    pub methods: Vec<MethodSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSource {
    pub name: String,
    #[serde(default)]
    pub kind: MethodKind,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default = "default_return_ty")]
    pub return_ty: String,
    #[serde(default)]
    pub vars: Vec<Var>,
    pub blocks: Vec<BlockSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSource {
    #[serde(default)]
    pub insts: Vec<Inst>,
    pub end: EndSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndSource {
    Jump { target: u32 },
    Branch { on_true: u32, on_false: u32 },
    Switch { cases: Vec<CaseSource> },
    Return,
}

/// A switch arm; `key: null` is the default case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSource {
    pub key: Option<i64>,
    pub target: u32,
}

impl UnitSource {
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build and validate the graph of every method.
    pub fn into_unit(self) -> Result<CompilationUnit, CoreError> {
        let methods = self
            .methods
            .into_iter()
            .map(|m| {
                let name = m.name.clone();
                m.into_method().map_err(|e| e.in_method(name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompilationUnit {
            name: self.name,
            methods,
        })
    }
}

impl MethodSource {
    pub fn into_method(self) -> Result<Method, CoreError> {
        let mut gb = GraphBuilder::new();
        for var in &self.vars {
            gb.var(&var.name, &var.ty);
        }
        for _ in 1..self.blocks.len() {
            gb.create_block();
        }
        for (i, block) in self.blocks.into_iter().enumerate() {
            gb.switch_to_block(BlockId::new(i as u32));
            for inst in block.insts {
                gb.push(inst);
            }
            match block.end {
                EndSource::Jump { target } => gb.set_jump(BlockId::new(target)),
                EndSource::Branch { on_true, on_false } => {
                    gb.set_branch(BlockId::new(on_true), BlockId::new(on_false))
                }
                EndSource::Switch { cases } => {
                    let cases: Vec<(CaseKey, BlockId)> = cases
                        .iter()
                        .map(|c| {
                            let key = c.key.map_or(CaseKey::Default, CaseKey::Value);
                            (key, BlockId::new(c.target))
                        })
                        .collect();
                    gb.set_switch(&cases);
                }
                EndSource::Return => gb.set_return(),
            }
        }
        Ok(Method {
            name: self.name,
            kind: self.kind,
            params: self.params,
            return_ty: self.return_ty,
            graph: gb.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralCheck;

    const SAXPY: &str = r#"{
        "name": "saxpy",
        "methods": [{
            "name": "saxpy",
            "params": [
                {"name": "a", "ty": "float"},
                {"name": "x", "ty": "__global float *"},
                {"name": "n", "ty": "int"}
            ],
            "vars": [{"name": "i", "ty": "int"}],
            "blocks": [
                {"end": {"kind": "jump", "target": 1}},
                {"insts": [
                    {"stmt": {"op": "loop_init", "init": "i = 0"}},
                    {"stmt": {"op": "loop_post", "update": "i++"}},
                    {"stmt": {"op": "loop_condition", "cond": "i < n"}, "reads": [0]}
                 ],
                 "end": {"kind": "branch", "on_true": 3, "on_false": 2}},
                {"insts": [{"stmt": {"op": "expr", "expr": "x[i] *= a"}, "reads": [0]}],
                 "end": {"kind": "jump", "target": 1}},
                {"insts": [{"stmt": {"op": "return"}}], "end": {"kind": "return"}}
            ]
        }]
    }"#;

    #[test]
    fn parses_and_annotates_unit() {
        let unit = UnitSource::from_json(SAXPY).unwrap().into_unit().unwrap();
        assert_eq!(unit.name, "saxpy");
        let method = &unit.methods[0];
        assert_eq!(method.kind, MethodKind::Kernel);
        assert_eq!(method.return_ty, "void");
        assert_eq!(method.params.len(), 3);
        let header = BlockId::new(1);
        assert!(method.graph.block(header).is_loop_header);
        assert!(method.graph.block(BlockId::new(2)).is_loop_end);
    }

    #[test]
    fn bad_target_reports_method_name() {
        let text = r#"{"name": "u", "methods": [{
            "name": "broken",
            "blocks": [{"end": {"kind": "jump", "target": 7}}]
        }]}"#;
        let err = UnitSource::from_json(text).unwrap().into_unit().unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(matches!(
            err.root(),
            CoreError::Structural {
                check: StructuralCheck::UnknownBlock(_),
                ..
            }
        ));
    }
}
