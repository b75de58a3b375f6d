use serde::{Deserialize, Serialize};

use super::graph::Graph;

/// Whether a method is a device entry point or a helper it calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    #[default]
    Kernel,
    Function,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// Full type spelling, qualifiers included (`__global float *`).
    pub ty: String,
}

/// One method ready for emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub kind: MethodKind,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default = "default_return_ty")]
    pub return_ty: String,
    pub graph: Graph,
}

pub(crate) fn default_return_ty() -> String {
    "void".to_string()
}

/// A kernel task together with the non-inlined methods it calls.
///
/// Units are compiled independently; a failure in one unit never affects
/// another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub name: String,
    pub methods: Vec<Method>,
}

impl CompilationUnit {
    pub fn kernels(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter(|m| m.kind == MethodKind::Kernel)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter(|m| m.kind == MethodKind::Function)
    }
}
