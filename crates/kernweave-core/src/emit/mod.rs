//! Structured source emission.
//!
//! Turns an annotated [`Graph`] into nested `if`/`else`, `switch`/`case` and
//! `for` scopes without any `goto`:
//!
//! 1. **Validate**: block-level invariants and loop shape
//!    ([`Graph::validate`], [`LoopForest::compute`]).
//! 2. **Traverse**: one dominator-tree walk emitting every block once
//!    ([`traverse`]), canonicalizing loop headers on the way
//!    ([`canonicalize`]).
//! 3. **Finish**: the [`ScopeWriter`] refuses to return text with open
//!    scopes.

pub mod canonicalize;
pub mod classify;
pub mod scope;
pub mod traverse;

use crate::error::CoreError;
use crate::ir::{Graph, LoopForest, Method};
use crate::pipeline::EmitConfig;

pub use canonicalize::{canonicalize_loop_header, LoopHeaderForm};
pub use classify::{classify, InstKind, LoopMarkers};
pub use scope::{Scope, ScopeEvent, ScopeWriter};
pub use traverse::{EmitOutput, TraversalState, TraversalSummary};

/// Emit the body of one graph.
pub fn emit_graph(graph: &Graph, config: &EmitConfig) -> Result<EmitOutput, CoreError> {
    graph.validate()?;
    let loops = LoopForest::compute(graph)?;
    traverse::Traversal::new(graph, &loops, config).run()
}

/// Emit the body of one method; errors name the method.
pub fn emit_method(method: &Method, config: &EmitConfig) -> Result<EmitOutput, CoreError> {
    emit_graph(&method.graph, config).map_err(|e| e.in_method(&method.name))
}
