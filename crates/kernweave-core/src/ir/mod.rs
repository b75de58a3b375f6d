//! Annotated control-flow graphs and the analyses that produce them.

pub mod block;
pub mod builder;
pub(crate) mod dominators;
pub mod graph;
pub mod inst;
pub mod loops;
pub mod method;
pub mod source;

pub use block::{BeginKind, Block, BlockId, CaseKey, EndKind, SwitchCase};
pub use builder::GraphBuilder;
pub use graph::{DominatedChildren, Graph};
pub use inst::{Inst, Stmt, Var, VarId};
pub use loops::{LoopForest, NaturalLoop};
pub use method::{CompilationUnit, Method, MethodKind, Param};
pub use source::{BlockSource, CaseSource, EndSource, MethodSource, UnitSource};
