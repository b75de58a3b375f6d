use thiserror::Error;

use crate::ir::{BlockId, VarId};

/// An annotated graph that breaks one of the emitter's assumptions.
///
/// These indicate a bug in whatever produced the graph; nothing about the
/// source program is at fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralCheck {
    #[error("entry block has a dominator")]
    EntryHasDominator,
    #[error("non-entry block has no dominator")]
    MissingDominator,
    #[error("reference to unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("reference to unknown variable {0}")]
    UnknownVar(VarId),
    #[error("block has no terminator")]
    MissingTerminator,
    #[error("block is unreachable from the entry")]
    Unreachable,
    #[error("branch successors do not match its true/false targets")]
    BranchTargetMismatch,
    #[error("switch successors do not match its case targets")]
    SwitchCaseMismatch,
    #[error("switch must have exactly one default case, found {0}")]
    SwitchDefaultCount(usize),
    #[error("switch maps key {0} more than once")]
    DuplicateCaseKey(i64),
    #[error("return block has successors")]
    ReturnWithSuccessors,
    #[error("fallthrough block must have exactly one successor, found {0}")]
    FallthroughTargetCount(usize),
    #[error("dominated child {0} does not name this block as its dominator")]
    ChildChainMismatch(BlockId),
    #[error("dominator child chain does not terminate")]
    ChildChainCycle,
    #[error("dominator chain does not reach the entry")]
    DominatorCycle,
    #[error("loop header has no back-edge predecessor")]
    LoopHeaderWithoutBackEdge,
    #[error("back edge from {0} targets a block not flagged as loop header")]
    BackEdgeIntoNonHeader(BlockId),
    #[error("back edge source is not flagged as loop end")]
    UnflaggedLoopEnd,
    #[error("block flagged as loop end has no back edge")]
    LoopEndWithoutBackEdge,
    #[error("block was never reached through the dominator tree")]
    NotInDominatorTree,
}

/// A well-formed graph whose control flow cannot be expressed with nested
/// scopes. The usual remedy is disabling the optimization that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedPattern {
    #[error("irreducible control flow (edge from {0} re-enters a region it does not dominate)")]
    Irreducible(BlockId),
    #[error("loop has {0} back edges")]
    MultipleBackEdges(usize),
    #[error("back edge leaves a conditional or multi-way block")]
    ConditionalBackEdge,
    #[error("switch case target is a merge block (fall-through between cases)")]
    SwitchCaseIsMerge,
    #[error("else arm reached before its then arm")]
    ElseBeforeThen,
    #[error("case reached after its switch was closed")]
    CaseAfterSwitchClosed,
    #[error("block is dominated by a branch but is neither of its arms")]
    UnclassifiedArm,
    #[error("loop header ends in a plain `if` instead of a loop condition")]
    LoopHeaderIf,
    #[error("loop exit has statements but its merge is also reached by a break")]
    ExitSharedWithBreak,
    #[error("statements relocated past the end of an arm that is followed by an else or another case")]
    MisplacedRelocation,
    #[error("relocated statements contain a scope header or loop clause")]
    RelocatedControlFlow,
}

/// Scope-stack misuse detected by the scope emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("closing brace with no open scope")]
    CloseWithoutOpen,
    #[error("closing brace while a case body is still open")]
    CloseInsideCase,
    #[error("{0} scope(s) left open at end of method")]
    Unclosed(usize),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("internal compiler error at block {block}: {check}")]
    Structural {
        block: BlockId,
        check: StructuralCheck,
    },

    #[error("unsupported control flow at block {block}: {pattern}")]
    Unsupported {
        block: BlockId,
        pattern: UnsupportedPattern,
    },

    #[error("unbalanced scopes near block {block}: {error}")]
    Scope { block: BlockId, error: ScopeError },

    #[error("in method `{method}`: {source}")]
    InMethod {
        method: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("identifier `{original}` becomes `{renamed}`, which is already taken")]
    NameCollision { original: String, renamed: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn structural(block: BlockId, check: StructuralCheck) -> Self {
        CoreError::Structural { block, check }
    }

    pub fn unsupported(block: BlockId, pattern: UnsupportedPattern) -> Self {
        CoreError::Unsupported { block, pattern }
    }

    /// Attach the name of the method being compiled.
    pub fn in_method(self, method: impl Into<String>) -> Self {
        CoreError::InMethod {
            method: method.into(),
            source: Box::new(self),
        }
    }

    /// The error with any method context stripped.
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::InMethod { source, .. } => source.root(),
            other => other,
        }
    }

    /// `true` for flow shapes the emitter cannot structure, as opposed to
    /// malformed input.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), CoreError::Unsupported { .. })
    }

    /// The block the error was raised at, if any.
    pub fn block(&self) -> Option<BlockId> {
        match self.root() {
            CoreError::Structural { block, .. }
            | CoreError::Unsupported { block, .. }
            | CoreError::Scope { block, .. } => Some(*block),
            _ => None,
        }
    }
}
