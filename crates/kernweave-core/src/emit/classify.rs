use crate::ir::{Inst, Stmt};

/// Role of an instruction in structured emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    LoopInit,
    LoopCondition,
    LoopPost,
    ExplicitBreak,
    RelocateMarker,
    Plain,
}

pub fn classify(inst: &Inst) -> InstKind {
    match inst.stmt {
        Stmt::LoopInit { .. } => InstKind::LoopInit,
        Stmt::LoopCondition { .. } => InstKind::LoopCondition,
        Stmt::LoopPost { .. } => InstKind::LoopPost,
        Stmt::Break => InstKind::ExplicitBreak,
        Stmt::RelocateMarker => InstKind::RelocateMarker,
        _ => InstKind::Plain,
    }
}

/// Positions of the loop-header instructions that shape a `for` header.
///
/// `cond` is the last loop condition; `post` the last update before it (or
/// the last update overall when there is no condition); `init` the last
/// initializer before `post` (or overall when there is no update).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopMarkers {
    pub init: Option<usize>,
    pub post: Option<usize>,
    pub cond: Option<usize>,
}

impl LoopMarkers {
    pub fn scan(insts: &[Inst]) -> Self {
        let last_before = |kind: InstKind, end: usize| {
            insts[..end].iter().rposition(|i| classify(i) == kind)
        };
        let cond = last_before(InstKind::LoopCondition, insts.len());
        let post = last_before(InstKind::LoopPost, cond.unwrap_or(insts.len()));
        let init = last_before(InstKind::LoopInit, post.unwrap_or(insts.len()));
        LoopMarkers { init, post, cond }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(stmt: Stmt) -> Inst {
        Inst::new(stmt)
    }

    #[test]
    fn classifies_by_statement() {
        assert_eq!(classify(&inst(Stmt::Break)), InstKind::ExplicitBreak);
        assert_eq!(
            classify(&inst(Stmt::LoopPost { update: "i++".into() })),
            InstKind::LoopPost
        );
        assert_eq!(
            classify(&inst(Stmt::RelocateMarker)),
            InstKind::RelocateMarker
        );
        assert_eq!(
            classify(&inst(Stmt::If { cond: "c".into() })),
            InstKind::Plain
        );
    }

    #[test]
    fn markers_pick_last_of_each_in_order() {
        let insts = vec![
            inst(Stmt::LoopInit { init: "i = 0".into() }),
            inst(Stmt::LoopPost { update: "i++".into() }),
            inst(Stmt::Expr { expr: "f()".into() }),
            inst(Stmt::LoopCondition { cond: "i < n".into() }),
            inst(Stmt::LoopPost { update: "j++".into() }),
        ];
        let m = LoopMarkers::scan(&insts);
        assert_eq!(m, LoopMarkers { init: Some(0), post: Some(1), cond: Some(3) });
    }

    #[test]
    fn markers_without_condition() {
        let insts = vec![
            inst(Stmt::LoopInit { init: "i = 0".into() }),
            inst(Stmt::LoopPost { update: "i++".into() }),
        ];
        let m = LoopMarkers::scan(&insts);
        assert_eq!(m.cond, None);
        assert_eq!(m.post, Some(1));
        assert_eq!(m.init, Some(0));
    }
}
