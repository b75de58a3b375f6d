//! Loop header canonicalization.
//!
//! A `for (init; cond; post)` header can only absorb the loop condition when
//! nothing between the update and the condition has to run first. When the
//! optimizer scheduled assignments in between, the condition moves directly
//! behind the update and the assignments it depends on move ahead of the
//! init, so they run once before the loop starts. That is only sound when
//! those assignments are loop-invariant; otherwise the header is left alone
//! and the condition becomes an in-body guard.

use std::collections::HashSet;

use log::debug;

use crate::ir::{Inst, Stmt, VarId};

use super::classify::LoopMarkers;

/// What canonicalization did to a loop header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopHeaderForm {
    /// No condition or no update: the header keeps its instructions and any
    /// condition is emitted as an in-body guard.
    Unconditional,
    /// Init, update and condition were already adjacent.
    Adjacent,
    /// The condition was moved behind the update and `relocated` assignments
    /// it reads were moved ahead of the init.
    Hoisted { relocated: usize },
    /// The condition depends on something the loop changes; the header is
    /// unchanged and the condition stays a guard.
    Guarded,
}

/// Rewrite a loop header's instruction list in place. Idempotent.
///
/// `loop_writes` holds every variable assigned anywhere else in the loop.
pub fn canonicalize_loop_header(
    insts: &mut Vec<Inst>,
    loop_writes: &HashSet<VarId>,
) -> LoopHeaderForm {
    let markers = LoopMarkers::scan(insts);
    let (Some(cond), Some(post)) = (markers.cond, markers.post) else {
        return LoopHeaderForm::Unconditional;
    };

    if markers.init.is_some_and(|init| post == init + 1) && cond == post + 1 {
        insts[cond].header_clause = true;
        return LoopHeaderForm::Adjacent;
    }

    // Walk backward from the condition, collecting assignments that feed it
    // directly or through another collected assignment.
    let mut needed: HashSet<VarId> = insts[cond].reads.iter().copied().collect();
    let mut relocated: Vec<usize> = Vec::new();
    for idx in (post + 1..cond).rev() {
        if let Some(dst) = insts[idx].writes() {
            if needed.contains(&dst) {
                needed.extend(insts[idx].reads.iter().copied());
                relocated.push(idx);
            }
        }
    }

    if !relocated.is_empty() && !is_invariant(insts, &relocated, loop_writes) {
        debug!("loop condition depends on a loop-varying assignment; keeping it as a guard");
        return LoopHeaderForm::Guarded;
    }

    let mut condition = insts.remove(cond);
    condition.header_clause = true;
    // `relocated` is descending and every index is above `post`, so earlier
    // removals never shift later ones or anything up to the update.
    let mut moved: Vec<Inst> = relocated.iter().map(|&idx| insts.remove(idx)).collect();
    moved.reverse();
    let count = moved.len();

    insts.insert(post + 1, condition);
    let anchor = markers.init.unwrap_or(post);
    insts.splice(anchor..anchor, moved);
    if count > 0 {
        debug!("hoisted loop condition, moved {count} assignment(s) ahead of the loop");
    }
    LoopHeaderForm::Hoisted { relocated: count }
}

/// Whether the assignments at `relocated` compute the same values on every
/// iteration, so running them once before the loop changes nothing.
fn is_invariant(insts: &[Inst], relocated: &[usize], loop_writes: &HashSet<VarId>) -> bool {
    let mut varying: HashSet<VarId> = loop_writes.clone();
    for (idx, inst) in insts.iter().enumerate() {
        if matches!(inst.stmt, Stmt::LoopPost { .. }) {
            varying.extend(inst.reads.iter().copied());
        } else if !relocated.contains(&idx) {
            varying.extend(inst.writes());
        }
    }
    relocated.iter().all(|&idx| {
        let inst = &insts[idx];
        !inst.writes().is_some_and(|dst| varying.contains(&dst))
            && inst.reads.iter().all(|r| !varying.contains(r))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    fn var(i: u32) -> VarId {
        VarId::new(i)
    }

    fn assign(dst: u32, expr: &str, reads: &[u32]) -> Inst {
        let reads: Vec<VarId> = reads.iter().map(|&r| var(r)).collect();
        Inst::new(Stmt::Assign {
            dst: var(dst),
            expr: expr.into(),
        })
        .with_reads(&reads)
    }

    fn init() -> Inst {
        Inst::new(Stmt::LoopInit { init: "i = 0".into() })
    }

    fn post() -> Inst {
        Inst::new(Stmt::LoopPost { update: "i++".into() }).with_reads(&[var(0)])
    }

    fn canonicalize(insts: &mut Vec<Inst>) -> LoopHeaderForm {
        canonicalize_loop_header(insts, &HashSet::new())
    }

    fn cond(reads: &[u32]) -> Inst {
        let reads: Vec<VarId> = reads.iter().map(|&r| var(r)).collect();
        Inst::new(Stmt::LoopCondition { cond: "i < lim".into() }).with_reads(&reads)
    }

    #[test]
    fn adjacent_header_only_marks_condition() {
        let mut insts = vec![init(), post(), cond(&[0])];
        assert_eq!(canonicalize(&mut insts), LoopHeaderForm::Adjacent);
        assert!(insts[2].header_clause);
        assert!(matches!(insts[0].stmt, Stmt::LoopInit { .. }));
    }

    #[test]
    fn hoists_condition_and_transitive_dependencies() {
        // post; t = n - 1; u = 7; lim = t * 2; cond(i, lim)
        let mut insts = vec![
            init(),
            post(),
            assign(2, "n - 1", &[3]),
            assign(4, "7", &[]),
            assign(1, "t * 2", &[2]),
            cond(&[0, 1]),
        ];
        let form = canonicalize(&mut insts);
        assert_eq!(form, LoopHeaderForm::Hoisted { relocated: 2 });
        // Dependencies run before the loop, in their original order.
        assert_eq!(insts[0].writes(), Some(var(2)));
        assert_eq!(insts[1].writes(), Some(var(1)));
        assert!(matches!(insts[2].stmt, Stmt::LoopInit { .. }));
        assert!(matches!(insts[3].stmt, Stmt::LoopPost { .. }));
        assert!(matches!(insts[4].stmt, Stmt::LoopCondition { .. }));
        assert!(insts[4].header_clause);
        // Unrelated assignment stays in the body.
        assert_eq!(insts[5].writes(), Some(var(4)));
    }

    #[test]
    fn dependency_on_loop_variable_keeps_guard() {
        // lim = i + 1 changes every iteration.
        let mut insts = vec![init(), post(), assign(1, "i + 1", &[0]), cond(&[0, 1])];
        let before = insts.clone();
        assert_eq!(canonicalize(&mut insts), LoopHeaderForm::Guarded);
        assert_eq!(insts, before);
        assert!(!insts[3].header_clause);
    }

    #[test]
    fn dependency_written_in_body_keeps_guard() {
        let mut insts = vec![init(), post(), assign(1, "n * 2", &[3]), cond(&[0, 1])];
        let body_writes: HashSet<VarId> = [var(3)].into_iter().collect();
        assert_eq!(
            canonicalize_loop_header(&mut insts, &body_writes),
            LoopHeaderForm::Guarded
        );
    }

    #[test]
    fn missing_update_leaves_header_alone() {
        let mut insts = vec![init(), assign(1, "n", &[]), cond(&[0, 1])];
        let before = insts.clone();
        assert_eq!(
            canonicalize(&mut insts),
            LoopHeaderForm::Unconditional
        );
        assert_eq!(insts, before);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let mut once = vec![
            init(),
            post(),
            assign(1, "n", &[]),
            assign(5, "0", &[]),
            cond(&[0, 1]),
        ];
        assert_eq!(canonicalize(&mut once), LoopHeaderForm::Hoisted { relocated: 1 });
        let mut twice = once.clone();
        assert_eq!(canonicalize(&mut twice), LoopHeaderForm::Adjacent);
        assert_eq!(once, twice);
    }
}
