//! Dispose method generation

use crate::frames::{FrameId, FrameTree};
use crate::rewriter::{IdAllocator, set_state};
use crate::{FINISHED_STATE, STATE_FIELD};
use cv_bound::{Body, Expr, LocalDecl, LocalId, Place, Stmt, TryStmt};
use cv_symbols::TyId;

/// Builds `cached = state; <dispatch>; state = FINISHED; return`
pub(crate) fn build_dispose(frames: &FrameTree, ids: &mut IdAllocator, int32: TyId) -> Body {
    let cached = LocalId(0);
    let mut root = vec![Stmt::assign(
        Place::Local(cached),
        Expr::MachineField(STATE_FIELD),
    )];
    root.extend(frame_dispatch(frames, frames.root(), cached, ids));
    root.push(set_state(FINISHED_STATE));
    root.push(Stmt::Return(None));

    Body {
        params: Vec::new(),
        locals: vec![LocalDecl {
            name: None,
            ty: int32,
        }],
        root,
        label_count: ids.next_label,
        try_count: ids.next_try,
    }
}

/// Switches on the cached state into the child frame that covers it, then
/// runs this frame's handler in a finally clause so inner handlers go first
fn frame_dispatch(
    frames: &FrameTree,
    frame: FrameId,
    cached: LocalId,
    ids: &mut IdAllocator,
) -> Vec<Stmt> {
    let mut body = Vec::new();
    let children = frames.children_by_state(frame);
    if !children.is_empty() {
        let done = ids.label();
        let mut cases = Vec::new();
        let mut sections = Vec::new();
        for (child, states) in children {
            let section = ids.label();
            cases.extend(states.into_iter().map(|state| (i64::from(state), section)));
            sections.push(Stmt::Label(section));
            sections.extend(frame_dispatch(frames, child, cached, ids));
            sections.push(Stmt::Goto(done));
        }
        body.push(Stmt::Switch {
            scrutinee: Expr::Local(cached),
            cases,
            default: None,
        });
        body.push(Stmt::Goto(done));
        body.extend(sections);
        body.push(Stmt::Label(done));
    }

    if let Some(handler) = frames.get(frame).handler {
        body = vec![Stmt::Try(TryStmt {
            id: ids.try_id(),
            body,
            catches: Vec::new(),
            finally: Some(vec![Stmt::Expr(Expr::call_synthesized(handler))]),
        })];
    }
    body
}
