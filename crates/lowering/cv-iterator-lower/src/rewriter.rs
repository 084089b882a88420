//! State-machine rewriter
//!
//! Rewrites an iterator body into the step method of its state machine.
//! Suspension points become `return true` plus a resume label, try statements
//! containing suspension points become finally frames whose handlers are
//! called explicitly, and jumps that leave a frame are routed through proxy
//! labels that run the frame's handler on the way out.

use crate::analyzer::YieldTryAnalysis;
use crate::frames::{FrameId, FrameTree};
use crate::{
    CURRENT_FIELD, DISPOSE_METHOD, FINISHED_STATE, FIRST_FINALIZE_STATE, INITIAL_STATE,
    MethodKind, RUNNING_STATE, STATE_FIELD, SynthesizedMethod,
};
use cv_bound::{
    Body, CatchClause, Expr, FieldSlot, LabelId, LocalDecl, LocalId, ParamId, Place, Stmt,
    SynthMethodId, TryId, TryStmt,
};
use cv_symbols::{Primitive, SymbolTable, TyId};
use std::mem;
use tracing::trace;

/// Label and try-id allocation shared by every body of one machine
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdAllocator {
    pub(crate) next_label: u32,
    pub(crate) next_try: u32,
}

impl IdAllocator {
    pub(crate) fn label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    pub(crate) fn try_id(&mut self) -> TryId {
        let id = TryId(self.next_try);
        self.next_try += 1;
        id
    }
}

/// Everything the rewrite produced besides the step body
pub(crate) struct RewriteOutput {
    pub(crate) frames: FrameTree,
    pub(crate) ids: IdAllocator,
    pub(crate) handlers: Vec<SynthesizedMethod>,
    pub(crate) resume_states: Vec<i32>,
    pub(crate) finalize_states: Vec<i32>,
}

pub(crate) struct Rewriter<'lower> {
    analysis: &'lower YieldTryAnalysis,
    frames: FrameTree,
    current: FrameId,
    ids: IdAllocator,
    next_state: i32,
    next_finalize: i32,
    /// Resume state -> label, in allocation order
    dispatches: Vec<(i32, LabelId)>,
    /// Enclosing try statements of any kind
    try_nesting_level: u32,
    exit_label: LabelId,
    result_local: Option<LocalId>,
    /// Locals of the body currently being produced
    locals: Vec<LocalDecl>,
    handlers: Vec<SynthesizedMethod>,
    /// Declared types of the original locals
    local_tys: Vec<TyId>,
    param_count: u32,
    int32: TyId,
    boolean: TyId,
    void: TyId,
    object: TyId,
}

impl<'lower> Rewriter<'lower> {
    pub(crate) fn new(
        symbols: &SymbolTable,
        analysis: &'lower YieldTryAnalysis,
        body: &Body,
    ) -> Self {
        let mut ids = IdAllocator {
            next_label: body.label_count,
            next_try: body.try_count,
        };
        let exit_label = ids.label();
        let frames = FrameTree::new();
        let current = frames.root();
        Self {
            analysis,
            frames,
            current,
            ids,
            next_state: INITIAL_STATE,
            next_finalize: FIRST_FINALIZE_STATE,
            dispatches: Vec::new(),
            try_nesting_level: 0,
            exit_label,
            result_local: None,
            locals: Vec::new(),
            handlers: Vec::new(),
            local_tys: body.locals.iter().map(|local| local.ty).collect(),
            param_count: body.params.len() as u32,
            int32: symbols.primitive(Primitive::I4),
            boolean: symbols.primitive(Primitive::Bool),
            void: symbols.primitive(Primitive::Void),
            object: symbols.primitive(Primitive::Object),
        }
    }

    /// Produces the step body from the iterator's top-level statements
    pub(crate) fn rewrite_step(&mut self, root: Vec<Stmt>) -> Body {
        let cached = self.temp(self.int32);
        let (_, start) = self.add_state();
        let rewritten = self.rewrite_stmts(root);

        let cases = self
            .dispatches
            .iter()
            .map(|&(state, label)| (i64::from(state), label))
            .collect();
        let mut stmts = vec![
            Stmt::assign(Place::Local(cached), Expr::MachineField(STATE_FIELD)),
            Stmt::Switch {
                scrutinee: Expr::Local(cached),
                cases,
                default: None,
            },
            Stmt::Return(Some(Expr::bool(false))),
            Stmt::Label(start),
            set_state(RUNNING_STATE),
        ];
        stmts.extend(rewritten);
        if let Some(result) = self.result_local {
            stmts.push(Stmt::assign(Place::Local(result), Expr::bool(false)));
        }
        stmts.push(Stmt::Label(self.exit_label));
        stmts.push(set_state(FINISHED_STATE));
        stmts.push(Stmt::Return(Some(
            self.result_local.map_or(Expr::bool(false), Expr::Local),
        )));

        if self.analysis.has_frames() {
            stmts = vec![Stmt::TryFault {
                body: stmts,
                fault: vec![Stmt::Expr(Expr::call_synthesized(DISPOSE_METHOD))],
            }];
        }

        Body {
            params: Vec::new(),
            locals: mem::take(&mut self.locals),
            root: stmts,
            label_count: self.ids.next_label,
            try_count: self.ids.next_try,
        }
    }

    pub(crate) fn finish(self) -> RewriteOutput {
        RewriteOutput {
            frames: self.frames,
            ids: self.ids,
            handlers: self.handlers,
            resume_states: (INITIAL_STATE..self.next_state).collect(),
            finalize_states: ((self.next_finalize + 1)..=FIRST_FINALIZE_STATE)
                .rev()
                .collect(),
        }
    }

    fn add_state(&mut self) -> (i32, LabelId) {
        let state = self.next_state;
        self.next_state += 1;
        let label = self.ids.label();
        self.dispatches.push((state, label));
        self.frames.add_state(self.current, state);
        (state, label)
    }

    fn temp(&mut self, ty: TyId) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalDecl { name: None, ty });
        id
    }

    fn proxy_if_needed(&mut self, target: LabelId) -> LabelId {
        let ids = &mut self.ids;
        self.frames
            .proxy_if_needed(self.current, target, || ids.label())
    }

    fn local_slot(&self, local: LocalId) -> FieldSlot {
        FieldSlot(2 + self.param_count + local.0)
    }

    fn param_slot(&self, param: ParamId) -> FieldSlot {
        FieldSlot(2 + param.0)
    }

    fn rewrite_stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.rewrite_stmt(stmt, &mut out);
        }
        out
    }

    #[allow(clippy::panic, reason = "malformed bound trees are compiler bugs")]
    fn rewrite_stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) {
        match stmt {
            Stmt::Block(stmts) => {
                let stmts = self.rewrite_stmts(stmts);
                out.push(Stmt::Block(stmts));
            }
            Stmt::Expr(expr) => out.push(Stmt::Expr(self.hoist_expr(expr))),
            Stmt::Assign { place, value } => out.push(Stmt::Assign {
                place: self.hoist_place(place),
                value: self.hoist_expr(value),
            }),
            Stmt::Label(label) => out.push(Stmt::Label(label)),
            Stmt::Goto(target) => out.push(Stmt::Goto(self.proxy_if_needed(target))),
            Stmt::CondGoto {
                cond,
                jump_if,
                target,
            } => out.push(Stmt::CondGoto {
                cond: self.hoist_expr(cond),
                jump_if,
                target: self.proxy_if_needed(target),
            }),
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let scrutinee = self.hoist_expr(scrutinee);
                let cases = cases
                    .into_iter()
                    .map(|(value, target)| (value, self.proxy_if_needed(target)))
                    .collect();
                let default = default.map(|target| self.proxy_if_needed(target));
                out.push(Stmt::Switch {
                    scrutinee,
                    cases,
                    default,
                });
            }
            Stmt::Return(_) => {
                panic!("COMPILER BUG: return statement inside an iterator body");
            }
            Stmt::Yield(value) => self.rewrite_yield(value, out),
            Stmt::YieldBreak => self.rewrite_yield_break(out),
            Stmt::Try(try_stmt) => {
                if self.analysis.contains_yield(try_stmt.id) {
                    self.rewrite_frame(try_stmt, out);
                } else {
                    let try_stmt = self.rewrite_native_try(try_stmt);
                    out.push(Stmt::Try(try_stmt));
                }
            }
            Stmt::TryFault { body, fault } => {
                self.try_nesting_level += 1;
                let body = self.rewrite_stmts(body);
                let fault = self.rewrite_stmts(fault);
                self.try_nesting_level -= 1;
                out.push(Stmt::TryFault { body, fault });
            }
            Stmt::Throw(value) => out.push(Stmt::Throw(self.hoist_expr(value))),
            Stmt::Nop => out.push(Stmt::Nop),
        }
    }

    fn rewrite_yield(&mut self, value: Expr, out: &mut Vec<Stmt>) {
        let value = self.hoist_expr(value);
        let (state, resume) = self.add_state();
        let finalize = self.frames.get(self.current).finalize_state;
        out.extend([
            Stmt::assign(Place::MachineField(CURRENT_FIELD), value),
            set_state(state),
            Stmt::Return(Some(Expr::bool(true))),
            Stmt::Label(resume),
            set_state(finalize),
        ]);
    }

    fn rewrite_yield_break(&mut self, out: &mut Vec<Stmt>) {
        if self.try_nesting_level == 0 {
            out.push(set_state(FINISHED_STATE));
            out.push(Stmt::Return(Some(Expr::bool(false))));
            return;
        }

        let result = match self.result_local {
            Some(result) => result,
            None => {
                let result = self.temp(self.boolean);
                self.result_local = Some(result);
                result
            }
        };
        out.push(Stmt::assign(Place::Local(result), Expr::bool(false)));
        let target = self.proxy_if_needed(self.exit_label);
        out.push(Stmt::Goto(target));
    }

    fn rewrite_native_try(&mut self, try_stmt: TryStmt) -> TryStmt {
        self.try_nesting_level += 1;
        let body = self.rewrite_stmts(try_stmt.body);
        let catches = try_stmt
            .catches
            .into_iter()
            .map(|catch| self.rewrite_catch(catch))
            .collect();
        let finally = try_stmt.finally.map(|finally| self.rewrite_stmts(finally));
        self.try_nesting_level -= 1;
        TryStmt {
            id: try_stmt.id,
            body,
            catches,
            finally,
        }
    }

    /// The exception lands in a method temporary and is copied to the hoisted field
    fn rewrite_catch(&mut self, catch: CatchClause) -> CatchClause {
        let mut body = Vec::new();
        let local = catch.local.map(|local| {
            let ty = self
                .local_tys
                .get(local.0 as usize)
                .copied()
                .or(catch.exception_ty)
                .unwrap_or(self.object);
            let temp = self.temp(ty);
            body.push(Stmt::assign(
                Place::MachineField(self.local_slot(local)),
                Expr::Local(temp),
            ));
            temp
        });
        body.extend(self.rewrite_stmts(catch.body));
        CatchClause {
            exception_ty: catch.exception_ty,
            local,
            body,
        }
    }

    fn rewrite_frame(&mut self, try_stmt: TryStmt, out: &mut Vec<Stmt>) {
        let finalize = self.next_finalize;
        self.next_finalize -= 1;
        let handler = SynthMethodId(2 + self.handlers.len() as u32);
        let handler_index = self.handlers.len();
        self.handlers.push(SynthesizedMethod {
            name: format!("<>m__Finally{}", handler_index + 1),
            kind: MethodKind::Finally {
                finalize_state: finalize,
            },
            ret: self.void,
            body: Body {
                params: Vec::new(),
                locals: Vec::new(),
                root: Vec::new(),
                label_count: 0,
                try_count: 0,
            },
        });

        let parent = self.current;
        let frame = self.frames.push(
            parent,
            finalize,
            handler,
            self.analysis.labels(try_stmt.id),
        );
        trace!(
            target: "iterator_lower",
            try_id = %try_stmt.id,
            finalize_state = finalize,
            handler = %handler,
            "pushed finally frame"
        );

        self.current = frame;
        self.try_nesting_level += 1;
        let mut block = vec![set_state(finalize)];
        block.extend(self.rewrite_stmts(try_stmt.body));
        self.try_nesting_level -= 1;
        self.current = parent;

        let proxies = self.frames.take_proxies(frame);
        if !proxies.is_empty() {
            let drop_through = self.ids.label();
            block.push(Stmt::Goto(drop_through));
            for (target, proxy) in proxies {
                block.push(Stmt::Label(proxy));
                block.push(Stmt::Expr(Expr::call_synthesized(handler)));
                let next = self.proxy_if_needed(target);
                block.push(Stmt::Goto(next));
            }
            block.push(Stmt::Label(drop_through));
        }
        block.push(Stmt::Expr(Expr::call_synthesized(handler)));
        out.push(Stmt::Block(block));

        let body = self.rewrite_handler(parent, try_stmt.finally.unwrap_or_default());
        self.handlers[handler_index].body = body;
    }

    /// Handler body: leave the frame first, then run the finally clause
    fn rewrite_handler(&mut self, parent: FrameId, finally: Vec<Stmt>) -> Body {
        let saved = mem::take(&mut self.locals);
        let mut stmts = vec![set_state(self.frames.get(parent).finalize_state)];
        stmts.extend(self.rewrite_stmts(finally));
        stmts.push(Stmt::Return(None));
        let locals = mem::replace(&mut self.locals, saved);
        Body {
            params: Vec::new(),
            locals,
            root: stmts,
            label_count: self.ids.next_label,
            try_count: self.ids.next_try,
        }
    }

    fn hoist_expr(&self, expr: Expr) -> Expr {
        match expr {
            Expr::Local(local) => Expr::MachineField(self.local_slot(local)),
            Expr::Param(param) => Expr::MachineField(self.param_slot(param)),
            Expr::Field { receiver, field } => Expr::Field {
                receiver: self.hoist_boxed(receiver),
                field,
            },
            Expr::Call {
                callee,
                receiver,
                args,
            } => Expr::Call {
                callee,
                receiver: self.hoist_boxed(receiver),
                args: self.hoist_all(args),
            },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op,
                lhs: Box::new(self.hoist_expr(*lhs)),
                rhs: Box::new(self.hoist_expr(*rhs)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: Box::new(self.hoist_expr(*operand)),
            },
            Expr::ArrayElement {
                array,
                array_ty,
                indices,
            } => Expr::ArrayElement {
                array: Box::new(self.hoist_expr(*array)),
                array_ty,
                indices: self.hoist_all(indices),
            },
            Expr::AddressOf(place) => Expr::AddressOf(Box::new(self.hoist_place(*place))),
            Expr::NewArray { array_ty, lengths } => Expr::NewArray {
                array_ty,
                lengths: self.hoist_all(lengths),
            },
            other @ (Expr::Const(_) | Expr::MachineField(_) | Expr::TypeToken(_)) => other,
        }
    }

    fn hoist_boxed(&self, expr: Option<Box<Expr>>) -> Option<Box<Expr>> {
        expr.map(|expr| Box::new(self.hoist_expr(*expr)))
    }

    fn hoist_all(&self, exprs: Vec<Expr>) -> Vec<Expr> {
        exprs.into_iter().map(|expr| self.hoist_expr(expr)).collect()
    }

    fn hoist_place(&self, place: Place) -> Place {
        match place {
            Place::Local(local) => Place::MachineField(self.local_slot(local)),
            Place::Param(param) => Place::MachineField(self.param_slot(param)),
            Place::Field { receiver, field } => Place::Field {
                receiver: self.hoist_boxed(receiver),
                field,
            },
            Place::ArrayElement {
                array,
                array_ty,
                indices,
            } => Place::ArrayElement {
                array: Box::new(self.hoist_expr(*array)),
                array_ty,
                indices: self.hoist_all(indices),
            },
            slot @ Place::MachineField(_) => slot,
        }
    }
}

pub(crate) fn set_state(state: i32) -> Stmt {
    Stmt::assign(
        Place::MachineField(STATE_FIELD),
        Expr::int(i64::from(state)),
    )
}
