//! Yield/try analysis
//!
//! One forward pass over a body records, for every try statement, whether its
//! protected region contains a suspension point and which labels are defined
//! anywhere inside the statement. The rewriter consults the result to decide
//! which tries become finally frames and which jumps leave a frame.

use cv_bound::{Body, LabelId, Stmt, TryId};
use rustc_hash::{FxHashMap, FxHashSet};

/// Per-try facts gathered from one body
#[derive(Debug, Default)]
pub struct YieldTryAnalysis {
    tries: FxHashMap<TryId, TryFacts>,
}

#[derive(Debug, Default)]
struct TryFacts {
    contains_yield: bool,
    labels: FxHashSet<LabelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Body,
    Catch,
    Finally,
    Fault,
}

impl YieldTryAnalysis {
    /// Analyzes `body`
    ///
    /// # Panics
    ///
    /// Panics when the body breaks the shape the binder guarantees: a
    /// suspension point inside a catch, finally or fault clause, an early exit
    /// inside a finally clause, or a try whose body suspends but has catch
    /// clauses or lacks a finally clause.
    #[must_use]
    pub fn analyze(body: &Body) -> Self {
        let mut walker = Walker {
            analysis: Self::default(),
            stack: Vec::new(),
        };
        walker.stmts(&body.root);
        walker.analysis
    }

    /// Whether the protected region of `id` contains a suspension point
    #[must_use]
    pub fn contains_yield(&self, id: TryId) -> bool {
        self.tries.get(&id).is_some_and(|facts| facts.contains_yield)
    }

    /// Labels defined anywhere inside the try statement `id`
    #[must_use]
    pub fn labels(&self, id: TryId) -> FxHashSet<LabelId> {
        self.tries
            .get(&id)
            .map(|facts| facts.labels.clone())
            .unwrap_or_default()
    }

    /// Whether any try in the body contains a suspension point
    #[must_use]
    pub fn has_frames(&self) -> bool {
        self.tries.values().any(|facts| facts.contains_yield)
    }
}

struct Walker {
    analysis: YieldTryAnalysis,
    /// Enclosing try statements, innermost last; fault regions carry no id
    stack: Vec<(Option<TryId>, Region)>,
}

impl Walker {
    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    #[allow(clippy::panic, reason = "malformed bound trees are compiler bugs")]
    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => self.stmts(stmts),
            Stmt::Label(label) => {
                for (id, _) in &self.stack {
                    if let Some(id) = id {
                        self.analysis
                            .tries
                            .entry(*id)
                            .or_default()
                            .labels
                            .insert(*label);
                    }
                }
            }
            Stmt::Yield(_) => {
                if let Some((_, region)) = self
                    .stack
                    .iter()
                    .find(|(_, region)| *region != Region::Body)
                {
                    panic!("COMPILER BUG: yield inside a {region:?} clause reached iterator lowering");
                }
                for (id, _) in &self.stack {
                    match id {
                        Some(id) => self.analysis.tries.entry(*id).or_default().contains_yield = true,
                        None => panic!("COMPILER BUG: yield inside a fault-protected region"),
                    }
                }
            }
            Stmt::YieldBreak => {
                if self.stack.iter().any(|(_, region)| *region == Region::Finally) {
                    panic!("COMPILER BUG: yield break inside a finally clause reached iterator lowering");
                }
            }
            Stmt::Try(try_stmt) => {
                self.analysis.tries.entry(try_stmt.id).or_default();
                self.region(Some(try_stmt.id), Region::Body, &try_stmt.body);
                for catch in &try_stmt.catches {
                    self.region(Some(try_stmt.id), Region::Catch, &catch.body);
                }
                if let Some(finally) = &try_stmt.finally {
                    self.region(Some(try_stmt.id), Region::Finally, finally);
                }

                if self.analysis.contains_yield(try_stmt.id)
                    && (!try_stmt.catches.is_empty() || try_stmt.finally.is_none())
                {
                    panic!(
                        "COMPILER BUG: {} suspends but is not a plain try/finally",
                        try_stmt.id
                    );
                }
            }
            Stmt::TryFault { body, fault } => {
                self.region(None, Region::Body, body);
                self.region(None, Region::Fault, fault);
            }
            Stmt::Expr(_)
            | Stmt::Assign { .. }
            | Stmt::Goto(_)
            | Stmt::CondGoto { .. }
            | Stmt::Switch { .. }
            | Stmt::Return(_)
            | Stmt::Throw(_)
            | Stmt::Nop => {}
        }
    }

    fn region(&mut self, id: Option<TryId>, region: Region, stmts: &[Stmt]) {
        self.stack.push((id, region));
        self.stmts(stmts);
        self.stack.pop();
    }
}
