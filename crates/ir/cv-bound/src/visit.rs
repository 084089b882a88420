//! Read-only traversal of bound trees
//!
//! Override the `visit_*` hooks you care about and call the matching `walk_*`
//! function to keep descending.

use crate::{CatchClause, Expr, Place, Stmt, TryStmt};

/// Bound-tree visitor
pub trait Visitor {
    /// Visits a statement
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visits a try statement
    fn visit_try(&mut self, try_stmt: &TryStmt) {
        walk_try(self, try_stmt);
    }

    /// Visits a catch clause
    fn visit_catch(&mut self, catch: &CatchClause) {
        walk_stmts(self, &catch.body);
    }

    /// Visits an expression
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Visits a place being assigned or addressed
    fn visit_place(&mut self, place: &Place) {
        walk_place(self, place);
    }
}

/// Visits each statement in order
pub fn walk_stmts<V: Visitor + ?Sized>(visitor: &mut V, stmts: &[Stmt]) {
    for stmt in stmts {
        visitor.visit_stmt(stmt);
    }
}

/// Descends into a statement's children
pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Block(stmts) => walk_stmts(visitor, stmts),
        Stmt::Expr(expr) | Stmt::Yield(expr) | Stmt::Throw(expr) => visitor.visit_expr(expr),
        Stmt::Assign { place, value } => {
            visitor.visit_place(place);
            visitor.visit_expr(value);
        }
        Stmt::CondGoto { cond, .. } => visitor.visit_expr(cond),
        Stmt::Switch { scrutinee, .. } => visitor.visit_expr(scrutinee),
        Stmt::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Stmt::Try(try_stmt) => visitor.visit_try(try_stmt),
        Stmt::TryFault { body, fault } => {
            walk_stmts(visitor, body);
            walk_stmts(visitor, fault);
        }
        Stmt::Label(_) | Stmt::Goto(_) | Stmt::YieldBreak | Stmt::Nop => {}
    }
}

/// Descends into the body, catch clauses and finally clause of a try
pub fn walk_try<V: Visitor + ?Sized>(visitor: &mut V, try_stmt: &TryStmt) {
    walk_stmts(visitor, &try_stmt.body);
    for catch in &try_stmt.catches {
        visitor.visit_catch(catch);
    }
    if let Some(finally) = &try_stmt.finally {
        walk_stmts(visitor, finally);
    }
}

/// Descends into an expression's operands
pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Field { receiver, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
        }
        Expr::Call { receiver, args, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        Expr::Unary { operand, .. } => visitor.visit_expr(operand),
        Expr::ArrayElement { array, indices, .. } => {
            visitor.visit_expr(array);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        Expr::AddressOf(place) => visitor.visit_place(place),
        Expr::NewArray { lengths, .. } => {
            for length in lengths {
                visitor.visit_expr(length);
            }
        }
        Expr::Const(_)
        | Expr::Local(_)
        | Expr::Param(_)
        | Expr::MachineField(_)
        | Expr::TypeToken(_) => {}
    }
}

/// Descends into the operands of a place
pub fn walk_place<V: Visitor + ?Sized>(visitor: &mut V, place: &Place) {
    match place {
        Place::Field { receiver, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
        }
        Place::ArrayElement { array, indices, .. } => {
            visitor.visit_expr(array);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        Place::Local(_) | Place::Param(_) | Place::MachineField(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryOp, LabelId, TryId};

    #[derive(Default)]
    struct Counter {
        exprs: usize,
        tries: usize,
    }

    impl Visitor for Counter {
        fn visit_try(&mut self, try_stmt: &TryStmt) {
            self.tries += 1;
            walk_try(self, try_stmt);
        }

        fn visit_expr(&mut self, expr: &Expr) {
            self.exprs += 1;
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_walks_into_try_regions() {
        let stmts = vec![
            Stmt::try_finally(
                TryId(0),
                vec![Stmt::Yield(Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2)))],
                vec![Stmt::goto_if(Expr::bool(true), LabelId(0))],
            ),
            Stmt::Label(LabelId(0)),
        ];
        let mut counter = Counter::default();
        walk_stmts(&mut counter, &stmts);
        assert_eq!(counter.tries, 1);
        assert_eq!(counter.exprs, 4);
    }
}
