//! Bound statements

use crate::{Expr, LabelId, LocalId, Place, TryId};
use cv_symbols::TyId;

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Statement sequence; labels inside are reachable from outside
    Block(Vec<Stmt>),
    /// Expression evaluated for its effects
    Expr(Expr),
    /// Assignment
    Assign {
        /// Destination
        place: Place,
        /// Value
        value: Expr,
    },
    /// Jump target definition
    Label(LabelId),
    /// Unconditional jump
    Goto(LabelId),
    /// Jump when `cond` evaluates to `jump_if`
    CondGoto {
        /// Condition
        cond: Expr,
        /// Polarity
        jump_if: bool,
        /// Target
        target: LabelId,
    },
    /// Multi-way jump on an integer; falls through when nothing matches
    Switch {
        /// Integer scrutinee
        scrutinee: Expr,
        /// Case values and their targets
        cases: Vec<(i64, LabelId)>,
        /// Target when no case matches
        default: Option<LabelId>,
    },
    /// Method return
    Return(Option<Expr>),
    /// Suspension point producing one element
    Yield(Expr),
    /// Early exit from an iterator
    YieldBreak,
    /// Structured try statement
    Try(TryStmt),
    /// Protected region whose handler runs only on exceptional exit, then rethrows
    TryFault {
        /// Protected statements
        body: Vec<Stmt>,
        /// Handler
        fault: Vec<Stmt>,
    },
    /// Raise an exception
    Throw(Expr),
    /// Does nothing
    Nop,
}

/// Try statement with optional catch and finally clauses
#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    /// Identity within the body
    pub id: TryId,
    /// Protected statements
    pub body: Vec<Stmt>,
    /// Catch clauses, in order
    pub catches: Vec<CatchClause>,
    /// Finally clause
    pub finally: Option<Vec<Stmt>>,
}

/// Catch clause
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    /// Caught exception type; `None` catches everything
    pub exception_ty: Option<TyId>,
    /// Local receiving the exception
    pub local: Option<LocalId>,
    /// Handler
    pub body: Vec<Stmt>,
}

impl Stmt {
    /// Assignment to a place
    #[must_use]
    pub fn assign(place: Place, value: Expr) -> Self {
        Self::Assign { place, value }
    }

    /// Try/finally without catch clauses
    #[must_use]
    pub fn try_finally(id: TryId, body: Vec<Self>, finally: Vec<Self>) -> Self {
        Self::Try(TryStmt {
            id,
            body,
            catches: Vec::new(),
            finally: Some(finally),
        })
    }

    /// Conditional jump taken when `cond` is true
    #[must_use]
    pub fn goto_if(cond: Expr, target: LabelId) -> Self {
        Self::CondGoto {
            cond,
            jump_if: true,
            target,
        }
    }
}
