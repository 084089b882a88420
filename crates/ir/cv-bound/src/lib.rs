//! Bound statement trees
//!
//! A bound body is the binder's output for one method: a tree of statements
//! with structured try regions and unstructured control flow expressed as
//! labels and jumps. The iterator lowering consumes and produces these trees;
//! the reference indexer walks them to find every member and type the
//! emitted code refers to.

pub mod builder;
pub mod expr;
pub mod pretty;
pub mod stmt;
pub mod visit;

pub use builder::BodyBuilder;
pub use expr::{BinaryOp, Callee, Constant, Expr, Place, UnaryOp};
pub use stmt::{CatchClause, Stmt, TryStmt};
pub use visit::Visitor;

use cv_intern::Symbol;
use cv_symbols::TyId;

/// Local variable slot
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, derive_more::Display)]
#[display("_{_0}")]
pub struct LocalId(pub u32);

/// Parameter slot
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, derive_more::Display)]
#[display("arg{_0}")]
pub struct ParamId(pub u32);

/// Jump target
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, derive_more::Display)]
#[display("L{_0}")]
pub struct LabelId(pub u32);

/// Identity of one try statement within a body
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, derive_more::Display)]
#[display("try{_0}")]
pub struct TryId(pub u32);

/// Field slot of a lowered state machine
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, derive_more::Display)]
#[display("this.f{_0}")]
pub struct FieldSlot(pub u32);

/// Method synthesized by a lowering pass, indexed within its owner
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, derive_more::Display)]
#[display("m{_0}")]
pub struct SynthMethodId(pub u32);

/// A local variable or parameter declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    /// Source name; compiler temporaries have none
    pub name: Option<Symbol>,
    /// Declared type
    pub ty: TyId,
}

/// One method body
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Formal parameters, excluding the receiver
    pub params: Vec<LocalDecl>,
    /// Local variables, including compiler temporaries
    pub locals: Vec<LocalDecl>,
    /// Top-level statements
    pub root: Vec<Stmt>,
    /// Number of labels allocated; every label id is below this
    pub label_count: u32,
    /// Number of try ids allocated; every try id is below this
    pub try_count: u32,
}

impl Body {
    /// Declaration of a local
    #[must_use]
    pub fn local(&self, id: LocalId) -> &LocalDecl {
        &self.locals[id.0 as usize]
    }

    /// Declaration of a parameter
    #[must_use]
    pub fn param(&self, id: ParamId) -> &LocalDecl {
        &self.params[id.0 as usize]
    }
}
