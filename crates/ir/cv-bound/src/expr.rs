//! Bound expressions and assignable places

use crate::{FieldSlot, LocalId, ParamId, SynthMethodId};
use cv_symbols::{MemberRefId, TyId};

/// Literal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Constant {
    /// Integer literal
    #[display("{_0}")]
    Int(i64),
    /// Boolean literal
    #[display("{_0}")]
    Bool(bool),
    /// The null reference
    #[display("null")]
    Null,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum BinaryOp {
    /// Addition
    #[display("+")]
    Add,
    /// Subtraction
    #[display("-")]
    Sub,
    /// Multiplication
    #[display("*")]
    Mul,
    /// Division
    #[display("/")]
    Div,
    /// Remainder
    #[display("%")]
    Rem,
    /// Equality
    #[display("==")]
    Eq,
    /// Inequality
    #[display("!=")]
    Ne,
    /// Less than
    #[display("<")]
    Lt,
    /// Less than or equal
    #[display("<=")]
    Le,
    /// Greater than
    #[display(">")]
    Gt,
    /// Greater than or equal
    #[display(">=")]
    Ge,
    /// Logical and
    #[display("&&")]
    And,
    /// Logical or
    #[display("||")]
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum UnaryOp {
    /// Arithmetic negation
    #[display("-")]
    Neg,
    /// Logical not
    #[display("!")]
    Not,
}

/// Call target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    /// A method known to the symbol table
    Method(MemberRefId),
    /// A method synthesized alongside the current body
    Synthesized(SynthMethodId),
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal
    Const(Constant),
    /// Local variable read
    Local(LocalId),
    /// Parameter read
    Param(ParamId),
    /// Field of the state machine receiver
    MachineField(FieldSlot),
    /// Field read; static when there is no receiver
    Field {
        /// Object the field is read from
        receiver: Option<Box<Expr>>,
        /// Field reference
        field: MemberRefId,
    },
    /// Method call; static when there is no receiver
    Call {
        /// Call target
        callee: Callee,
        /// Receiver
        receiver: Option<Box<Expr>>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Array element read
    ArrayElement {
        /// Array value
        array: Box<Expr>,
        /// Static type of `array`
        array_ty: TyId,
        /// One index per dimension
        indices: Vec<Expr>,
    },
    /// Managed address of a place
    AddressOf(Box<Place>),
    /// Array allocation
    NewArray {
        /// Array type being created
        array_ty: TyId,
        /// One length per dimension
        lengths: Vec<Expr>,
    },
    /// Runtime handle of a type
    TypeToken(TyId),
}

impl Expr {
    /// Integer literal
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Const(Constant::Int(value))
    }

    /// Boolean literal
    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::Const(Constant::Bool(value))
    }

    /// Binary operation
    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Static call to a symbol-table method
    #[must_use]
    pub fn call(method: MemberRefId, args: Vec<Self>) -> Self {
        Self::Call {
            callee: Callee::Method(method),
            receiver: None,
            args,
        }
    }

    /// Call to a synthesized method on the current receiver
    #[must_use]
    pub fn call_synthesized(method: SynthMethodId) -> Self {
        Self::Call {
            callee: Callee::Synthesized(method),
            receiver: None,
            args: Vec::new(),
        }
    }
}

/// Assignable location
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    /// Local variable
    Local(LocalId),
    /// Parameter
    Param(ParamId),
    /// Field of the state machine receiver
    MachineField(FieldSlot),
    /// Field; static when there is no receiver
    Field {
        /// Object holding the field
        receiver: Option<Box<Expr>>,
        /// Field reference
        field: MemberRefId,
    },
    /// Array element
    ArrayElement {
        /// Array value
        array: Box<Expr>,
        /// Static type of `array`
        array_ty: TyId,
        /// One index per dimension
        indices: Vec<Expr>,
    },
}
