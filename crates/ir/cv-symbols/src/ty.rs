//! Type representation for the emission view

#![allow(
    clippy::min_ident_chars,
    reason = "TyId and TyKind are conventional names in type representations"
)]

use crate::TypeDefId;
use la_arena::Idx;

/// Interned type id
///
/// Types are interned structurally, so two ids are equal exactly when the
/// types they denote are equal. Generic instantiations are therefore
/// identified by definition plus argument list.
pub type TyId = Idx<TyKind>;

/// Built-in types with a dedicated signature encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Primitive {
    /// No value
    #[display("void")]
    Void,
    /// Boolean
    #[display("bool")]
    Bool,
    /// UTF-16 code unit
    #[display("char")]
    Char,
    /// Signed 8-bit integer
    #[display("int8")]
    I1,
    /// Unsigned 8-bit integer
    #[display("uint8")]
    U1,
    /// Signed 16-bit integer
    #[display("int16")]
    I2,
    /// Unsigned 16-bit integer
    #[display("uint16")]
    U2,
    /// Signed 32-bit integer
    #[display("int32")]
    I4,
    /// Unsigned 32-bit integer
    #[display("uint32")]
    U4,
    /// Signed 64-bit integer
    #[display("int64")]
    I8,
    /// Unsigned 64-bit integer
    #[display("uint64")]
    U8,
    /// 32-bit float
    #[display("float32")]
    R4,
    /// 64-bit float
    #[display("float64")]
    R8,
    /// String reference
    #[display("string")]
    String,
    /// Root object reference
    #[display("object")]
    Object,
    /// Native-sized signed integer
    #[display("native int")]
    IntPtr,
    /// Native-sized unsigned integer
    #[display("native uint")]
    UIntPtr,
}

/// Kind of type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TyKind {
    /// Built-in type
    Primitive(Primitive),
    /// A type definition, or an open generic definition
    Named(TypeDefId),
    /// Generic type instantiation
    Instance {
        /// Generic definition
        def: TypeDefId,
        /// Type arguments, one per generic parameter of `def`
        args: Vec<TyId>,
    },
    /// Generic parameter of the enclosing type (`!n`)
    TypeParam(u32),
    /// Generic parameter of the enclosing method (`!!n`)
    MethodParam(u32),
    /// Single-dimensional zero-based array
    Vector {
        /// Element type
        element: TyId,
    },
    /// Multi-dimensional array
    Array {
        /// Element type
        element: TyId,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer
    Pointer {
        /// Pointee type
        pointee: TyId,
    },
    /// Managed pointer; only valid inside signatures
    ByRef {
        /// Referenced type
        referent: TyId,
    },
}

impl TyKind {
    /// Next link of an array/vector/pointer chain
    #[must_use]
    pub fn chain_element(&self) -> Option<TyId> {
        match self {
            Self::Vector { element } | Self::Array { element, .. } => Some(*element),
            Self::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    /// Whether this type is encoded through a type-spec row when it needs a token
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        !matches!(self, Self::Named(_))
    }

    /// Whether this is a managed pointer
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, Self::ByRef { .. })
    }
}
