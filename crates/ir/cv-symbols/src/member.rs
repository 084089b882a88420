//! Member references

use crate::{FieldId, MethodId, TyId};
use la_arena::Idx;

/// Interned member reference id
pub type MemberRefId = Idx<MemberRef>;

/// A field or method as referenced from code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRef {
    /// Field on its declaring type
    Field(FieldId),
    /// Method on its declaring type
    Method(MethodId),
    /// Field seen through a generic instantiation of its declaring type
    SpecializedField {
        /// Field definition
        field: FieldId,
        /// Instantiated declaring type
        container: TyId,
    },
    /// Method seen through a generic instantiation of its declaring type
    SpecializedMethod {
        /// Method definition
        method: MethodId,
        /// Instantiated declaring type
        container: TyId,
    },
    /// Generic method instantiation
    MethodInstance {
        /// The generic method, possibly specialized
        method: MemberRefId,
        /// Method type arguments
        args: Vec<TyId>,
    },
}

impl MemberRef {
    /// The generic-definition form of a specialized member
    #[must_use]
    pub fn unspecialized(&self) -> Option<Self> {
        match self {
            Self::SpecializedField { field, .. } => Some(Self::Field(*field)),
            Self::SpecializedMethod { method, .. } => Some(Self::Method(*method)),
            Self::Field(_) | Self::Method(_) | Self::MethodInstance { .. } => None,
        }
    }

    /// Whether the reference names a method
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(
            self,
            Self::Method(_) | Self::SpecializedMethod { .. } | Self::MethodInstance { .. }
        )
    }
}
