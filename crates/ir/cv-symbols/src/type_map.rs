//! Generic parameter substitution

use crate::{SymbolTable, TyId, TyKind};

/// Substitution of generic parameters by concrete arguments
///
/// Built from the instantiated container of a specialized member, optionally
/// extended with method type arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMap {
    type_args: Vec<TyId>,
    method_args: Vec<TyId>,
}

impl TypeMap {
    /// Creates a map from explicit argument lists
    #[must_use]
    pub fn new(type_args: Vec<TyId>, method_args: Vec<TyId>) -> Self {
        Self {
            type_args,
            method_args,
        }
    }

    /// Map induced by a container type; empty unless it is an instantiation
    #[must_use]
    pub fn for_container(symbols: &SymbolTable, container: TyId) -> Self {
        match symbols.ty_kind(container) {
            TyKind::Instance { args, .. } => Self::new(args, Vec::new()),
            _ => Self::default(),
        }
    }

    /// Adds method type arguments
    #[must_use]
    pub fn with_method_args(mut self, method_args: Vec<TyId>) -> Self {
        self.method_args = method_args;
        self
    }

    /// Whether the map substitutes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_args.is_empty() && self.method_args.is_empty()
    }

    /// Applies the substitution, interning any new types
    ///
    /// Parameters without an argument are left in place.
    pub fn substitute(&self, symbols: &SymbolTable, ty: TyId) -> TyId {
        if self.is_empty() {
            return ty;
        }

        match symbols.ty_kind(ty) {
            TyKind::TypeParam(index) => self
                .type_args
                .get(index as usize)
                .copied()
                .unwrap_or(ty),
            TyKind::MethodParam(index) => self
                .method_args
                .get(index as usize)
                .copied()
                .unwrap_or(ty),
            TyKind::Primitive(_) | TyKind::Named(_) => ty,
            TyKind::Instance { def, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| self.substitute(symbols, arg))
                    .collect();
                symbols.intern_ty(TyKind::Instance { def, args })
            }
            TyKind::Vector { element } => {
                let element = self.substitute(symbols, element);
                symbols.intern_ty(TyKind::Vector { element })
            }
            TyKind::Array { element, rank } => {
                let element = self.substitute(symbols, element);
                symbols.intern_ty(TyKind::Array { element, rank })
            }
            TyKind::Pointer { pointee } => {
                let pointee = self.substitute(symbols, pointee);
                symbols.intern_ty(TyKind::Pointer { pointee })
            }
            TyKind::ByRef { referent } => {
                let referent = self.substitute(symbols, referent);
                symbols.intern_ty(TyKind::ByRef { referent })
            }
        }
    }
}
