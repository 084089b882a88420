//! Multi-dimensional array pseudo-methods
//!
//! Multi-dimensional arrays have no real definition to reference, so every
//! constructor, element load, element store and element address used by
//! emitted code goes through a synthesized member on the array type. One
//! descriptor exists per kind and array type for the whole session.

use crate::adapters::{EmitContainer, EmitNamed, EmitSignature};
use cv_symbols::{Primitive, SymbolTable, TyId, TyKind};
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Pseudo-method kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayMethodKind {
    /// Allocates an array from one length per dimension
    Constructor,
    /// Loads an element
    Get,
    /// Stores an element
    Set,
    /// Takes the managed address of an element
    Address,
}

impl ArrayMethodKind {
    /// Member name the pseudo-method is referenced by
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Constructor => ".ctor",
            Self::Get => "Get",
            Self::Set => "Set",
            Self::Address => "Address",
        }
    }
}

/// Immutable pseudo-method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayMethod {
    /// Kind
    pub kind: ArrayMethodKind,
    /// Array type the method is a member of
    pub array_ty: TyId,
    /// Element type of `array_ty`
    pub element_ty: TyId,
    /// Parameter types
    pub params: Vec<TyId>,
    /// Return type
    pub ret: TyId,
}

impl ArrayMethod {
    /// Builds the descriptor for `kind` on `array_ty`
    ///
    /// # Panics
    /// If `array_ty` is not a multi-dimensional array type
    #[must_use]
    #[allow(clippy::panic, reason = "callers only request pseudo-methods for arrays")]
    pub fn build(kind: ArrayMethodKind, array_ty: TyId, symbols: &SymbolTable) -> Self {
        let TyKind::Array { element, rank } = symbols.ty_kind(array_ty) else {
            panic!(
                "COMPILER BUG: array pseudo-method requested for non-array type {:?}",
                symbols.ty_kind(array_ty)
            )
        };

        let int32 = symbols.primitive(Primitive::I4);
        let void = symbols.primitive(Primitive::Void);
        let mut params = vec![int32; rank as usize];
        let ret = match kind {
            ArrayMethodKind::Constructor => void,
            ArrayMethodKind::Get => element,
            ArrayMethodKind::Set => {
                params.push(element);
                void
            }
            ArrayMethodKind::Address => symbols.by_ref(element),
        };

        Self {
            kind,
            array_ty,
            element_ty: element,
            params,
            ret,
        }
    }
}

impl EmitNamed for ArrayMethod {
    fn name(&self) -> String {
        self.kind.name().to_owned()
    }
}

impl EmitSignature for ArrayMethod {
    fn params(&self) -> Vec<TyId> {
        self.params.clone()
    }

    fn ret(&self) -> TyId {
        self.ret
    }

    fn has_this(&self) -> bool {
        true
    }

    fn generic_arity(&self) -> u32 {
        0
    }
}

impl EmitContainer for ArrayMethod {
    fn container(&self) -> TyId {
        self.array_ty
    }
}

/// Session-wide descriptor cache
#[derive(Debug, Default)]
pub struct ArrayMethodCache {
    methods: RwLock<FxHashMap<(ArrayMethodKind, TyId), Arc<ArrayMethod>>>,
}

impl ArrayMethodCache {
    /// Creates an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor for `kind` on `array_ty`, building it on first use
    ///
    /// Concurrent callers asking for the same pair all receive the same `Arc`;
    /// a descriptor built by a thread that lost the race is dropped.
    ///
    /// # Panics
    /// If `array_ty` is not a multi-dimensional array type
    pub fn get(
        &self,
        kind: ArrayMethodKind,
        array_ty: TyId,
        symbols: &SymbolTable,
    ) -> Arc<ArrayMethod> {
        let key = (kind, array_ty);
        if let Some(method) = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(method);
        }

        let built = Arc::new(ArrayMethod::build(kind, array_ty, symbols));
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(methods.entry(key).or_insert(built))
    }

    /// Number of cached descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_signatures_follow_rank() {
        let symbols = SymbolTable::new();
        let int32 = symbols.primitive(Primitive::I4);
        let string = symbols.primitive(Primitive::String);
        let cube = symbols.array(string, 3);

        let ctor = ArrayMethod::build(ArrayMethodKind::Constructor, cube, &symbols);
        assert_eq!(ctor.kind.name(), ".ctor");
        assert_eq!(ctor.params, vec![int32; 3]);
        assert_eq!(ctor.ret, symbols.primitive(Primitive::Void));

        let set = ArrayMethod::build(ArrayMethodKind::Set, cube, &symbols);
        assert_eq!(set.params, vec![int32, int32, int32, string]);

        let get = ArrayMethod::build(ArrayMethodKind::Get, cube, &symbols);
        assert_eq!(get.params.len(), 3);
        assert_eq!(get.ret, string);

        let address = ArrayMethod::build(ArrayMethodKind::Address, cube, &symbols);
        assert_eq!(address.ret, symbols.by_ref(string));
    }

    #[test]
    fn test_concurrent_lookups_share_one_descriptor() {
        let symbols = SymbolTable::new();
        let matrix = symbols.array(symbols.primitive(Primitive::R8), 2);
        let cache = ArrayMethodCache::new();

        let found: Vec<Arc<ArrayMethod>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.get(ArrayMethodKind::Get, matrix, &symbols)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert!(found.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    #[should_panic(expected = "COMPILER BUG")]
    fn test_vector_has_no_pseudo_methods() {
        let symbols = SymbolTable::new();
        let vector = symbols.vector(symbols.primitive(Primitive::I4));
        let cache = ArrayMethodCache::new();
        cache.get(ArrayMethodKind::Get, vector, &symbols);
    }
}
