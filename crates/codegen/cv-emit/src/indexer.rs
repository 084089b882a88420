//! Reference indexer
//!
//! Walks the output module's definitions and bodies and reserves a token for
//! every assembly, module, type, member and array pseudo-method they refer
//! to. References are visited post-order: the constituents of a reference
//! (its resolution scope, its generic definition and arguments, the types in
//! its signature) are indexed before the reference itself.
//!
//! Two sets drive deduplication. `seen` records every key visited at all;
//! the token table records keys that received a token. A type first met
//! embedded in a signature is only marked seen; meeting it later in a token
//! context still reserves its token, exactly once.
//!
//! The indexer takes `&self` everywhere and can be shared by any number of
//! worker threads.

use crate::array_methods::{ArrayMethodCache, ArrayMethodKind};
use crate::adapters::{EmitSignature, EmitTyped, MethodAdapter, TypeAdapter};
use crate::error::EmitError;
use crate::tokens::{RefKey, Token, TokenTable};
use cv_bound::visit::{walk_expr, walk_place, walk_stmt, walk_stmts};
use cv_bound::{Body, Callee, CatchClause, Expr, Place, Stmt, Visitor};
use cv_symbols::{AssemblyId, MemberRef, MemberRefId, ModuleId, SymbolTable, TyId, TyKind, TypeDefId};
use rustc_hash::FxHashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Shared reference indexer for one output module
#[derive(Debug)]
pub struct ReferenceIndexer {
    symbols: Arc<SymbolTable>,
    array_methods: Arc<ArrayMethodCache>,
    tokens: Arc<TokenTable>,
    module: ModuleId,
    assembly: AssemblyId,
    seen: RwLock<FxHashSet<RefKey>>,
}

impl ReferenceIndexer {
    /// Creates an indexer for `module`
    #[must_use]
    pub fn new(
        symbols: Arc<SymbolTable>,
        array_methods: Arc<ArrayMethodCache>,
        tokens: Arc<TokenTable>,
        module: ModuleId,
    ) -> Self {
        let assembly = symbols.modules[module].assembly;
        Self {
            symbols,
            array_methods,
            tokens,
            module,
            assembly,
            seen: RwLock::new(FxHashSet::default()),
        }
    }

    /// Output module
    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Whether `key` has been visited in any context
    #[must_use]
    pub fn has_seen(&self, key: RefKey) -> bool {
        self.seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    /// Number of distinct keys visited
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Records a visit; true when `key` was not seen before
    fn mark_seen(&self, key: RefKey) -> bool {
        if self.has_seen(key) {
            return false;
        }
        self.seen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    fn reserve(&self, key: RefKey) -> Result<Token, EmitError> {
        self.mark_seen(key);
        self.tokens.reserve(key, key.table(&self.symbols))
    }

    fn is_local(&self, def: TypeDefId) -> bool {
        self.symbols.is_defined_in(def, self.module)
    }

    /// Indexes a referenced assembly
    ///
    /// # Errors
    /// Returns an error when the token table is full
    pub fn visit_assembly_reference(&self, assembly: AssemblyId) -> Result<(), EmitError> {
        if assembly != self.assembly {
            self.reserve(RefKey::Assembly(assembly))?;
        }
        Ok(())
    }

    /// Indexes a referenced module
    ///
    /// Modules of the output assembly get a module reference plus the file
    /// entry listing them; modules of other assemblies are reached through
    /// their assembly.
    ///
    /// # Errors
    /// Returns an error when the token table is full
    pub fn visit_module_reference(&self, module: ModuleId) -> Result<(), EmitError> {
        if module == self.module {
            return Ok(());
        }
        let def = &self.symbols.modules[module];
        if def.assembly != self.assembly {
            return self.visit_assembly_reference(def.assembly);
        }
        self.reserve(RefKey::File(def.file))?;
        self.reserve(RefKey::Module(module))?;
        Ok(())
    }

    /// Indexes a type used where a token is required
    ///
    /// # Errors
    /// Returns an error when the token table is full
    ///
    /// # Panics
    /// If `ty` is a by-ref type
    pub fn visit_type_reference(&self, ty: TyId) -> Result<(), EmitError> {
        self.visit_type(ty, true)
    }

    /// Indexes a type embedded in a signature
    ///
    /// A by-ref type is allowed at the top level of a signature.
    ///
    /// # Errors
    /// Returns an error when the token table is full
    pub fn visit_signature_type(&self, ty: TyId) -> Result<(), EmitError> {
        match self.symbols.ty_kind(ty) {
            TyKind::ByRef { referent } => self.visit_type(referent, false),
            _ => self.visit_type(ty, false),
        }
    }

    #[allow(clippy::panic, reason = "by-ref types never appear in token contexts")]
    fn visit_type(&self, ty: TyId, needs_token: bool) -> Result<(), EmitError> {
        let key = RefKey::Type(ty);
        if self.tokens.contains(key) {
            return Ok(());
        }

        let kind = self.symbols.ty_kind(ty);
        if let TyKind::Named(def) = kind {
            return self.visit_named(def);
        }
        if !self.mark_seen(key) && !needs_token {
            return Ok(());
        }

        match kind {
            TyKind::ByRef { referent } => {
                if needs_token {
                    panic!("COMPILER BUG: by-ref type {ty:?} used in a token context");
                }
                self.visit_type(referent, false)?;
            }
            TyKind::Vector { .. } | TyKind::Array { .. } | TyKind::Pointer { .. } => {
                let mut leaf = ty;
                while let Some(element) = self.symbols.ty_kind(leaf).chain_element() {
                    leaf = element;
                }
                self.visit_type(leaf, false)?;
            }
            TyKind::Instance { def, args } => {
                self.visit_named(def)?;
                for arg in args {
                    self.visit_type(arg, false)?;
                }
            }
            TyKind::Primitive(_) | TyKind::TypeParam(_) | TyKind::MethodParam(_) => {}
            TyKind::Named(_) => return Ok(()),
        }

        if needs_token {
            self.reserve(key)?;
        }
        Ok(())
    }

    /// Named types always get a token: a type reference, or nothing when
    /// the definition is local
    fn visit_named(&self, def: TypeDefId) -> Result<(), EmitError> {
        if self.is_local(def) {
            return Ok(());
        }
        let key = RefKey::Type(self.symbols.named(def));
        if self.tokens.contains(key) {
            return Ok(());
        }

        let type_def = &self.symbols.type_defs[def];
        match type_def.enclosing {
            Some(enclosing) => self.visit_named(enclosing)?,
            None => self.visit_module_reference(type_def.module)?,
        }
        self.reserve(key)?;
        Ok(())
    }

    /// Indexes a field, method or generic method instance
    ///
    /// Members always get a token. A specialized member also indexes its
    /// instantiated container and its unspecialized form; a generic method
    /// instance indexes the generic method and its arguments.
    ///
    /// # Errors
    /// Returns an error when the token table is full
    pub fn visit_member_reference(&self, member: MemberRefId) -> Result<(), EmitError> {
        let key = RefKey::Member(member);
        if self.tokens.contains(key) {
            return Ok(());
        }

        match self.symbols.member(member) {
            MemberRef::Field(field) => {
                let def = &self.symbols.fields[field];
                if self.is_local(def.owner) {
                    self.mark_seen(key);
                    return Ok(());
                }
                self.visit_named(def.owner)?;
                self.visit_signature_type(def.ty)?;
            }
            MemberRef::Method(method) => {
                let owner = self.symbols.methods[method].owner;
                if self.is_local(owner) {
                    self.mark_seen(key);
                    return Ok(());
                }
                self.visit_named(owner)?;
                self.visit_method_signature(&MethodAdapter::new(&self.symbols, method))?;
            }
            MemberRef::SpecializedField { field, container } => {
                self.visit_type(container, true)?;
                self.visit_member_reference(self.symbols.field_ref(field))?;
            }
            MemberRef::SpecializedMethod { method, container } => {
                self.visit_type(container, true)?;
                self.visit_member_reference(self.symbols.method_ref(method))?;
            }
            MemberRef::MethodInstance { method, args } => {
                self.visit_member_reference(method)?;
                for arg in args {
                    self.visit_type(arg, false)?;
                }
            }
        }

        self.reserve(key)?;
        Ok(())
    }

    /// Indexes a multi-dimensional array pseudo-method
    ///
    /// # Errors
    /// Returns an error when the token table is full
    ///
    /// # Panics
    /// If `array_ty` is not a multi-dimensional array type
    pub fn visit_array_method(
        &self,
        kind: ArrayMethodKind,
        array_ty: TyId,
    ) -> Result<(), EmitError> {
        let key = RefKey::ArrayMethod(kind, array_ty);
        if self.tokens.contains(key) {
            return Ok(());
        }

        let method = self.array_methods.get(kind, array_ty, &self.symbols);
        self.visit_type(array_ty, true)?;
        self.visit_method_signature(method.as_ref())?;
        self.reserve(key)?;
        Ok(())
    }

    fn visit_method_signature(&self, signature: &dyn EmitSignature) -> Result<(), EmitError> {
        for param in signature.params() {
            self.visit_signature_type(param)?;
        }
        self.visit_signature_type(signature.ret())
    }

    /// Indexes everything the output module's type definitions refer to:
    /// base types, field signatures and method signatures
    ///
    /// # Errors
    /// Returns an error when the token table is full
    pub fn visit_definitions(&self) -> Result<(), EmitError> {
        let mut types = 0_usize;
        for def in self.symbols.type_defs_in(self.module) {
            let adapter = TypeAdapter::new(&self.symbols, def);
            if let Some(base) = adapter.base() {
                self.visit_type_reference(base)?;
            }
            for field in adapter.fields() {
                self.visit_signature_type(field.ty())?;
            }
            for method in adapter.methods() {
                self.visit_method_signature(&method)?;
            }
            types += 1;
        }

        debug!(
            target: "reference_indexer",
            types,
            tokens = self.tokens.len(),
            "indexed definitions"
        );
        Ok(())
    }

    /// Indexes everything a method body refers to
    ///
    /// # Errors
    /// Returns the first error raised while walking the body
    pub fn visit_body(&self, body: &Body) -> Result<(), EmitError> {
        for local in &body.locals {
            self.visit_signature_type(local.ty)?;
        }

        let mut walker = BodyWalker {
            indexer: self,
            error: None,
        };
        walk_stmts(&mut walker, &body.root);
        walker.error.map_or(Ok(()), Err)
    }

    #[allow(clippy::panic, reason = "the binder only creates arrays of array types")]
    fn visit_new_array(&self, array_ty: TyId) -> Result<(), EmitError> {
        match self.symbols.ty_kind(array_ty) {
            TyKind::Vector { element } => self.visit_type_reference(element),
            TyKind::Array { .. } => self.visit_array_method(ArrayMethodKind::Constructor, array_ty),
            other => panic!("COMPILER BUG: array creation of non-array type {other:?}"),
        }
    }

    #[allow(clippy::panic, reason = "the binder only indexes into array types")]
    fn visit_element_access(&self, array_ty: TyId, kind: ArrayMethodKind) -> Result<(), EmitError> {
        match self.symbols.ty_kind(array_ty) {
            TyKind::Vector { element } if kind == ArrayMethodKind::Address => {
                self.visit_type_reference(element)
            }
            TyKind::Vector { .. } => Ok(()),
            TyKind::Array { .. } => self.visit_array_method(kind, array_ty),
            other => panic!("COMPILER BUG: element access on non-array type {other:?}"),
        }
    }
}

struct BodyWalker<'idx> {
    indexer: &'idx ReferenceIndexer,
    error: Option<EmitError>,
}

impl BodyWalker<'_> {
    fn record(&mut self, result: Result<(), EmitError>) {
        if let Err(error) = result
            && self.error.is_none()
        {
            self.error = Some(error);
        }
    }
}

impl Visitor for BodyWalker<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::Assign { place, value } = stmt {
            if let Place::ArrayElement { array_ty, .. } = place {
                let result = self
                    .indexer
                    .visit_element_access(*array_ty, ArrayMethodKind::Set);
                self.record(result);
            }
            self.visit_place(place);
            self.visit_expr(value);
        } else {
            walk_stmt(self, stmt);
        }
    }

    fn visit_catch(&mut self, catch: &CatchClause) {
        if let Some(exception_ty) = catch.exception_ty {
            let result = self.indexer.visit_type_reference(exception_ty);
            self.record(result);
        }
        walk_stmts(self, &catch.body);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        let result = match expr {
            Expr::Call {
                callee: Callee::Method(method),
                ..
            } => self.indexer.visit_member_reference(*method),
            Expr::Field { field, .. } => self.indexer.visit_member_reference(*field),
            Expr::TypeToken(ty) => self.indexer.visit_type_reference(*ty),
            Expr::NewArray { array_ty, .. } => self.indexer.visit_new_array(*array_ty),
            Expr::ArrayElement { array_ty, .. } => self
                .indexer
                .visit_element_access(*array_ty, ArrayMethodKind::Get),
            Expr::AddressOf(place) => match place.as_ref() {
                Place::ArrayElement { array_ty, .. } => self
                    .indexer
                    .visit_element_access(*array_ty, ArrayMethodKind::Address),
                _ => Ok(()),
            },
            _ => Ok(()),
        };
        self.record(result);
        walk_expr(self, expr);
    }

    fn visit_place(&mut self, place: &Place) {
        if let Place::Field { field, .. } = place {
            let result = self.indexer.visit_member_reference(*field);
            self.record(result);
        }
        walk_place(self, place);
    }
}
