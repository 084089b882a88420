//! Tokens of the output module's own definitions

use crate::tokens::{RefKey, TableKind, Token};
use cv_symbols::{FieldId, MemberRef, MethodId, ModuleId, SymbolTable, TyKind, TypeDefId};
use rustc_hash::FxHashMap;

/// Definition tokens, numbered in definition order
#[derive(Debug, Default, Clone)]
pub struct DefinitionTokens {
    types: FxHashMap<TypeDefId, Token>,
    fields: FxHashMap<FieldId, Token>,
    methods: FxHashMap<MethodId, Token>,
}

impl DefinitionTokens {
    /// Numbers every type, field and method defined in `module`
    ///
    /// Fields and methods are numbered across types, so each type owns a
    /// contiguous run of rows.
    #[must_use]
    pub fn collect(symbols: &SymbolTable, module: ModuleId) -> Self {
        let mut tokens = Self::default();
        for def in symbols.type_defs_in(module) {
            let row = tokens.types.len() as u32 + 1;
            tokens.types.insert(def, Token::new(TableKind::TypeDef, row));

            let type_def = &symbols.type_defs[def];
            for &field in &type_def.fields {
                let row = tokens.fields.len() as u32 + 1;
                tokens.fields.insert(field, Token::new(TableKind::Field, row));
            }
            for &method in &type_def.methods {
                let row = tokens.methods.len() as u32 + 1;
                tokens.methods.insert(method, Token::new(TableKind::MethodDef, row));
            }
        }
        tokens
    }

    /// Token of a defined type
    #[must_use]
    pub fn type_def(&self, def: TypeDefId) -> Option<Token> {
        self.types.get(&def).copied()
    }

    /// Token of a defined field
    #[must_use]
    pub fn field(&self, field: FieldId) -> Option<Token> {
        self.fields.get(&field).copied()
    }

    /// Token of a defined method
    #[must_use]
    pub fn method(&self, method: MethodId) -> Option<Token> {
        self.methods.get(&method).copied()
    }

    /// Definition token standing in for a reference key, if the key names a
    /// local definition
    #[must_use]
    pub fn lookup(&self, symbols: &SymbolTable, key: RefKey) -> Option<Token> {
        match key {
            RefKey::Type(ty) => match symbols.ty_kind(ty) {
                TyKind::Named(def) => self.type_def(def),
                _ => None,
            },
            RefKey::Member(member) => match symbols.member(member) {
                MemberRef::Field(field) => self.field(field),
                MemberRef::Method(method) => self.method(method),
                _ => None,
            },
            RefKey::Assembly(_) | RefKey::Module(_) | RefKey::File(_) | RefKey::ArrayMethod(..) => {
                None
            }
        }
    }

    /// Number of defined types
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}
