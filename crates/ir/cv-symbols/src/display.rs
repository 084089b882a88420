//! Human-readable rendering of types and members
//!
//! Used by the bound-tree printer and by log output; the rendering follows
//! assembler syntax loosely (`!0` for type parameters, `[,]` for arrays).

use crate::{MemberRef, MemberRefId, SymbolTable, TyId, TyKind, TypeDefId};
use std::fmt;

/// Displays a type id through its symbol table
pub struct DisplayTy<'symbols> {
    symbols: &'symbols SymbolTable,
    ty: TyId,
}

/// Displays a type definition's qualified name
pub struct DisplayTypeDef<'symbols> {
    symbols: &'symbols SymbolTable,
    def: TypeDefId,
}

/// Displays a member reference as `Container::name`
pub struct DisplayMember<'symbols> {
    symbols: &'symbols SymbolTable,
    member: MemberRefId,
}

/// Renders a type
pub fn display_ty(symbols: &SymbolTable, ty: TyId) -> DisplayTy<'_> {
    DisplayTy { symbols, ty }
}

/// Renders a type definition name, enclosing types first
pub fn display_type_def(symbols: &SymbolTable, def: TypeDefId) -> DisplayTypeDef<'_> {
    DisplayTypeDef { symbols, def }
}

/// Renders a member reference
pub fn display_member(symbols: &SymbolTable, member: MemberRefId) -> DisplayMember<'_> {
    DisplayMember { symbols, member }
}

impl fmt::Display for DisplayTy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols = self.symbols;
        match symbols.ty_kind(self.ty) {
            TyKind::Primitive(primitive) => write!(f, "{primitive}"),
            TyKind::Named(def) => write!(f, "{}", display_type_def(symbols, def)),
            TyKind::Instance { def, args } => {
                write!(f, "{}<", display_type_def(symbols, def))?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", display_ty(symbols, *arg))?;
                }
                f.write_str(">")
            }
            TyKind::TypeParam(index) => write!(f, "!{index}"),
            TyKind::MethodParam(index) => write!(f, "!!{index}"),
            TyKind::Vector { element } => write!(f, "{}[]", display_ty(symbols, element)),
            TyKind::Array { element, rank } => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                write!(f, "{}[{commas}]", display_ty(symbols, element))
            }
            TyKind::Pointer { pointee } => write!(f, "{}*", display_ty(symbols, pointee)),
            TyKind::ByRef { referent } => write!(f, "{}&", display_ty(symbols, referent)),
        }
    }
}

impl fmt::Display for DisplayTypeDef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let def = &self.symbols.type_defs[self.def];
        if let Some(enclosing) = def.enclosing {
            write!(f, "{}/", display_type_def(self.symbols, enclosing))?;
        } else if let Some(namespace) = def.namespace {
            write!(f, "{}.", self.symbols.interner.resolve(namespace))?;
        }
        f.write_str(&self.symbols.interner.resolve(def.name))
    }
}

impl fmt::Display for DisplayMember<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbols = self.symbols;
        match symbols.member(self.member) {
            MemberRef::Field(field) => {
                let def = &symbols.fields[field];
                write!(
                    f,
                    "{}::{}",
                    display_type_def(symbols, def.owner),
                    symbols.interner.resolve(def.name)
                )
            }
            MemberRef::Method(method) => {
                let def = &symbols.methods[method];
                write!(
                    f,
                    "{}::{}",
                    display_type_def(symbols, def.owner),
                    symbols.interner.resolve(def.name)
                )
            }
            MemberRef::SpecializedField { field, container } => write!(
                f,
                "{}::{}",
                display_ty(symbols, container),
                symbols.interner.resolve(symbols.fields[field].name)
            ),
            MemberRef::SpecializedMethod { method, container } => write!(
                f,
                "{}::{}",
                display_ty(symbols, container),
                symbols.interner.resolve(symbols.methods[method].name)
            ),
            MemberRef::MethodInstance { method, args } => {
                write!(f, "{}<", display_member(symbols, method))?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", display_ty(symbols, *arg))?;
                }
                f.write_str(">")
            }
        }
    }
}
