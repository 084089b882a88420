//! Metadata tokens and the reservation table
//!
//! A token packs a table tag into its high byte and a one-based row number
//! into the low 24 bits. Reference tokens are reserved on first request and
//! never change afterwards; the table is shared by every emission worker.

use crate::array_methods::ArrayMethodKind;
use crate::error::EmitError;
use cv_symbols::{AssemblyId, FileId, MemberRef, MemberRefId, ModuleId, SymbolTable, TyId, TyKind};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Metadata table a token points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum TableKind {
    /// Referenced types
    TypeRef,
    /// Defined types
    TypeDef,
    /// Defined fields
    Field,
    /// Defined methods
    MethodDef,
    /// Referenced fields and methods
    MemberRef,
    /// Referenced modules of the same assembly
    ModuleRef,
    /// Constructed types
    TypeSpec,
    /// Referenced assemblies
    AssemblyRef,
    /// Manifest files
    File,
    /// Generic method instantiations
    MethodSpec,
}

impl TableKind {
    /// Tables holding references, in serialization order
    pub const REFERENCES: [Self; 7] = [
        Self::AssemblyRef,
        Self::ModuleRef,
        Self::File,
        Self::TypeRef,
        Self::TypeSpec,
        Self::MemberRef,
        Self::MethodSpec,
    ];

    /// High byte of tokens into this table
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::TypeRef => 0x01,
            Self::TypeDef => 0x02,
            Self::Field => 0x04,
            Self::MethodDef => 0x06,
            Self::MemberRef => 0x0A,
            Self::ModuleRef => 0x1A,
            Self::TypeSpec => 0x1B,
            Self::AssemblyRef => 0x23,
            Self::File => 0x26,
            Self::MethodSpec => 0x2B,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => Self::TypeRef,
            0x02 => Self::TypeDef,
            0x04 => Self::Field,
            0x06 => Self::MethodDef,
            0x0A => Self::MemberRef,
            0x1A => Self::ModuleRef,
            0x1B => Self::TypeSpec,
            0x23 => Self::AssemblyRef,
            0x26 => Self::File,
            0x2B => Self::MethodSpec,
            _ => return None,
        })
    }
}

/// Metadata token
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Largest row a token can address
    pub const MAX_ROW: u32 = 0x00FF_FFFF;

    /// Token for `row` (one-based) of `table`
    #[must_use]
    pub fn new(table: TableKind, row: u32) -> Self {
        Self((u32::from(table.tag()) << 24) | (row & Self::MAX_ROW))
    }

    /// Table the token points into
    #[must_use]
    pub fn table(self) -> Option<TableKind> {
        TableKind::from_tag((self.0 >> 24) as u8)
    }

    /// One-based row
    #[must_use]
    pub fn row(self) -> u32 {
        self.0 & Self::MAX_ROW
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:#010x})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Identity of something that can be referenced from the output module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKey {
    /// Another assembly
    Assembly(AssemblyId),
    /// Another module of the output assembly
    Module(ModuleId),
    /// Manifest file of another module
    File(FileId),
    /// A type
    Type(TyId),
    /// A field, method or generic method instance
    Member(MemberRefId),
    /// A multi-dimensional array pseudo-method
    ArrayMethod(ArrayMethodKind, TyId),
}

impl RefKey {
    /// Reference table a token for this key lives in
    #[must_use]
    pub fn table(self, symbols: &SymbolTable) -> TableKind {
        match self {
            Self::Assembly(_) => TableKind::AssemblyRef,
            Self::Module(_) => TableKind::ModuleRef,
            Self::File(_) => TableKind::File,
            Self::Type(ty) => match symbols.ty_kind(ty) {
                TyKind::Named(_) => TableKind::TypeRef,
                _ => TableKind::TypeSpec,
            },
            Self::Member(member) => match symbols.member(member) {
                MemberRef::MethodInstance { .. } => TableKind::MethodSpec,
                _ => TableKind::MemberRef,
            },
            Self::ArrayMethod(..) => TableKind::MemberRef,
        }
    }
}

/// Reserved reference tokens, with per-table row order
#[derive(Debug, Default)]
pub struct TokenTable {
    inner: RwLock<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    tokens: FxHashMap<RefKey, Token>,
    rows: FxHashMap<TableKind, Vec<RefKey>>,
}

impl TokenTable {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token of `key`, reserving the next row of `table` if it
    /// has none yet
    ///
    /// # Errors
    /// Returns `EmitError::TableFull` when `table` has no rows left
    pub fn reserve(&self, key: RefKey, table: TableKind) -> Result<Token, EmitError> {
        if let Some(token) = self.get(key) {
            return Ok(token);
        }

        let mut inner = self.write();
        if let Some(&token) = inner.tokens.get(&key) {
            return Ok(token);
        }
        let rows = inner.rows.entry(table).or_default();
        let row = rows.len() as u32 + 1;
        if row > Token::MAX_ROW {
            return Err(EmitError::TableFull(table));
        }
        rows.push(key);
        let token = Token::new(table, row);
        inner.tokens.insert(key, token);
        trace!(target: "reference_indexer", ?key, %token, "reserved token");
        Ok(token)
    }

    /// Token of `key`, if one was reserved
    #[must_use]
    pub fn get(&self, key: RefKey) -> Option<Token> {
        self.read().tokens.get(&key).copied()
    }

    /// Whether `key` has a token
    #[must_use]
    pub fn contains(&self, key: RefKey) -> bool {
        self.read().tokens.contains_key(&key)
    }

    /// Keys of `table` in row order
    #[must_use]
    pub fn rows(&self, table: TableKind) -> Vec<RefKey> {
        self.read().rows.get(&table).cloned().unwrap_or_default()
    }

    /// Number of reserved tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().tokens.len()
    }

    /// Whether nothing was reserved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, TokenInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TokenInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
