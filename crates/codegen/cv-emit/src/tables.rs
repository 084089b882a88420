//! Reference tables image
//!
//! Rows are written in token order, so the row number of every entry equals
//! the row half of the token handed out for it. Names live in a string heap
//! and signatures in a blob heap; both deduplicate. Coded references between
//! rows are stored as raw tokens.

use crate::EmitSession;
use crate::adapters::{
    EmitContainer, EmitGeneric, EmitNamed, EmitSymbol, EmitTyped, TypeAdapter,
};
use crate::error::EmitError;
use crate::signature::{SignatureEncoder, read_compressed_uint, write_compressed_uint};
use crate::tokens::{RefKey, TableKind};
use cv_symbols::{MemberRefId, TyId, TyKind};
use rustc_hash::FxHashMap;
use std::str;

/// Assembly reference row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AssemblyRefRow {
    /// Name offset
    pub name: u32,
    /// Major, minor, build, revision
    pub version: [u16; 4],
}

/// Module reference row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ModuleRefRow {
    /// Name offset
    pub name: u32,
}

/// Manifest file row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct FileRow {
    /// Name offset
    pub name: u32,
    /// Whether the file carries metadata
    pub contains_metadata: bool,
}

/// Type reference row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TypeRefRow {
    /// Resolution scope token: enclosing type, module or assembly
    pub scope: u32,
    /// Name offset
    pub name: u32,
    /// Namespace offset
    pub namespace: u32,
}

/// Type specification row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TypeSpecRow {
    /// Signature blob offset
    pub signature: u32,
}

/// Member reference row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct MemberRefRow {
    /// Token of the type the member is referenced through
    pub parent: u32,
    /// Name offset
    pub name: u32,
    /// Signature blob offset
    pub signature: u32,
}

/// Generic method instantiation row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct MethodSpecRow {
    /// Token of the generic method
    pub method: u32,
    /// Instantiation blob offset
    pub instantiation: u32,
}

/// Type definition row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TypeDefRow {
    /// Name offset
    pub name: u32,
    /// Namespace offset
    pub namespace: u32,
    /// Base type token; zero when there is none
    pub extends: u32,
    /// Enclosing type token; zero for top-level types
    pub enclosing: u32,
    /// First field row owned by this type
    pub field_list: u32,
    /// First method row owned by this type
    pub method_list: u32,
}

/// Field or method definition row
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct MemberDefRow {
    /// Name offset
    pub name: u32,
    /// Signature blob offset
    pub signature: u32,
}

/// Serialized tables of one output module
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TablesImage {
    /// Output module name
    pub module_name: String,
    /// String heap
    pub strings: Vec<u8>,
    /// Blob heap
    pub blobs: Vec<u8>,
    /// Referenced assemblies
    pub assembly_refs: Vec<AssemblyRefRow>,
    /// Referenced modules
    pub module_refs: Vec<ModuleRefRow>,
    /// Manifest files
    pub files: Vec<FileRow>,
    /// Referenced types
    pub type_refs: Vec<TypeRefRow>,
    /// Constructed types
    pub type_specs: Vec<TypeSpecRow>,
    /// Referenced members and array pseudo-methods
    pub member_refs: Vec<MemberRefRow>,
    /// Generic method instantiations
    pub method_specs: Vec<MethodSpecRow>,
    /// Defined types
    pub type_defs: Vec<TypeDefRow>,
    /// Defined fields
    pub fields: Vec<MemberDefRow>,
    /// Defined methods
    pub methods: Vec<MemberDefRow>,
}

impl TablesImage {
    /// Lays out every definition of the session's module and every reserved
    /// reference
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when something written was never
    /// indexed
    pub fn build(session: &EmitSession) -> Result<Self, EmitError> {
        let mut writer = Writer {
            session,
            encoder: SignatureEncoder::new(session),
            strings: StringHeap::new(),
            blobs: BlobHeap::new(),
            image: Self::default(),
        };
        writer.image.module_name = session
            .symbols()
            .interner
            .resolve(session.symbols().modules[session.module()].name);

        writer.definitions()?;
        for table in TableKind::REFERENCES {
            for key in session.tokens().rows(table) {
                writer.reference(table, key)?;
            }
        }

        let mut image = writer.image;
        image.strings = writer.strings.bytes;
        image.blobs = writer.blobs.bytes;
        Ok(image)
    }

    /// Serializes the image
    ///
    /// # Errors
    /// Returns `EmitError::Encode` when serialization fails
    pub fn encode(&self) -> Result<Vec<u8>, EmitError> {
        Ok(bincode::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Deserializes an image
    ///
    /// # Errors
    /// Returns `EmitError::Decode` when `bytes` is not a valid image
    pub fn decode(bytes: &[u8]) -> Result<Self, EmitError> {
        let (image, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(image)
    }

    /// Number of rows in a table
    #[must_use]
    pub fn row_count(&self, table: TableKind) -> usize {
        match table {
            TableKind::AssemblyRef => self.assembly_refs.len(),
            TableKind::ModuleRef => self.module_refs.len(),
            TableKind::File => self.files.len(),
            TableKind::TypeRef => self.type_refs.len(),
            TableKind::TypeSpec => self.type_specs.len(),
            TableKind::MemberRef => self.member_refs.len(),
            TableKind::MethodSpec => self.method_specs.len(),
            TableKind::TypeDef => self.type_defs.len(),
            TableKind::Field => self.fields.len(),
            TableKind::MethodDef => self.methods.len(),
        }
    }

    /// String at a heap offset
    #[must_use]
    pub fn string(&self, offset: u32) -> Option<&str> {
        let tail = self.strings.get(offset as usize..)?;
        let end = tail.iter().position(|&byte| byte == 0)?;
        str::from_utf8(&tail[..end]).ok()
    }

    /// Blob at a heap offset
    #[must_use]
    pub fn blob(&self, offset: u32) -> Option<&[u8]> {
        let tail = self.blobs.get(offset as usize..)?;
        let (len, header) = read_compressed_uint(tail)?;
        tail.get(header..header + len as usize)
    }
}

struct StringHeap {
    bytes: Vec<u8>,
    offsets: FxHashMap<String, u32>,
}

impl StringHeap {
    fn new() -> Self {
        Self {
            bytes: vec![0],
            offsets: FxHashMap::default(),
        }
    }

    fn add(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.offsets.get(value) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(value.to_owned(), offset);
        offset
    }
}

struct BlobHeap {
    bytes: Vec<u8>,
    offsets: FxHashMap<Vec<u8>, u32>,
}

impl BlobHeap {
    fn new() -> Self {
        Self {
            bytes: vec![0],
            offsets: FxHashMap::default(),
        }
    }

    fn add(&mut self, blob: Vec<u8>) -> Result<u32, EmitError> {
        if blob.is_empty() {
            return Ok(0);
        }
        if let Some(&offset) = self.offsets.get(&blob) {
            return Ok(offset);
        }
        let offset = self.bytes.len() as u32;
        write_compressed_uint(blob.len() as u32, &mut self.bytes)?;
        self.bytes.extend_from_slice(&blob);
        self.offsets.insert(blob, offset);
        Ok(offset)
    }
}

struct Writer<'session> {
    session: &'session EmitSession,
    encoder: SignatureEncoder<'session>,
    strings: StringHeap,
    blobs: BlobHeap,
    image: TablesImage,
}

impl Writer<'_> {
    fn token(&self, key: RefKey) -> Result<u32, EmitError> {
        self.session
            .lookup(key)
            .map(|token| token.0)
            .ok_or(EmitError::MissingToken(key))
    }

    fn definitions(&mut self) -> Result<(), EmitError> {
        let session = self.session;
        let symbols = session.symbols();
        for def in symbols.type_defs_in(self.session.module()) {
            let adapter = TypeAdapter::new(symbols, def);
            let extends = match adapter.base() {
                Some(base) => self.token(RefKey::Type(base))?,
                None => 0,
            };
            let enclosing = match adapter.enclosing() {
                Some(enclosing) => self.token(RefKey::Type(symbols.named(enclosing)))?,
                None => 0,
            };
            let row = TypeDefRow {
                name: self.strings.add(&adapter.name()),
                namespace: self.strings.add(&adapter.namespace()),
                extends,
                enclosing,
                field_list: self.image.fields.len() as u32 + 1,
                method_list: self.image.methods.len() as u32 + 1,
            };
            self.image.type_defs.push(row);

            for field in adapter.fields() {
                let signature = self.encoder.field_signature(field.ty())?;
                let row = MemberDefRow {
                    name: self.strings.add(&field.name()),
                    signature: self.blobs.add(signature)?,
                };
                self.image.fields.push(row);
            }
            for method in adapter.methods() {
                let signature = self.encoder.method_signature(&method)?;
                let row = MemberDefRow {
                    name: self.strings.add(&method.name()),
                    signature: self.blobs.add(signature)?,
                };
                self.image.methods.push(row);
            }
        }
        Ok(())
    }

    #[allow(clippy::panic, reason = "keys are filed under the table their kind selects")]
    fn reference(&mut self, table: TableKind, key: RefKey) -> Result<(), EmitError> {
        let session = self.session;
        let symbols = session.symbols();
        match (table, key) {
            (TableKind::AssemblyRef, RefKey::Assembly(assembly)) => {
                let def = &symbols.assemblies[assembly];
                let row = AssemblyRefRow {
                    name: self.strings.add(&symbols.interner.resolve(def.name)),
                    version: def.version,
                };
                self.image.assembly_refs.push(row);
            }
            (TableKind::ModuleRef, RefKey::Module(module)) => {
                let name = symbols.interner.resolve(symbols.modules[module].name);
                let row = ModuleRefRow {
                    name: self.strings.add(&name),
                };
                self.image.module_refs.push(row);
            }
            (TableKind::File, RefKey::File(file)) => {
                let def = &symbols.files[file];
                let row = FileRow {
                    name: self.strings.add(&symbols.interner.resolve(def.name)),
                    contains_metadata: def.contains_metadata,
                };
                self.image.files.push(row);
            }
            (TableKind::TypeRef, RefKey::Type(ty)) => self.type_ref(ty)?,
            (TableKind::TypeSpec, RefKey::Type(ty)) => {
                let signature = self.encoder.type_spec(ty)?;
                let row = TypeSpecRow {
                    signature: self.blobs.add(signature)?,
                };
                self.image.type_specs.push(row);
            }
            (TableKind::MemberRef, RefKey::Member(member)) => self.member_ref(member)?,
            (TableKind::MemberRef, RefKey::ArrayMethod(kind, array_ty)) => {
                let method = self
                    .session
                    .array_methods()
                    .get(kind, array_ty, symbols);
                let signature = self.encoder.method_signature(method.as_ref())?;
                let row = MemberRefRow {
                    parent: self.token(RefKey::Type(method.container()))?,
                    name: self.strings.add(&method.name()),
                    signature: self.blobs.add(signature)?,
                };
                self.image.member_refs.push(row);
            }
            (TableKind::MethodSpec, RefKey::Member(member)) => self.method_spec(member)?,
            (table, key) => panic!("COMPILER BUG: {key:?} filed under {table}"),
        }
        Ok(())
    }

    #[allow(clippy::panic, reason = "type reference rows are only reserved for named types")]
    fn type_ref(&mut self, ty: TyId) -> Result<(), EmitError> {
        let session = self.session;
        let symbols = session.symbols();
        let TyKind::Named(def) = symbols.ty_kind(ty) else {
            panic!("COMPILER BUG: type reference row for constructed type {ty:?}");
        };
        let adapter = TypeAdapter::new(symbols, def);
        let type_def = &symbols.type_defs[def];
        let module = &symbols.modules[type_def.module];
        let scope = match adapter.enclosing() {
            Some(enclosing) => self.token(RefKey::Type(symbols.named(enclosing)))?,
            None if module.assembly == symbols.modules[self.session.module()].assembly => {
                self.token(RefKey::Module(type_def.module))?
            }
            None => self.token(RefKey::Assembly(module.assembly))?,
        };
        let row = TypeRefRow {
            scope,
            name: self.strings.add(&adapter.name()),
            namespace: self.strings.add(&adapter.namespace()),
        };
        self.image.type_refs.push(row);
        Ok(())
    }

    #[allow(clippy::panic, reason = "member reference rows always name a member")]
    fn member_ref(&mut self, member: MemberRefId) -> Result<(), EmitError> {
        let session = self.session;
        let symbols = session.symbols();
        let symbol = EmitSymbol::for_member(symbols, member);
        let Some(container) = symbol.container() else {
            panic!("COMPILER BUG: member reference row for {symbol:?} without a container");
        };
        let signature = match (symbol.signature(), symbol.typed()) {
            (Some(signature), _) => self.encoder.method_signature(signature)?,
            (None, Some(typed)) => self.encoder.field_signature(typed.ty())?,
            (None, None) => panic!("COMPILER BUG: member reference row for {symbol:?} without a signature"),
        };
        let row = MemberRefRow {
            parent: self.token(RefKey::Type(container.container()))?,
            name: self.strings.add(&symbol.named().name()),
            signature: self.blobs.add(signature)?,
        };
        self.image.member_refs.push(row);
        Ok(())
    }

    #[allow(clippy::panic, reason = "method spec rows are only reserved for generic instances")]
    fn method_spec(&mut self, member: MemberRefId) -> Result<(), EmitError> {
        let session = self.session;
        let symbols = session.symbols();
        let EmitSymbol::GenericInstance(instance) = EmitSymbol::for_member(symbols, member) else {
            panic!("COMPILER BUG: method spec row for non-generic member {member:?}");
        };
        let instantiation = self.encoder.method_spec(&instance.generic_args())?;
        let row = MethodSpecRow {
            method: self.token(RefKey::Member(instance.generic_method()))?,
            instantiation: self.blobs.add(instantiation)?,
        };
        self.image.method_specs.push(row);
        Ok(())
    }
}
