//! Bound-program symbol model
//!
//! The emission core sees the program through this model: assemblies,
//! modules, type definitions with their fields and methods, interned types
//! and interned member references. Definitions are added while the table is
//! exclusively owned; types and member references can be interned through a
//! shared reference, so one table can be handed to every emission worker.

pub mod display;
pub mod intern;
pub mod member;
pub mod ty;
pub mod type_map;

pub use cv_intern::{Interner, Symbol};
pub use intern::InternTable;
pub use member::{MemberRef, MemberRefId};
pub use ty::{Primitive, TyId, TyKind};
pub use type_map::TypeMap;

use la_arena::{Arena, Idx};

/// Assembly id
pub type AssemblyId = Idx<AssemblyDef>;
/// Module id
pub type ModuleId = Idx<ModuleDef>;
/// File id
pub type FileId = Idx<FileDef>;
/// Type definition id
pub type TypeDefId = Idx<TypeDef>;
/// Field definition id
pub type FieldId = Idx<FieldDef>;
/// Method definition id
pub type MethodId = Idx<MethodDef>;

/// An assembly: the unit of versioning and deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyDef {
    /// Simple name
    pub name: Symbol,
    /// Major, minor, build, revision
    pub version: [u16; 4],
}

/// A module: one file of compiled code inside an assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDef {
    /// Module name
    pub name: Symbol,
    /// Owning assembly
    pub assembly: AssemblyId,
    /// File entry listing this module in its assembly's manifest
    pub file: FileId,
}

/// A file entry in an assembly manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDef {
    /// File name
    pub name: Symbol,
    /// Owning assembly
    pub assembly: AssemblyId,
    /// Whether the file carries metadata (modules do, resources do not)
    pub contains_metadata: bool,
}

/// A type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Simple name, including any generic arity suffix
    pub name: Symbol,
    /// Namespace; nested types have none
    pub namespace: Option<Symbol>,
    /// Defining module
    pub module: ModuleId,
    /// Enclosing type for nested types
    pub enclosing: Option<TypeDefId>,
    /// Number of generic parameters
    pub generic_arity: u32,
    /// Whether instances are stored inline
    pub is_value_type: bool,
    /// Base type, if any
    pub base: Option<TyId>,
    /// Declared fields, in declaration order
    pub fields: Vec<FieldId>,
    /// Declared methods, in declaration order
    pub methods: Vec<MethodId>,
}

/// A field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: Symbol,
    /// Declaring type
    pub owner: TypeDefId,
    /// Field type
    pub ty: TyId,
    /// Static fields have no receiver
    pub is_static: bool,
}

/// A formal parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    /// Parameter name
    pub name: Symbol,
    /// Parameter type; may be by-ref
    pub ty: TyId,
}

/// A method definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name
    pub name: Symbol,
    /// Declaring type
    pub owner: TypeDefId,
    /// Formal parameters
    pub params: Vec<ParamDef>,
    /// Return type
    pub ret: TyId,
    /// Number of method generic parameters
    pub generic_arity: u32,
    /// Static methods have no receiver
    pub is_static: bool,
}

/// The symbol table of one compilation
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// String interner for all names
    pub interner: Interner,
    /// Assemblies, including the one being emitted
    pub assemblies: Arena<AssemblyDef>,
    /// Modules of all assemblies
    pub modules: Arena<ModuleDef>,
    /// Manifest file entries
    pub files: Arena<FileDef>,
    /// Type definitions
    pub type_defs: Arena<TypeDef>,
    /// Field definitions
    pub fields: Arena<FieldDef>,
    /// Method definitions
    pub methods: Arena<MethodDef>,
    types: InternTable<TyKind>,
    members: InternTable<MemberRef>,
}

impl SymbolTable {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assembly with version 1.0.0.0
    pub fn add_assembly(&mut self, name: &str) -> AssemblyId {
        self.add_assembly_with_version(name, [1, 0, 0, 0])
    }

    /// Adds an assembly with an explicit version
    pub fn add_assembly_with_version(&mut self, name: &str, version: [u16; 4]) -> AssemblyId {
        let name = self.interner.intern(name);
        self.assemblies.alloc(AssemblyDef { name, version })
    }

    /// Adds a module to an assembly, along with its manifest file entry
    pub fn add_module(&mut self, assembly: AssemblyId, name: &str) -> ModuleId {
        let name = self.interner.intern(name);
        let file = self.files.alloc(FileDef {
            name,
            assembly,
            contains_metadata: true,
        });
        self.modules.alloc(ModuleDef {
            name,
            assembly,
            file,
        })
    }

    /// Adds a top-level type definition
    pub fn add_type(
        &mut self,
        module: ModuleId,
        namespace: Option<&str>,
        name: &str,
        generic_arity: u32,
    ) -> TypeDefId {
        let namespace = namespace.map(|ns| self.interner.intern(ns));
        let name = self.interner.intern(name);
        self.type_defs.alloc(TypeDef {
            name,
            namespace,
            module,
            enclosing: None,
            generic_arity,
            is_value_type: false,
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
        })
    }

    /// Adds a type nested inside `enclosing`, in the same module
    pub fn add_nested_type(
        &mut self,
        enclosing: TypeDefId,
        name: &str,
        generic_arity: u32,
    ) -> TypeDefId {
        let module = self.type_defs[enclosing].module;
        let name = self.interner.intern(name);
        self.type_defs.alloc(TypeDef {
            name,
            namespace: None,
            module,
            enclosing: Some(enclosing),
            generic_arity,
            is_value_type: false,
            base: None,
            fields: Vec::new(),
            methods: Vec::new(),
        })
    }

    /// Adds an instance field
    pub fn add_field(&mut self, owner: TypeDefId, name: &str, ty: TyId) -> FieldId {
        let name = self.interner.intern(name);
        let field = self.fields.alloc(FieldDef {
            name,
            owner,
            ty,
            is_static: false,
        });
        self.type_defs[owner].fields.push(field);
        field
    }

    /// Adds an instance method
    pub fn add_method(
        &mut self,
        owner: TypeDefId,
        name: &str,
        params: &[(&str, TyId)],
        ret: TyId,
    ) -> MethodId {
        self.add_generic_method(owner, name, 0, params, ret)
    }

    /// Adds an instance method with method generic parameters
    pub fn add_generic_method(
        &mut self,
        owner: TypeDefId,
        name: &str,
        generic_arity: u32,
        params: &[(&str, TyId)],
        ret: TyId,
    ) -> MethodId {
        let name = self.interner.intern(name);
        let params = params
            .iter()
            .map(|&(param_name, ty)| ParamDef {
                name: self.interner.intern(param_name),
                ty,
            })
            .collect();
        let method = self.methods.alloc(MethodDef {
            name,
            owner,
            params,
            ret,
            generic_arity,
            is_static: false,
        });
        self.type_defs[owner].methods.push(method);
        method
    }

    // Types

    /// Interns an arbitrary type
    pub fn intern_ty(&self, kind: TyKind) -> TyId {
        self.types.intern(kind)
    }

    /// Returns the kind of an interned type
    #[must_use]
    pub fn ty_kind(&self, ty: TyId) -> TyKind {
        self.types.get(ty)
    }

    /// Number of distinct interned types
    #[must_use]
    pub fn ty_count(&self) -> usize {
        self.types.len()
    }

    /// Built-in type
    pub fn primitive(&self, primitive: Primitive) -> TyId {
        self.intern_ty(TyKind::Primitive(primitive))
    }

    /// Type definition used as a type
    pub fn named(&self, def: TypeDefId) -> TyId {
        self.intern_ty(TyKind::Named(def))
    }

    /// Generic instantiation
    pub fn instance(&self, def: TypeDefId, args: Vec<TyId>) -> TyId {
        self.intern_ty(TyKind::Instance { def, args })
    }

    /// Type generic parameter `!index`
    pub fn type_param(&self, index: u32) -> TyId {
        self.intern_ty(TyKind::TypeParam(index))
    }

    /// Method generic parameter `!!index`
    pub fn method_param(&self, index: u32) -> TyId {
        self.intern_ty(TyKind::MethodParam(index))
    }

    /// Zero-based single-dimensional array
    pub fn vector(&self, element: TyId) -> TyId {
        self.intern_ty(TyKind::Vector { element })
    }

    /// Multi-dimensional array
    pub fn array(&self, element: TyId, rank: u32) -> TyId {
        self.intern_ty(TyKind::Array { element, rank })
    }

    /// Unmanaged pointer
    pub fn pointer(&self, pointee: TyId) -> TyId {
        self.intern_ty(TyKind::Pointer { pointee })
    }

    /// Managed pointer
    pub fn by_ref(&self, referent: TyId) -> TyId {
        self.intern_ty(TyKind::ByRef { referent })
    }

    // Member references

    /// Interns a member reference
    pub fn intern_member(&self, member: MemberRef) -> MemberRefId {
        self.members.intern(member)
    }

    /// Returns an interned member reference
    #[must_use]
    pub fn member(&self, id: MemberRefId) -> MemberRef {
        self.members.get(id)
    }

    /// Reference to a field on its declaring type
    pub fn field_ref(&self, field: FieldId) -> MemberRefId {
        self.intern_member(MemberRef::Field(field))
    }

    /// Reference to a method on its declaring type
    pub fn method_ref(&self, method: MethodId) -> MemberRefId {
        self.intern_member(MemberRef::Method(method))
    }

    /// Field seen through an instantiated container
    pub fn specialized_field(&self, field: FieldId, container: TyId) -> MemberRefId {
        self.intern_member(MemberRef::SpecializedField { field, container })
    }

    /// Method seen through an instantiated container
    pub fn specialized_method(&self, method: MethodId, container: TyId) -> MemberRefId {
        self.intern_member(MemberRef::SpecializedMethod { method, container })
    }

    /// Generic method instantiation
    pub fn method_instance(&self, method: MemberRefId, args: Vec<TyId>) -> MemberRefId {
        self.intern_member(MemberRef::MethodInstance { method, args })
    }

    // Queries

    /// Whether a type definition is defined in `module`
    #[must_use]
    pub fn is_defined_in(&self, def: TypeDefId, module: ModuleId) -> bool {
        self.type_defs[def].module == module
    }

    /// Assembly that defines a type
    #[must_use]
    pub fn assembly_of(&self, def: TypeDefId) -> AssemblyId {
        self.modules[self.type_defs[def].module].assembly
    }

    /// Type definitions of a module, in definition order
    pub fn type_defs_in(&self, module: ModuleId) -> impl Iterator<Item = TypeDefId> + '_ {
        self.type_defs
            .iter()
            .filter(move |(_, def)| def.module == module)
            .map(|(id, _)| id)
    }

    /// Declaring type of a member reference's definition
    ///
    /// For generic method instances this is the declaring type of the
    /// underlying generic method.
    #[must_use]
    pub fn member_owner(&self, member: MemberRefId) -> TypeDefId {
        match self.member(member) {
            MemberRef::Field(field) | MemberRef::SpecializedField { field, .. } => {
                self.fields[field].owner
            }
            MemberRef::Method(method) | MemberRef::SpecializedMethod { method, .. } => {
                self.methods[method].owner
            }
            MemberRef::MethodInstance { method, .. } => self.member_owner(method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_interned_structurally() {
        let symbols = SymbolTable::new();
        let int32 = symbols.primitive(Primitive::I4);
        let first = symbols.array(int32, 2);
        let second = symbols.array(symbols.primitive(Primitive::I4), 2);
        assert_eq!(first, second);
        assert_ne!(first, symbols.array(int32, 3));
    }

    #[test]
    fn test_definitions_are_registered_with_owner() {
        let mut symbols = SymbolTable::new();
        let app = symbols.add_assembly("app");
        let module = symbols.add_module(app, "app.dll");
        let program = symbols.add_type(module, Some("App"), "Program", 0);
        let int32 = symbols.primitive(Primitive::I4);
        let field = symbols.add_field(program, "count", int32);
        let method = symbols.add_method(program, "Run", &[("limit", int32)], int32);

        assert_eq!(symbols.type_defs[program].fields, vec![field]);
        assert_eq!(symbols.type_defs[program].methods, vec![method]);
        assert_eq!(symbols.member_owner(symbols.method_ref(method)), program);
        assert!(symbols.is_defined_in(program, module));
        assert_eq!(symbols.type_defs_in(module).collect::<Vec<_>>(), vec![program]);
    }

    #[test]
    fn test_specialized_members_unspecialize() {
        let mut symbols = SymbolTable::new();
        let corlib = symbols.add_assembly("corlib");
        let module = symbols.add_module(corlib, "corlib.dll");
        let list = symbols.add_type(module, Some("Collections"), "List`1", 1);
        let void = symbols.primitive(Primitive::Void);
        let add = symbols.add_method(list, "Add", &[("item", symbols.type_param(0))], void);
        let container = symbols.instance(list, vec![symbols.primitive(Primitive::String)]);

        let specialized = symbols.specialized_method(add, container);
        assert_eq!(
            symbols.member(specialized).unspecialized(),
            Some(MemberRef::Method(add))
        );
    }
}
