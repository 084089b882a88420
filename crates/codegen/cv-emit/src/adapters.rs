//! Symbol emission adapters
//!
//! The table writer never matches on raw symbol-table entries. It wraps the
//! thing being written in an [`EmitSymbol`] and asks for capabilities: a name,
//! a type, a signature, a containing type, generic arguments. Each adapter
//! implements only the capabilities its symbol has.

use cv_symbols::{
    FieldId, MemberRef, MemberRefId, MethodId, SymbolTable, TyId, TypeDefId, TypeMap,
};

/// Something with a metadata name
pub trait EmitNamed {
    /// Simple name
    fn name(&self) -> String;
}

/// Something with a single type
pub trait EmitTyped {
    /// Declared type
    fn ty(&self) -> TyId;
}

/// Something with a method signature
pub trait EmitSignature {
    /// Parameter types, excluding the receiver
    fn params(&self) -> Vec<TyId>;
    /// Return type
    fn ret(&self) -> TyId;
    /// Whether calls pass a receiver
    fn has_this(&self) -> bool;
    /// Number of method generic parameters
    fn generic_arity(&self) -> u32;
}

/// A member that lives in a type
pub trait EmitContainer {
    /// Type the member is referenced through
    fn container(&self) -> TyId;
}

/// A generic instantiation
pub trait EmitGeneric {
    /// Generic arguments
    fn generic_args(&self) -> Vec<TyId>;
}

/// Field definition
#[derive(Debug, Clone, Copy)]
pub struct FieldAdapter<'sym> {
    symbols: &'sym SymbolTable,
    field: FieldId,
}

impl<'sym> FieldAdapter<'sym> {
    /// Wraps a field
    #[must_use]
    pub fn new(symbols: &'sym SymbolTable, field: FieldId) -> Self {
        Self { symbols, field }
    }
}

impl EmitNamed for FieldAdapter<'_> {
    fn name(&self) -> String {
        self.symbols
            .interner
            .resolve(self.symbols.fields[self.field].name)
    }
}

impl EmitTyped for FieldAdapter<'_> {
    fn ty(&self) -> TyId {
        self.symbols.fields[self.field].ty
    }
}

impl EmitContainer for FieldAdapter<'_> {
    fn container(&self) -> TyId {
        self.symbols.named(self.symbols.fields[self.field].owner)
    }
}

/// Method definition
#[derive(Debug, Clone, Copy)]
pub struct MethodAdapter<'sym> {
    symbols: &'sym SymbolTable,
    method: MethodId,
}

impl<'sym> MethodAdapter<'sym> {
    /// Wraps a method
    #[must_use]
    pub fn new(symbols: &'sym SymbolTable, method: MethodId) -> Self {
        Self { symbols, method }
    }

    /// Adapters for each formal parameter
    pub fn parameters(&self) -> impl Iterator<Item = ParameterAdapter<'sym>> + '_ {
        (0..self.symbols.methods[self.method].params.len())
            .map(|index| ParameterAdapter::new(self.symbols, self.method, index))
    }
}

impl EmitNamed for MethodAdapter<'_> {
    fn name(&self) -> String {
        self.symbols
            .interner
            .resolve(self.symbols.methods[self.method].name)
    }
}

impl EmitSignature for MethodAdapter<'_> {
    fn params(&self) -> Vec<TyId> {
        self.symbols.methods[self.method]
            .params
            .iter()
            .map(|param| param.ty)
            .collect()
    }

    fn ret(&self) -> TyId {
        self.symbols.methods[self.method].ret
    }

    fn has_this(&self) -> bool {
        !self.symbols.methods[self.method].is_static
    }

    fn generic_arity(&self) -> u32 {
        self.symbols.methods[self.method].generic_arity
    }
}

impl EmitContainer for MethodAdapter<'_> {
    fn container(&self) -> TyId {
        self.symbols.named(self.symbols.methods[self.method].owner)
    }
}

/// Formal parameter of a method
#[derive(Debug, Clone, Copy)]
pub struct ParameterAdapter<'sym> {
    symbols: &'sym SymbolTable,
    method: MethodId,
    index: usize,
}

impl<'sym> ParameterAdapter<'sym> {
    /// Wraps the `index`th parameter of `method`
    #[must_use]
    pub fn new(symbols: &'sym SymbolTable, method: MethodId, index: usize) -> Self {
        Self {
            symbols,
            method,
            index,
        }
    }
}

impl EmitNamed for ParameterAdapter<'_> {
    fn name(&self) -> String {
        self.symbols
            .interner
            .resolve(self.symbols.methods[self.method].params[self.index].name)
    }
}

impl EmitTyped for ParameterAdapter<'_> {
    fn ty(&self) -> TyId {
        self.symbols.methods[self.method].params[self.index].ty
    }
}

/// Type definition
#[derive(Debug, Clone, Copy)]
pub struct TypeAdapter<'sym> {
    symbols: &'sym SymbolTable,
    def: TypeDefId,
}

impl<'sym> TypeAdapter<'sym> {
    /// Wraps a type definition
    #[must_use]
    pub fn new(symbols: &'sym SymbolTable, def: TypeDefId) -> Self {
        Self { symbols, def }
    }

    /// Namespace; empty for nested types
    #[must_use]
    pub fn namespace(&self) -> String {
        self.symbols.type_defs[self.def]
            .namespace
            .map(|namespace| self.symbols.interner.resolve(namespace))
            .unwrap_or_default()
    }

    /// Base type
    #[must_use]
    pub fn base(&self) -> Option<TyId> {
        self.symbols.type_defs[self.def].base
    }

    /// Enclosing type definition of a nested type
    #[must_use]
    pub fn enclosing(&self) -> Option<TypeDefId> {
        self.symbols.type_defs[self.def].enclosing
    }

    /// Adapters for the declared fields
    pub fn fields(&self) -> impl Iterator<Item = FieldAdapter<'sym>> + '_ {
        self.symbols.type_defs[self.def]
            .fields
            .iter()
            .map(|&field| FieldAdapter::new(self.symbols, field))
    }

    /// Adapters for the declared methods
    pub fn methods(&self) -> impl Iterator<Item = MethodAdapter<'sym>> + '_ {
        self.symbols.type_defs[self.def]
            .methods
            .iter()
            .map(|&method| MethodAdapter::new(self.symbols, method))
    }
}

impl EmitNamed for TypeAdapter<'_> {
    fn name(&self) -> String {
        self.symbols
            .interner
            .resolve(self.symbols.type_defs[self.def].name)
    }
}

/// Generic method instantiation
#[derive(Debug, Clone)]
pub struct GenericInstanceAdapter<'sym> {
    symbols: &'sym SymbolTable,
    method: MemberRefId,
    args: Vec<TyId>,
}

impl<'sym> GenericInstanceAdapter<'sym> {
    /// Wraps an instantiation of `method` with `args`
    #[must_use]
    pub fn new(symbols: &'sym SymbolTable, method: MemberRefId, args: Vec<TyId>) -> Self {
        Self {
            symbols,
            method,
            args,
        }
    }

    /// The generic method being instantiated
    #[must_use]
    pub fn generic_method(&self) -> MemberRefId {
        self.method
    }

    fn definition(&self) -> MethodAdapter<'sym> {
        MethodAdapter::new(self.symbols, method_def(self.symbols, self.method))
    }
}

impl EmitNamed for GenericInstanceAdapter<'_> {
    fn name(&self) -> String {
        self.definition().name()
    }
}

impl EmitGeneric for GenericInstanceAdapter<'_> {
    fn generic_args(&self) -> Vec<TyId> {
        self.args.clone()
    }
}

impl EmitSignature for GenericInstanceAdapter<'_> {
    fn params(&self) -> Vec<TyId> {
        self.definition().params()
    }

    fn ret(&self) -> TyId {
        self.definition().ret()
    }

    fn has_this(&self) -> bool {
        self.definition().has_this()
    }

    fn generic_arity(&self) -> u32 {
        self.definition().generic_arity()
    }
}

/// Field or method seen through an instantiated container
///
/// The serialized signature is the unspecialized one; [`Self::substituted_params`]
/// and friends give the view with the container's arguments applied.
#[derive(Debug, Clone)]
pub struct SpecializedAdapter<'sym> {
    symbols: &'sym SymbolTable,
    member: Specialized,
    container: TyId,
    type_map: TypeMap,
}

#[derive(Debug, Clone, Copy)]
enum Specialized {
    Field(FieldId),
    Method(MethodId),
}

impl<'sym> SpecializedAdapter<'sym> {
    /// Wraps a specialized field
    #[must_use]
    pub fn field(symbols: &'sym SymbolTable, field: FieldId, container: TyId) -> Self {
        Self::new(symbols, Specialized::Field(field), container)
    }

    /// Wraps a specialized method
    #[must_use]
    pub fn method(symbols: &'sym SymbolTable, method: MethodId, container: TyId) -> Self {
        Self::new(symbols, Specialized::Method(method), container)
    }

    fn new(symbols: &'sym SymbolTable, member: Specialized, container: TyId) -> Self {
        Self {
            symbols,
            member,
            container,
            type_map: TypeMap::for_container(symbols, container),
        }
    }

    /// Whether this is a specialized field
    #[must_use]
    pub fn is_field(&self) -> bool {
        matches!(self.member, Specialized::Field(_))
    }

    /// The generic-definition form
    #[must_use]
    pub fn unspecialized(&self) -> MemberRef {
        match self.member {
            Specialized::Field(field) => MemberRef::Field(field),
            Specialized::Method(method) => MemberRef::Method(method),
        }
    }

    /// Substitution applied by the container
    #[must_use]
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Field type with the container's arguments applied
    #[must_use]
    pub fn substituted_ty(&self) -> TyId {
        self.type_map.substitute(self.symbols, self.ty())
    }

    /// Parameter types with the container's arguments applied
    #[must_use]
    pub fn substituted_params(&self) -> Vec<TyId> {
        self.params()
            .into_iter()
            .map(|ty| self.type_map.substitute(self.symbols, ty))
            .collect()
    }

    /// Return type with the container's arguments applied
    #[must_use]
    pub fn substituted_ret(&self) -> TyId {
        self.type_map.substitute(self.symbols, self.ret())
    }
}

impl EmitNamed for SpecializedAdapter<'_> {
    fn name(&self) -> String {
        match self.member {
            Specialized::Field(field) => FieldAdapter::new(self.symbols, field).name(),
            Specialized::Method(method) => MethodAdapter::new(self.symbols, method).name(),
        }
    }
}

impl EmitContainer for SpecializedAdapter<'_> {
    fn container(&self) -> TyId {
        self.container
    }
}

impl EmitTyped for SpecializedAdapter<'_> {
    /// Unspecialized field type; the return type for methods
    fn ty(&self) -> TyId {
        match self.member {
            Specialized::Field(field) => self.symbols.fields[field].ty,
            Specialized::Method(method) => self.symbols.methods[method].ret,
        }
    }
}

impl EmitSignature for SpecializedAdapter<'_> {
    fn params(&self) -> Vec<TyId> {
        match self.member {
            Specialized::Field(_) => Vec::new(),
            Specialized::Method(method) => MethodAdapter::new(self.symbols, method).params(),
        }
    }

    fn ret(&self) -> TyId {
        self.ty()
    }

    fn has_this(&self) -> bool {
        match self.member {
            Specialized::Field(field) => !self.symbols.fields[field].is_static,
            Specialized::Method(method) => !self.symbols.methods[method].is_static,
        }
    }

    fn generic_arity(&self) -> u32 {
        match self.member {
            Specialized::Field(_) => 0,
            Specialized::Method(method) => self.symbols.methods[method].generic_arity,
        }
    }
}

/// The closed set of symbols the table writer emits
#[derive(Debug, Clone)]
pub enum EmitSymbol<'sym> {
    /// Field definition
    Field(FieldAdapter<'sym>),
    /// Method definition
    Method(MethodAdapter<'sym>),
    /// Type definition
    Type(TypeAdapter<'sym>),
    /// Formal parameter
    Parameter(ParameterAdapter<'sym>),
    /// Generic method instantiation
    GenericInstance(GenericInstanceAdapter<'sym>),
    /// Member seen through an instantiated container
    Specialized(SpecializedAdapter<'sym>),
}

impl<'sym> EmitSymbol<'sym> {
    /// Adapter for an interned member reference
    #[must_use]
    pub fn for_member(symbols: &'sym SymbolTable, member: MemberRefId) -> Self {
        match symbols.member(member) {
            MemberRef::Field(field) => Self::Field(FieldAdapter::new(symbols, field)),
            MemberRef::Method(method) => Self::Method(MethodAdapter::new(symbols, method)),
            MemberRef::SpecializedField { field, container } => {
                Self::Specialized(SpecializedAdapter::field(symbols, field, container))
            }
            MemberRef::SpecializedMethod { method, container } => {
                Self::Specialized(SpecializedAdapter::method(symbols, method, container))
            }
            MemberRef::MethodInstance { method, args } => {
                Self::GenericInstance(GenericInstanceAdapter::new(symbols, method, args))
            }
        }
    }

    /// Adapter for a type definition
    #[must_use]
    pub fn for_type(symbols: &'sym SymbolTable, def: TypeDefId) -> Self {
        Self::Type(TypeAdapter::new(symbols, def))
    }

    /// Name capability; every symbol has one
    #[must_use]
    pub fn named(&self) -> &dyn EmitNamed {
        match self {
            Self::Field(field) => field,
            Self::Method(method) => method,
            Self::Type(ty) => ty,
            Self::Parameter(param) => param,
            Self::GenericInstance(instance) => instance,
            Self::Specialized(specialized) => specialized,
        }
    }

    /// Single-type capability
    #[must_use]
    pub fn typed(&self) -> Option<&dyn EmitTyped> {
        match self {
            Self::Field(field) => Some(field),
            Self::Parameter(param) => Some(param),
            Self::Specialized(specialized) if specialized.is_field() => Some(specialized),
            Self::Method(_) | Self::Type(_) | Self::GenericInstance(_) | Self::Specialized(_) => {
                None
            }
        }
    }

    /// Method signature capability
    #[must_use]
    pub fn signature(&self) -> Option<&dyn EmitSignature> {
        match self {
            Self::Method(method) => Some(method),
            Self::GenericInstance(instance) => Some(instance),
            Self::Specialized(specialized) if !specialized.is_field() => Some(specialized),
            Self::Field(_) | Self::Type(_) | Self::Parameter(_) | Self::Specialized(_) => None,
        }
    }

    /// Containing type capability
    #[must_use]
    pub fn container(&self) -> Option<&dyn EmitContainer> {
        match self {
            Self::Field(field) => Some(field),
            Self::Method(method) => Some(method),
            Self::Specialized(specialized) => Some(specialized),
            Self::Type(_) | Self::Parameter(_) | Self::GenericInstance(_) => None,
        }
    }

    /// Generic argument capability
    #[must_use]
    pub fn generic(&self) -> Option<&dyn EmitGeneric> {
        match self {
            Self::GenericInstance(instance) => Some(instance),
            Self::Field(_)
            | Self::Method(_)
            | Self::Type(_)
            | Self::Parameter(_)
            | Self::Specialized(_) => None,
        }
    }
}

/// Method definition behind a possibly specialized method reference
///
/// # Panics
/// If `method` does not name a method
#[allow(clippy::panic, reason = "generic instances always wrap a method reference")]
pub(crate) fn method_def(symbols: &SymbolTable, method: MemberRefId) -> MethodId {
    match symbols.member(method) {
        MemberRef::Method(method) | MemberRef::SpecializedMethod { method, .. } => method,
        other => panic!("COMPILER BUG: generic instance over non-method {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_symbols::Primitive;

    #[test]
    fn test_specialized_method_keeps_open_signature() {
        let mut symbols = SymbolTable::new();
        let corlib = symbols.add_assembly("corlib");
        let module = symbols.add_module(corlib, "corlib.dll");
        let list = symbols.add_type(module, Some("Collections"), "List`1", 1);
        let param = symbols.type_param(0);
        let void = symbols.primitive(Primitive::Void);
        let add = symbols.add_method(list, "Add", &[("item", param)], void);
        let string = symbols.primitive(Primitive::String);
        let container = symbols.instance(list, vec![string]);

        let member = symbols.specialized_method(add, container);
        let symbol = EmitSymbol::for_member(&symbols, member);

        assert_eq!(symbol.named().name(), "Add");
        assert!(symbol.typed().is_none());
        assert_eq!(symbol.container().map(EmitContainer::container), Some(container));
        assert!(matches!(symbol, EmitSymbol::Specialized(_)));

        let specialized = SpecializedAdapter::method(&symbols, add, container);
        assert_eq!(specialized.params(), vec![param]);
        assert_eq!(specialized.substituted_params(), vec![string]);
        assert_eq!(specialized.unspecialized(), MemberRef::Method(add));
    }

    #[test]
    fn test_generic_instance_exposes_arguments() {
        let mut symbols = SymbolTable::new();
        let corlib = symbols.add_assembly("corlib");
        let module = symbols.add_module(corlib, "corlib.dll");
        let enumerable = symbols.add_type(module, Some("Linq"), "Enumerable", 0);
        let method_param = symbols.method_param(0);
        let empty = symbols.add_generic_method(
            enumerable,
            "Empty",
            1,
            &[],
            symbols.vector(method_param),
        );
        let int32 = symbols.primitive(Primitive::I4);
        let instance = symbols.method_instance(symbols.method_ref(empty), vec![int32]);

        let symbol = EmitSymbol::for_member(&symbols, instance);
        assert_eq!(symbol.named().name(), "Empty");
        assert!(symbol.container().is_none());
        assert_eq!(symbol.generic().map(EmitGeneric::generic_args), Some(vec![int32]));
        assert_eq!(symbol.signature().map(EmitSignature::generic_arity), Some(1));
    }

    #[test]
    fn test_type_adapter_lists_members() {
        let mut symbols = SymbolTable::new();
        let app = symbols.add_assembly("app");
        let module = symbols.add_module(app, "app.dll");
        let program = symbols.add_type(module, Some("App"), "Program", 0);
        let int32 = symbols.primitive(Primitive::I4);
        symbols.add_field(program, "count", int32);
        let run = symbols.add_method(program, "Run", &[("limit", int32)], int32);

        let adapter = TypeAdapter::new(&symbols, program);
        assert_eq!(adapter.namespace(), "App");
        assert_eq!(adapter.fields().map(|field| field.name()).collect::<Vec<_>>(), ["count"]);
        let method = MethodAdapter::new(&symbols, run);
        let names: Vec<_> = method.parameters().map(|param| param.name()).collect();
        assert_eq!(names, ["limit"]);
        assert!(method.has_this());
    }
}
