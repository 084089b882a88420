//! Reference indexing and table emission
//!
//! An [`EmitSession`] covers one output module. Its [`ReferenceIndexer`] is
//! shared by the workers that walk definitions and bodies; every reference
//! they meet receives exactly one token, and [`TablesImage::build`] then lays
//! the referenced entities out in token order.
//!
//! ```text
//! SymbolTable ──► ReferenceIndexer ──► TokenTable ──► TablesImage
//!                      │
//!                      └──► ArrayMethodCache
//! ```

pub mod adapters;
pub mod array_methods;
pub mod definitions;
pub mod error;
pub mod indexer;
pub mod signature;
pub mod tables;
pub mod tokens;

pub use adapters::EmitSymbol;
pub use array_methods::{ArrayMethod, ArrayMethodCache, ArrayMethodKind};
pub use definitions::DefinitionTokens;
pub use error::EmitError;
pub use indexer::ReferenceIndexer;
pub use tables::TablesImage;
pub use tokens::{RefKey, TableKind, Token, TokenTable};

use cv_symbols::{ModuleId, SymbolTable};
use std::sync::Arc;

/// Emission state for one output module
#[derive(Debug)]
pub struct EmitSession {
    symbols: Arc<SymbolTable>,
    module: ModuleId,
    array_methods: Arc<ArrayMethodCache>,
    tokens: Arc<TokenTable>,
    definitions: DefinitionTokens,
    indexer: ReferenceIndexer,
}

impl EmitSession {
    /// Creates a session with a fresh pseudo-method cache
    #[must_use]
    pub fn new(symbols: Arc<SymbolTable>, module: ModuleId) -> Self {
        Self::with_array_methods(symbols, module, Arc::new(ArrayMethodCache::new()))
    }

    /// Creates a session sharing an existing pseudo-method cache
    #[must_use]
    pub fn with_array_methods(
        symbols: Arc<SymbolTable>,
        module: ModuleId,
        array_methods: Arc<ArrayMethodCache>,
    ) -> Self {
        let tokens = Arc::new(TokenTable::new());
        let definitions = DefinitionTokens::collect(&symbols, module);
        let indexer = ReferenceIndexer::new(
            Arc::clone(&symbols),
            Arc::clone(&array_methods),
            Arc::clone(&tokens),
            module,
        );
        Self {
            symbols,
            module,
            array_methods,
            tokens,
            definitions,
            indexer,
        }
    }

    /// Symbol table being emitted
    #[must_use]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Output module
    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Shared indexer
    #[must_use]
    pub fn indexer(&self) -> &ReferenceIndexer {
        &self.indexer
    }

    /// Reserved reference tokens
    #[must_use]
    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }

    /// Pseudo-method cache
    #[must_use]
    pub fn array_methods(&self) -> &ArrayMethodCache {
        &self.array_methods
    }

    /// Tokens of the module's own definitions
    #[must_use]
    pub fn definitions(&self) -> &DefinitionTokens {
        &self.definitions
    }

    /// Token for `key`: its definition token when it names a local
    /// definition, otherwise its reference token, reserved on first request
    ///
    /// # Errors
    /// Returns `EmitError::TableFull` when the reference table has no rows left
    pub fn token(&self, key: RefKey) -> Result<Token, EmitError> {
        match self.definitions.lookup(&self.symbols, key) {
            Some(token) => Ok(token),
            None => self.tokens.reserve(key, key.table(&self.symbols)),
        }
    }

    /// Token for `key` if it has one, without reserving
    #[must_use]
    pub fn lookup(&self, key: RefKey) -> Option<Token> {
        self.definitions
            .lookup(&self.symbols, key)
            .or_else(|| self.tokens.get(key))
    }

    /// Lays out the tables image
    ///
    /// # Errors
    /// Returns `EmitError::MissingToken` when something written was never
    /// indexed
    pub fn build_image(&self) -> Result<TablesImage, EmitError> {
        TablesImage::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_bound::{BodyBuilder, Expr, Place, Stmt};
    use cv_symbols::{MemberRef, Primitive, TypeDefId};
    use std::thread;

    struct Fixture {
        symbols: SymbolTable,
        module: ModuleId,
        list: TypeDefId,
        program: TypeDefId,
    }

    /// `app.dll` defining `App.Program`, referencing `corlib`'s `List`1`
    fn fixture() -> Fixture {
        let mut symbols = SymbolTable::new();
        let corlib = symbols.add_assembly("corlib");
        let corlib_module = symbols.add_module(corlib, "corlib.dll");
        let list = symbols.add_type(corlib_module, Some("Collections"), "List`1", 1);
        let param = symbols.type_param(0);
        let void = symbols.primitive(Primitive::Void);
        symbols.add_method(list, "Add", &[("item", param)], void);
        symbols.add_field(list, "_items", symbols.vector(param));

        let app = symbols.add_assembly("app");
        let module = symbols.add_module(app, "app.dll");
        let program = symbols.add_type(module, Some("App"), "Program", 0);
        symbols.add_method(program, "Main", &[], void);

        Fixture {
            symbols,
            module,
            list,
            program,
        }
    }

    #[test]
    fn test_visiting_twice_yields_one_token() {
        let fixture = fixture();
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let list = symbols.instance(fixture.list, vec![symbols.primitive(Primitive::I4)]);

        session.indexer().visit_type_reference(list).unwrap();
        let count = session.tokens().len();
        session.indexer().visit_type_reference(list).unwrap();

        assert_eq!(session.tokens().len(), count);
        assert_eq!(session.tokens().rows(TableKind::TypeSpec), vec![RefKey::Type(list)]);
        // Generic definition, its assembly, and the instantiation
        assert_eq!(session.tokens().rows(TableKind::TypeRef).len(), 1);
        assert_eq!(session.tokens().rows(TableKind::AssemblyRef).len(), 1);
    }

    #[test]
    fn test_specialized_member_tokens_its_definition() {
        let fixture = fixture();
        let add = fixture.symbols.type_defs[fixture.list].methods[0];
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let container = symbols.instance(fixture.list, vec![symbols.primitive(Primitive::String)]);
        let specialized = symbols.specialized_method(add, container);

        session.indexer().visit_member_reference(specialized).unwrap();

        let unspecialized = symbols.intern_member(MemberRef::Method(add));
        assert!(session.lookup(RefKey::Member(specialized)).is_some());
        assert!(session.lookup(RefKey::Member(unspecialized)).is_some());
        assert!(session.lookup(RefKey::Type(container)).is_some());
        assert!(
            session.tokens().get(RefKey::Member(unspecialized))
                < session.tokens().get(RefKey::Member(specialized))
        );
    }

    #[test]
    fn test_signature_visit_then_token_visit() {
        let fixture = fixture();
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let vector = symbols.vector(symbols.named(fixture.list));
        let key = RefKey::Type(vector);

        session.indexer().visit_signature_type(vector).unwrap();
        assert!(session.indexer().has_seen(key));
        assert_eq!(session.lookup(key), None);

        session.indexer().visit_type_reference(vector).unwrap();
        assert_eq!(session.lookup(key), Some(Token::new(TableKind::TypeSpec, 1)));
        assert_eq!(session.tokens().rows(TableKind::TypeSpec).len(), 1);
    }

    #[test]
    fn test_local_definitions_use_definition_tokens() {
        let fixture = fixture();
        let main = fixture.symbols.type_defs[fixture.program].methods[0];
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let main_ref = symbols.method_ref(main);

        session.indexer().visit_member_reference(main_ref).unwrap();
        session
            .indexer()
            .visit_type_reference(symbols.named(fixture.program))
            .unwrap();

        assert!(session.tokens().is_empty());
        assert_eq!(
            session.token(RefKey::Member(main_ref)).ok(),
            Some(Token::new(TableKind::MethodDef, 1))
        );
        assert_eq!(
            session.token(RefKey::Type(symbols.named(fixture.program))).ok(),
            Some(Token::new(TableKind::TypeDef, 1))
        );
    }

    #[test]
    #[should_panic(expected = "token context")]
    fn test_by_ref_in_token_context_is_rejected() {
        let fixture = fixture();
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let by_ref = session.symbols().by_ref(session.symbols().primitive(Primitive::I4));
        session.indexer().visit_type_reference(by_ref).unwrap();
    }

    #[test]
    fn test_body_references_and_array_methods() {
        let fixture = fixture();
        let int32 = fixture.symbols.primitive(Primitive::I4);
        let matrix = fixture.symbols.array(int32, 2);
        let interner = fixture.symbols.interner.clone();
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);

        let mut builder = BodyBuilder::new(interner);
        let grid = builder.local("grid", matrix);
        let body = builder.finish(vec![
            Stmt::assign(
                Place::Local(grid),
                Expr::NewArray {
                    array_ty: matrix,
                    lengths: vec![Expr::int(2), Expr::int(3)],
                },
            ),
            Stmt::assign(
                Place::ArrayElement {
                    array: Box::new(Expr::Local(grid)),
                    array_ty: matrix,
                    indices: vec![Expr::int(0), Expr::int(1)],
                },
                Expr::ArrayElement {
                    array: Box::new(Expr::Local(grid)),
                    array_ty: matrix,
                    indices: vec![Expr::int(1), Expr::int(0)],
                },
            ),
        ]);

        session.indexer().visit_body(&body).unwrap();

        for kind in [
            ArrayMethodKind::Constructor,
            ArrayMethodKind::Get,
            ArrayMethodKind::Set,
        ] {
            assert!(session.lookup(RefKey::ArrayMethod(kind, matrix)).is_some());
        }
        assert!(session.lookup(RefKey::ArrayMethod(ArrayMethodKind::Address, matrix)).is_none());
        assert_eq!(session.array_methods().len(), 3);
        assert_eq!(session.tokens().rows(TableKind::TypeSpec), vec![RefKey::Type(matrix)]);
    }

    #[test]
    fn test_concurrent_indexing_reserves_once() {
        let fixture = fixture();
        let add = fixture.symbols.type_defs[fixture.list].methods[0];
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let container = symbols.instance(fixture.list, vec![symbols.primitive(Primitive::Bool)]);
        let specialized = symbols.specialized_method(add, container);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| session.indexer().visit_member_reference(specialized)))
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });

        assert_eq!(session.tokens().rows(TableKind::MemberRef).len(), 2);
        assert_eq!(session.tokens().rows(TableKind::TypeSpec).len(), 1);
        assert_eq!(session.tokens().rows(TableKind::TypeRef).len(), 1);
    }

    #[test]
    fn test_image_round_trips_through_bincode() {
        let fixture = fixture();
        let add = fixture.symbols.type_defs[fixture.list].methods[0];
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let container = symbols.instance(fixture.list, vec![symbols.primitive(Primitive::I4)]);
        let specialized = symbols.specialized_method(add, container);

        session.indexer().visit_definitions().unwrap();
        session.indexer().visit_member_reference(specialized).unwrap();
        let image = session.build_image().unwrap();

        assert_eq!(image.module_name, "app.dll");
        assert_eq!(image.row_count(TableKind::TypeDef), 1);
        assert_eq!(image.row_count(TableKind::MemberRef), 2);
        let type_ref = &image.type_refs[0];
        assert_eq!(image.string(type_ref.name), Some("List`1"));
        assert_eq!(image.string(type_ref.namespace), Some("Collections"));
        assert_eq!(type_ref.scope, Token::new(TableKind::AssemblyRef, 1).0);

        // GENERICINST CLASS TypeRef#1 <int32>
        let spec = image.blob(image.type_specs[0].signature);
        assert_eq!(spec, Some([0x15, 0x12, 0x05, 0x01, 0x08].as_slice()));

        // The specialized row keeps the open signature: HASTHIS, 1 param, void(!0)
        let add_row = &image.member_refs[1];
        assert_eq!(add_row.parent, Token::new(TableKind::TypeSpec, 1).0);
        assert_eq!(
            image.blob(add_row.signature),
            Some([0x20, 0x01, 0x01, 0x13, 0x00].as_slice())
        );

        let bytes = image.encode().unwrap();
        assert_eq!(TablesImage::decode(&bytes).unwrap(), image);
    }

    #[test]
    fn test_generic_method_instance_gets_method_spec_row() {
        let mut fixture = fixture();
        let void = fixture.symbols.primitive(Primitive::Void);
        let item = fixture.symbols.method_param(0);
        let convert = fixture.symbols.add_generic_method(
            fixture.list,
            "ConvertAll",
            1,
            &[("item", item)],
            void,
        );
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let generic = symbols.method_ref(convert);
        let instance = symbols.method_instance(generic, vec![symbols.primitive(Primitive::I4)]);

        session.indexer().visit_member_reference(instance).unwrap();
        let image = session.build_image().unwrap();

        assert_eq!(image.row_count(TableKind::MethodSpec), 1);
        assert_eq!(image.row_count(TableKind::MemberRef), 1);
        let row = &image.method_specs[0];
        assert_eq!(row.method, Token::new(TableKind::MemberRef, 1).0);
        // GENERICINST, 1 argument, int32
        assert_eq!(image.blob(row.instantiation), Some([0x0a, 0x01, 0x08].as_slice()));
    }

    #[test]
    fn test_missing_token_is_reported() {
        let fixture = fixture();
        let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
        let symbols = session.symbols();
        let list = symbols.named(fixture.list);
        session.tokens().reserve(RefKey::Type(symbols.vector(list)), TableKind::TypeSpec).unwrap();

        assert!(matches!(
            session.build_image(),
            Err(EmitError::MissingToken(RefKey::Type(ty))) if ty == list
        ));
    }
}
