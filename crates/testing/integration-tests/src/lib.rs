//! Fixtures for end-to-end tests
//!
//! A [`Fixture`] is a two-assembly program: `corlib` provides a logging
//! type and a generic list, `app` defines `App.Program` whose iterator
//! methods the tests lower, run and emit.

use cv_bound::{Body, BodyBuilder, Expr, LabelId, Stmt};
use cv_driver::CompilationUnit;
use cv_interpreter::{RecordingHost, Value};
use cv_iterator_lower::{IteratorMethod, LoweringOptions, StateMachine, lower_iterator};
use cv_symbols::{MemberRefId, MethodId, ModuleId, Primitive, SymbolTable, TyId, TypeDefId};

/// Test program
pub struct Fixture {
    /// Symbol table
    pub symbols: SymbolTable,
    /// `app.dll`
    pub module: ModuleId,
    /// `App.Program`
    pub program: TypeDefId,
    /// `Collections.List`1` in corlib
    pub list: TypeDefId,
    /// `int32`
    pub int32: TyId,
    /// `Sys.Log::Write(int32)`
    pub write: MemberRefId,
    /// `Sys.Log::Fail(int32)`, which tests configure to throw
    pub fail: MemberRefId,
    iterators: Vec<IteratorMethod>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Builds the program skeleton
    #[must_use]
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        let corlib = symbols.add_assembly_with_version("corlib", [4, 0, 0, 0]);
        let corlib_module = symbols.add_module(corlib, "corlib.dll");
        let int32 = symbols.primitive(Primitive::I4);
        let void = symbols.primitive(Primitive::Void);

        let log = symbols.add_type(corlib_module, Some("Sys"), "Log", 0);
        let write = symbols.add_method(log, "Write", &[("value", int32)], void);
        let fail = symbols.add_method(log, "Fail", &[("code", int32)], void);
        let write = symbols.method_ref(write);
        let fail = symbols.method_ref(fail);

        let list = symbols.add_type(corlib_module, Some("Collections"), "List`1", 1);
        let item = symbols.type_param(0);
        symbols.add_method(list, "Add", &[("item", item)], void);

        let app = symbols.add_assembly("app");
        let module = symbols.add_module(app, "app.dll");
        let program = symbols.add_type(module, Some("App"), "Program", 0);

        Self {
            symbols,
            module,
            program,
            list,
            int32,
            write,
            fail,
            iterators: Vec::new(),
        }
    }

    /// Fresh body builder sharing the program's interner
    #[must_use]
    pub fn builder(&self) -> BodyBuilder {
        BodyBuilder::new(self.symbols.interner.clone())
    }

    /// `Sys.Log.Write(value);`
    #[must_use]
    pub fn write(&self, value: i64) -> Stmt {
        Stmt::Expr(Expr::call(self.write, vec![Expr::int(value)]))
    }

    /// `Sys.Log.Write(expr);`
    #[must_use]
    pub fn write_expr(&self, value: Expr) -> Stmt {
        Stmt::Expr(Expr::call(self.write, vec![value]))
    }

    /// `Sys.Log.Fail(code);`
    #[must_use]
    pub fn fail(&self, code: i64) -> Stmt {
        Stmt::Expr(Expr::call(self.fail, vec![Expr::int(code)]))
    }

    /// Declares `int32 Program.<name>()` as an iterator with `body`
    pub fn add_iterator(&mut self, name: &str, body: Body) -> MethodId {
        let int32 = self.int32;
        let method = self.symbols.add_method(self.program, name, &[], int32);
        self.iterators.push(IteratorMethod {
            method,
            body,
            element_ty: int32,
        });
        method
    }

    /// Lowers the most recently added iterator
    ///
    /// # Panics
    /// If no iterator was added
    #[must_use]
    #[allow(clippy::panic, reason = "fixture misuse")]
    pub fn lower_last(&self) -> StateMachine {
        let Some(iterator) = self.iterators.last() else {
            panic!("no iterator added");
        };
        lower_iterator(iterator, &self.symbols, &LoweringOptions::default())
    }

    /// Hands the program to the driver
    #[must_use]
    pub fn into_unit(self) -> CompilationUnit {
        CompilationUnit {
            symbols: self.symbols,
            module: self.module,
            iterators: self.iterators,
            bodies: Vec::new(),
        }
    }
}

/// `try { body } finally { finally }` with a fresh try id
pub fn try_finally(builder: &mut BodyBuilder, body: Vec<Stmt>, finally: Vec<Stmt>) -> Stmt {
    let id = builder.try_id();
    Stmt::try_finally(id, body, finally)
}

/// `depth` nested try/finally regions, each yielding its level and logging
/// it from its finally clause
///
/// Level 1 is the outermost region.
pub fn nested_finally(fixture: &Fixture, builder: &mut BodyBuilder, depth: i64) -> Vec<Stmt> {
    let mut inner = Vec::new();
    for level in (1..=depth).rev() {
        let mut body = vec![Stmt::Yield(Expr::int(level))];
        body.append(&mut inner);
        inner = vec![try_finally(builder, body, vec![fixture.write(level)])];
    }
    inner
}

/// Unconditional jump helper reading like source
#[must_use]
pub fn goto(label: LabelId) -> Stmt {
    Stmt::Goto(label)
}

/// Integer arguments of every call the host saw to `method`, in order
#[must_use]
pub fn logged(host: &RecordingHost, method: MemberRefId) -> Vec<i64> {
    host.calls
        .iter()
        .filter(|(called, _)| *called == method)
        .filter_map(|(_, args)| args.first().and_then(Value::as_int))
        .collect()
}

/// Integer values of produced elements
#[must_use]
pub fn ints(values: &[Value]) -> Vec<i64> {
    values.iter().filter_map(Value::as_int).collect()
}
