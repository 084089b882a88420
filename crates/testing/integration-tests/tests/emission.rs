//! Reference indexing, array pseudo-methods and the driver pipeline

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use cv_bound::{Callee, Expr, Place, Stmt};
use cv_driver::{DriverConfig, Session};
use cv_emit::{ArrayMethodKind, EmitSession, RefKey, TableKind, TablesImage};
use cv_symbols::Primitive;
use integration_tests::{Fixture, try_finally};

/// `Grid` builds a 2-D array, stores into it, yields an element and adds to
/// a `List<int32>` while a finally clause logs
fn grid_fixture() -> Fixture {
    let mut fixture = Fixture::new();
    let matrix = fixture.symbols.array(fixture.int32, 2);
    let list_int = fixture.symbols.instance(fixture.list, vec![fixture.int32]);
    let add = fixture.symbols.type_defs[fixture.list].methods[0];
    let add = fixture.symbols.specialized_method(add, list_int);

    let mut builder = fixture.builder();
    let grid = builder.local("grid", matrix);
    let items = builder.local("items", list_int);
    let guarded = try_finally(
        &mut builder,
        vec![
            Stmt::Yield(Expr::ArrayElement {
                array: Box::new(Expr::Local(grid)),
                array_ty: matrix,
                indices: vec![Expr::int(0), Expr::int(1)],
            }),
            Stmt::Expr(Expr::Call {
                callee: Callee::Method(add),
                receiver: Some(Box::new(Expr::Local(items))),
                args: vec![Expr::int(1)],
            }),
        ],
        vec![fixture.write(0)],
    );
    let body = builder.finish(vec![
        Stmt::assign(
            Place::Local(grid),
            Expr::NewArray {
                array_ty: matrix,
                lengths: vec![Expr::int(2), Expr::int(2)],
            },
        ),
        Stmt::assign(
            Place::ArrayElement {
                array: Box::new(Expr::Local(grid)),
                array_ty: matrix,
                indices: vec![Expr::int(0), Expr::int(1)],
            },
            Expr::int(5),
        ),
        guarded,
    ]);
    fixture.add_iterator("Grid", body);
    fixture
}

fn single_worker() -> DriverConfig {
    let mut config = DriverConfig::default();
    config.emit.workers = 1;
    config
}

fn member_names(image: &TablesImage) -> BTreeSet<String> {
    image
        .member_refs
        .iter()
        .filter_map(|row| image.string(row.name))
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_concurrent_array_method_lookups_share_one_descriptor() {
    let fixture = Fixture::new();
    let matrix = fixture.symbols.array(fixture.int32, 2);
    let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);

    let found: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    session
                        .indexer()
                        .visit_array_method(ArrayMethodKind::Get, matrix)
                        .unwrap();
                    session
                        .array_methods()
                        .get(ArrayMethodKind::Get, matrix, session.symbols())
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert!(found.iter().all(|method| Arc::ptr_eq(method, &found[0])));
    assert_eq!(session.array_methods().len(), 1);
    let image = session.build_image().unwrap();
    assert_eq!(image.row_count(TableKind::MemberRef), 1);
    assert_eq!(image.row_count(TableKind::TypeSpec), 1);
}

#[test]
fn test_type_seen_in_signature_gets_token_later() {
    let fixture = Fixture::new();
    let list_int = fixture.symbols.instance(fixture.list, vec![fixture.int32]);
    let session = EmitSession::new(Arc::new(fixture.symbols), fixture.module);
    let indexer = session.indexer();

    indexer.visit_signature_type(list_int).unwrap();
    assert!(indexer.has_seen(RefKey::Type(list_int)));
    assert_eq!(session.lookup(RefKey::Type(list_int)), None);

    indexer.visit_type_reference(list_int).unwrap();
    let token = session.lookup(RefKey::Type(list_int)).unwrap();
    assert_eq!(token.table(), Some(TableKind::TypeSpec));
    let seen = indexer.seen_count();
    assert!(seen >= 1);

    indexer.visit_type_reference(list_int).unwrap();
    assert_eq!(indexer.seen_count(), seen);
    assert_eq!(session.lookup(RefKey::Type(list_int)), Some(token));
    assert_eq!(session.tokens().rows(TableKind::TypeSpec).len(), 1);
}

#[test]
fn test_driver_emits_machine_and_references() {
    let fixture = grid_fixture();
    let output = Session::new(single_worker())
        .emit(fixture.into_unit())
        .unwrap();
    let image = &output.image;

    assert_eq!(image.module_name, "app.dll");
    assert_eq!(image.row_count(TableKind::AssemblyRef), 1);
    assert_eq!(image.assembly_refs[0].version, [4, 0, 0, 0]);
    assert_eq!(image.string(image.assembly_refs[0].name), Some("corlib"));

    // Sys.Log and Collections.List`1
    assert_eq!(image.row_count(TableKind::TypeRef), 2);
    // int32[,] and List<int32>
    assert_eq!(image.row_count(TableKind::TypeSpec), 2);
    // Write, both forms of Add, and the three array pseudo-methods
    assert_eq!(image.row_count(TableKind::MemberRef), 6);
    let expected: BTreeSet<String> = [".ctor", "Add", "Get", "Set", "Write"]
        .into_iter()
        .map(str::to_owned)
        .collect();
    assert_eq!(member_names(image), expected);

    assert_eq!(image.row_count(TableKind::TypeDef), 2);
    let machine = &output.machines[0];
    assert_eq!(machine.machine.name, "<>d__Grid");
    // state, current, grid, items
    assert_eq!(image.row_count(TableKind::Field), 4);
    // Program.Grid, MoveNext, Dispose and one finally handler
    assert_eq!(image.row_count(TableKind::MethodDef), 4);
}

#[test]
fn test_shared_member_gets_one_row_across_workers() {
    let mut fixture = Fixture::new();
    let void = fixture.symbols.primitive(Primitive::Void);
    let mut bodies = Vec::new();
    for index in 0..12 {
        let iterator = fixture.builder().finish(vec![
            Stmt::Yield(Expr::int(index)),
            fixture.write(index),
        ]);
        fixture.add_iterator(&format!("Numbers{index}"), iterator);

        let method = fixture
            .symbols
            .add_method(fixture.program, &format!("Log{index}"), &[], void);
        let logging = fixture
            .builder()
            .finish(vec![fixture.write(index), Stmt::Return(None)]);
        bodies.push((method, logging));
    }
    let mut unit = fixture.into_unit();
    unit.bodies = bodies;

    let mut config = DriverConfig::default();
    config.emit.workers = 4;
    let output = Session::new(config).emit(unit).unwrap();

    assert_eq!(output.machines.len(), 12);
    assert_eq!(output.image.row_count(TableKind::MemberRef), 1);
    assert_eq!(output.image.row_count(TableKind::TypeRef), 1);
    assert_eq!(output.image.row_count(TableKind::AssemblyRef), 1);
    assert_eq!(output.image.row_count(TableKind::TypeDef), 13);
}

#[test]
fn test_single_worker_emission_is_deterministic() -> anyhow::Result<()> {
    let first = Session::new(single_worker()).emit(grid_fixture().into_unit())?;
    let second = Session::new(single_worker()).emit(grid_fixture().into_unit())?;
    assert_eq!(first.bytes, second.bytes);
    Ok(())
}

#[test]
fn test_written_image_decodes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("app.tables");
    let mut config = single_worker();
    config.emit.output = Some(path.clone());

    let output = Session::new(config).emit(grid_fixture().into_unit())?;
    assert_eq!(output.written.as_deref(), Some(path.as_path()));

    let bytes = fs::read(&path)?;
    assert_eq!(bytes, output.bytes);
    assert_eq!(TablesImage::decode(&bytes)?, output.image);
    Ok(())
}
