//! Lowered iterators driven step by step through the interpreter

use cv_bound::{BinaryOp, CatchClause, Expr, Place, Stmt, TryStmt};
use cv_interpreter::{InterpreterError, MachineInstance, RecordingHost, Value};
use cv_iterator_lower::{FINISHED_STATE, FIRST_FINALIZE_STATE};
use integration_tests::{Fixture, goto, ints, logged, nested_finally, try_finally};

#[test]
fn test_single_yield_without_try() {
    let mut fixture = Fixture::new();
    let body = fixture.builder().finish(vec![Stmt::Yield(Expr::int(42))]);
    fixture.add_iterator("Single", body);
    let machine = fixture.lower_last();

    assert_eq!(machine.resume_states, vec![0, 1]);
    assert!(machine.finalize_states.is_empty());

    let mut host = RecordingHost::new();
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert!(instance.move_next(&mut host).unwrap());
    assert_eq!(instance.current(), &Value::Int(42));

    instance.dispose(&mut host).unwrap();
    assert!(host.calls.is_empty());
    assert_eq!(instance.state(), Value::Int(FINISHED_STATE.into()));
    assert!(!instance.move_next(&mut host).unwrap());
}

#[test]
fn test_suspension_count_determines_states() {
    for count in 0..6_i64 {
        let mut fixture = Fixture::new();
        let yields = (0..count).map(|value| Stmt::Yield(Expr::int(value))).collect();
        let body = fixture.builder().finish(yields);
        fixture.add_iterator("Counting", body);
        let machine = fixture.lower_last();

        let expected: Vec<i32> = (0..=count as i32).collect();
        assert_eq!(machine.resume_states, expected);
        assert_eq!(machine.resume_dispatch().len(), count as usize + 1);

        let mut host = RecordingHost::new();
        let produced = MachineInstance::new(&machine, Vec::new())
            .drain(&mut host)
            .unwrap();
        assert_eq!(ints(&produced), (0..count).collect::<Vec<_>>());
    }
}

#[test]
fn test_dispose_after_first_step_runs_finally_once() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let stmt = try_finally(
        &mut builder,
        vec![Stmt::Yield(Expr::int(7))],
        vec![fixture.write(1)],
    );
    let body = builder.finish(vec![stmt]);
    fixture.add_iterator("Guarded", body);
    let machine = fixture.lower_last();
    assert_eq!(machine.finalize_states, vec![FIRST_FINALIZE_STATE]);

    let mut host = RecordingHost::new();
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert!(instance.move_next(&mut host).unwrap());
    assert_eq!(instance.current(), &Value::Int(7));

    instance.dispose(&mut host).unwrap();
    assert_eq!(logged(&host, fixture.write), vec![1]);
    instance.dispose(&mut host).unwrap();
    assert_eq!(logged(&host, fixture.write), vec![1]);
    assert!(!instance.move_next(&mut host).unwrap());
}

#[test]
fn test_running_to_completion_runs_finally_once() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let stmt = try_finally(
        &mut builder,
        vec![Stmt::Yield(Expr::int(7))],
        vec![fixture.write(1)],
    );
    let body = builder.finish(vec![stmt, Stmt::Yield(Expr::int(8))]);
    fixture.add_iterator("Guarded", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert_eq!(ints(&instance.drain(&mut host).unwrap()), vec![7, 8]);
    instance.dispose(&mut host).unwrap();
    assert_eq!(logged(&host, fixture.write), vec![1]);
}

#[test]
fn test_nested_frames_dispose_innermost_first() {
    for depth in 1..=4_i64 {
        let mut fixture = Fixture::new();
        let mut builder = fixture.builder();
        let stmts = nested_finally(&fixture, &mut builder, depth);
        let body = builder.finish(stmts);
        fixture.add_iterator("Nested", body);
        let machine = fixture.lower_last();

        let expected: Vec<i32> = (0..depth as i32).map(|level| FIRST_FINALIZE_STATE - level).collect();
        assert_eq!(machine.finalize_states, expected);
        assert_eq!(machine.handlers().count(), depth as usize);

        let mut host = RecordingHost::new();
        let mut instance = MachineInstance::new(&machine, Vec::new());
        for _ in 0..depth {
            assert!(instance.move_next(&mut host).unwrap());
        }
        assert_eq!(instance.current(), &Value::Int(depth));
        instance.dispose(&mut host).unwrap();
        assert_eq!(logged(&host, fixture.write), (1..=depth).rev().collect::<Vec<_>>());
    }
}

#[test]
fn test_partial_nesting_disposes_entered_frames_only() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let stmts = nested_finally(&fixture, &mut builder, 3);
    let body = builder.finish(stmts);
    fixture.add_iterator("Nested", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert!(instance.move_next(&mut host).unwrap());
    assert!(instance.move_next(&mut host).unwrap());
    instance.dispose(&mut host).unwrap();
    assert_eq!(logged(&host, fixture.write), vec![2, 1]);
}

#[test]
fn test_failing_inner_finally_still_runs_outer_finally() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let inner = try_finally(
        &mut builder,
        vec![Stmt::Yield(Expr::int(2))],
        vec![fixture.fail(2)],
    );
    let outer = try_finally(
        &mut builder,
        vec![Stmt::Yield(Expr::int(1)), inner],
        vec![fixture.write(1)],
    );
    let body = builder.finish(vec![outer]);
    fixture.add_iterator("FailingCleanup", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    host.throwing.push(fixture.fail);
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert!(instance.move_next(&mut host).unwrap());
    assert!(instance.move_next(&mut host).unwrap());
    assert_eq!(instance.current(), &Value::Int(2));

    let error = instance.dispose(&mut host).unwrap_err();
    assert!(matches!(error, InterpreterError::Thrown(Value::Int(2))));
    assert_eq!(logged(&host, fixture.fail), vec![2]);
    assert_eq!(logged(&host, fixture.write), vec![1]);

    instance.dispose(&mut host).unwrap();
    assert!(!instance.move_next(&mut host).unwrap());
    assert_eq!(logged(&host, fixture.fail), vec![2]);
    assert_eq!(logged(&host, fixture.write), vec![1]);
}

#[test]
fn test_nested_frames_complete_in_order() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let stmts = nested_finally(&fixture, &mut builder, 3);
    let body = builder.finish(stmts);
    fixture.add_iterator("Nested", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    let produced = MachineInstance::new(&machine, Vec::new())
        .drain(&mut host)
        .unwrap();
    assert_eq!(ints(&produced), vec![1, 2, 3]);
    assert_eq!(logged(&host, fixture.write), vec![3, 2, 1]);
}

#[test]
fn test_exception_runs_pending_finally_then_propagates() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let stmt = try_finally(
        &mut builder,
        vec![
            Stmt::Yield(Expr::int(1)),
            fixture.fail(9),
            Stmt::Yield(Expr::int(2)),
        ],
        vec![fixture.write(5)],
    );
    let body = builder.finish(vec![stmt]);
    fixture.add_iterator("Failing", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    host.throwing.push(fixture.fail);
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert!(instance.move_next(&mut host).unwrap());

    let error = instance.move_next(&mut host).unwrap_err();
    assert!(matches!(error, InterpreterError::Thrown(Value::Int(9))));
    assert_eq!(logged(&host, fixture.write), vec![5]);
    assert_eq!(instance.state(), Value::Int(FINISHED_STATE.into()));

    instance.dispose(&mut host).unwrap();
    assert_eq!(logged(&host, fixture.write), vec![5]);
}

#[test]
fn test_yield_break_inside_frame_runs_finally() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let stmt = try_finally(
        &mut builder,
        vec![
            Stmt::Yield(Expr::int(1)),
            Stmt::YieldBreak,
            Stmt::Yield(Expr::int(2)),
        ],
        vec![fixture.write(3)],
    );
    let body = builder.finish(vec![stmt, Stmt::Yield(Expr::int(4))]);
    fixture.add_iterator("Breaking", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    let produced = MachineInstance::new(&machine, Vec::new())
        .drain(&mut host)
        .unwrap();
    assert_eq!(ints(&produced), vec![1]);
    assert_eq!(logged(&host, fixture.write), vec![3]);
}

#[test]
fn test_jump_out_of_frame_runs_finally() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let after = builder.label();
    let stmt = try_finally(
        &mut builder,
        vec![
            Stmt::Yield(Expr::int(1)),
            goto(after),
            Stmt::Yield(Expr::int(2)),
        ],
        vec![fixture.write(7)],
    );
    let body = builder.finish(vec![stmt, Stmt::Label(after), Stmt::Yield(Expr::int(3))]);
    fixture.add_iterator("Jumping", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    let produced = MachineInstance::new(&machine, Vec::new())
        .drain(&mut host)
        .unwrap();
    assert_eq!(ints(&produced), vec![1, 3]);
    assert_eq!(logged(&host, fixture.write), vec![7]);
}

#[test]
fn test_loop_state_survives_suspension() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let counter = builder.local("i", fixture.int32);
    let top = builder.label();
    let done = builder.label();
    let guarded = try_finally(
        &mut builder,
        vec![Stmt::Yield(Expr::Local(counter))],
        vec![fixture.write_expr(Expr::Local(counter))],
    );
    let body = builder.finish(vec![
        Stmt::assign(Place::Local(counter), Expr::int(0)),
        Stmt::Label(top),
        Stmt::CondGoto {
            cond: Expr::binary(BinaryOp::Lt, Expr::Local(counter), Expr::int(3)),
            jump_if: false,
            target: done,
        },
        guarded,
        Stmt::assign(
            Place::Local(counter),
            Expr::binary(BinaryOp::Add, Expr::Local(counter), Expr::int(1)),
        ),
        goto(top),
        Stmt::Label(done),
    ]);
    fixture.add_iterator("Loop", body);
    let machine = fixture.lower_last();
    assert_eq!(machine.resume_states, vec![0, 1]);

    let mut host = RecordingHost::new();
    let mut instance = MachineInstance::new(&machine, Vec::new());
    assert_eq!(ints(&instance.drain(&mut host).unwrap()), vec![0, 1, 2]);
    assert_eq!(logged(&host, fixture.write), vec![0, 1, 2]);
    assert_eq!(instance.hoisted_local(counter), Some(&Value::Int(3)));
}

#[test]
fn test_parameters_are_hoisted() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let limit = builder.param("limit", fixture.int32);
    let body = builder.finish(vec![Stmt::Yield(Expr::binary(
        BinaryOp::Add,
        Expr::Param(limit),
        Expr::int(1),
    ))]);
    fixture.add_iterator("Plus", body);
    let machine = fixture.lower_last();

    let mut host = RecordingHost::new();
    let mut instance = MachineInstance::new(&machine, vec![Value::Int(41)]);
    assert!(instance.move_next(&mut host).unwrap());
    assert_eq!(instance.current(), &Value::Int(42));
}

#[test]
fn test_native_try_catch_stays_in_place() {
    let mut fixture = Fixture::new();
    let mut builder = fixture.builder();
    let id = builder.try_id();
    let guarded = Stmt::Try(TryStmt {
        id,
        body: vec![fixture.fail(4)],
        catches: vec![CatchClause {
            exception_ty: None,
            local: None,
            body: vec![fixture.write(8)],
        }],
        finally: None,
    });
    let body = builder.finish(vec![guarded, Stmt::Yield(Expr::int(1))]);
    fixture.add_iterator("Catching", body);
    let machine = fixture.lower_last();
    assert!(machine.finalize_states.is_empty());

    let mut host = RecordingHost::new();
    host.throwing.push(fixture.fail);
    let produced = MachineInstance::new(&machine, Vec::new())
        .drain(&mut host)
        .unwrap();
    assert_eq!(ints(&produced), vec![1]);
    assert_eq!(logged(&host, fixture.write), vec![8]);
}
