//! Bound-tree interpreter
//!
//! Control flow is structured around try regions: a jump searches the current
//! statement list and the plain blocks nested in it, and otherwise propagates
//! outward through enclosing regions, running their finally clauses on the
//! way. Jumps never enter a try region from outside.

#![allow(
    clippy::min_ident_chars,
    reason = "Short identifiers like l and r are conventional in operator implementations"
)]

use crate::host::Host;
use crate::value::Value;
use cv_bound::{
    BinaryOp, Body, Callee, Expr, LabelId, LocalId, ParamId, Place, Stmt, SynthMethodId,
    TryStmt, UnaryOp,
};
use cv_iterator_lower::SynthesizedMethod;
use thiserror::Error;

/// Statements executed before giving up on a body
pub const DEFAULT_FUEL: u64 = 1_000_000;

/// Interpreter error
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// Local read before assignment
    #[error("uninitialized local variable: {0}")]
    UninitializedLocal(LocalId),
    /// Parameter without an argument
    #[error("missing argument for {0}")]
    MissingArgument(ParamId),
    /// Type mismatch
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type
        expected: String,
        /// Got type
        got: String,
    },
    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Jump to a label that is not reachable from the jump
    #[error("undefined label: {0}")]
    UndefinedLabel(LabelId),
    /// Call to a synthesized method that does not exist
    #[error("undefined synthesized method: {0}")]
    UndefinedMethod(SynthMethodId),
    /// Construct the interpreter does not model
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Exception escaping the executed body
    #[error("unhandled exception: {0}")]
    Thrown(Value),
    /// Fuel exhausted
    #[error("step limit exceeded")]
    StepLimit,
}

/// Result of executing a statement
#[derive(Debug)]
enum Flow {
    Normal,
    Goto(LabelId),
    Return(Value),
    Throw(Value),
}

/// Locals and arguments of one executing body
struct Activation {
    locals: Vec<Option<Value>>,
    args: Vec<Value>,
}

/// Interpreter state
///
/// `fields` is the receiver of state-machine bodies and `methods` the
/// synthesized methods reachable through [`Callee::Synthesized`].
pub struct Interpreter<'run, H: Host> {
    host: &'run mut H,
    methods: &'run [SynthesizedMethod],
    fields: &'run mut [Value],
    fuel: u64,
}

impl<'run, H: Host> Interpreter<'run, H> {
    /// Create a new interpreter
    #[must_use]
    pub fn new(
        host: &'run mut H,
        methods: &'run [SynthesizedMethod],
        fields: &'run mut [Value],
    ) -> Self {
        Self {
            host,
            methods,
            fields,
            fuel: DEFAULT_FUEL,
        }
    }

    /// Limits the number of executed statements
    #[must_use]
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    /// Execute a body and return its result
    ///
    /// # Errors
    /// Returns `InterpreterError` if execution fails; an exception escaping
    /// the body is reported as [`InterpreterError::Thrown`]
    pub fn execute(&mut self, body: &Body, args: Vec<Value>) -> Result<Value, InterpreterError> {
        let mut activation = Activation {
            locals: vec![None; body.locals.len()],
            args,
        };
        match self.run(&mut activation, &body.root, &[])? {
            Flow::Normal => Ok(Value::Unit),
            Flow::Return(value) => Ok(value),
            Flow::Throw(value) => Err(InterpreterError::Thrown(value)),
            Flow::Goto(label) => Err(InterpreterError::UndefinedLabel(label)),
        }
    }

    /// Runs `stmts`, entering at `entry`: a path of statement indices through
    /// nested plain blocks ending at a label
    fn run(
        &mut self,
        activation: &mut Activation,
        stmts: &[Stmt],
        entry: &[usize],
    ) -> Result<Flow, InterpreterError> {
        let (mut pc, mut pending) = self.enter(activation, stmts, entry)?;
        loop {
            let flow = match pending.take() {
                Some(flow) => flow,
                None => {
                    let Some(stmt) = stmts.get(pc) else {
                        return Ok(Flow::Normal);
                    };
                    self.exec_stmt(activation, stmt)?
                }
            };

            match flow {
                Flow::Normal => pc += 1,
                Flow::Goto(label) => match locate(stmts, label) {
                    Some(path) => (pc, pending) = self.enter(activation, stmts, &path)?,
                    None => return Ok(Flow::Goto(label)),
                },
                Flow::Return(_) | Flow::Throw(_) => return Ok(flow),
            }
        }
    }

    /// Positions execution at `entry`; a path into a nested block runs that
    /// block and reports how it ended
    fn enter(
        &mut self,
        activation: &mut Activation,
        stmts: &[Stmt],
        entry: &[usize],
    ) -> Result<(usize, Option<Flow>), InterpreterError> {
        match entry {
            [] => Ok((0, None)),
            [index] => Ok((*index, None)),
            [index, rest @ ..] => match stmts.get(*index) {
                Some(Stmt::Block(inner)) => {
                    let flow = self.run(activation, inner, rest)?;
                    Ok((*index, Some(flow)))
                }
                _ => Err(InterpreterError::Unsupported(
                    "label path through a non-block statement".to_string(),
                )),
            },
        }
    }

    fn exec_stmt(
        &mut self,
        activation: &mut Activation,
        stmt: &Stmt,
    ) -> Result<Flow, InterpreterError> {
        if self.fuel == 0 {
            return Err(InterpreterError::StepLimit);
        }
        self.fuel -= 1;

        match self.exec_stmt_inner(activation, stmt) {
            Err(InterpreterError::Thrown(value)) => Ok(Flow::Throw(value)),
            other => other,
        }
    }

    fn exec_stmt_inner(
        &mut self,
        activation: &mut Activation,
        stmt: &Stmt,
    ) -> Result<Flow, InterpreterError> {
        match stmt {
            Stmt::Block(stmts) => self.run(activation, stmts, &[]),
            Stmt::Expr(expr) => {
                self.eval(activation, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { place, value } => {
                let value = self.eval(activation, value)?;
                self.write_place(activation, place, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Label(_) | Stmt::Nop => Ok(Flow::Normal),
            Stmt::Goto(label) => Ok(Flow::Goto(*label)),
            Stmt::CondGoto {
                cond,
                jump_if,
                target,
            } => {
                let cond = self.eval(activation, cond)?;
                let cond = cond.as_bool().ok_or_else(|| mismatch("bool", &cond))?;
                Ok(if cond == *jump_if {
                    Flow::Goto(*target)
                } else {
                    Flow::Normal
                })
            }
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let value = self.eval(activation, scrutinee)?;
                let value = value.as_int().ok_or_else(|| mismatch("int", &value))?;
                let target = cases
                    .iter()
                    .find(|(case, _)| *case == value)
                    .map(|(_, target)| *target)
                    .or(*default);
                Ok(target.map_or(Flow::Normal, Flow::Goto))
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(activation, value)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Yield(_) | Stmt::YieldBreak => Err(InterpreterError::Unsupported(
                "suspension point outside a state machine".to_string(),
            )),
            Stmt::Try(try_stmt) => self.exec_try(activation, try_stmt),
            Stmt::TryFault { body, fault } => {
                let flow = self.run(activation, body, &[])?;
                if let Flow::Throw(_) = flow {
                    let fault_flow = self.run(activation, fault, &[])?;
                    if !matches!(fault_flow, Flow::Normal) {
                        return Ok(fault_flow);
                    }
                }
                Ok(flow)
            }
            Stmt::Throw(value) => Ok(Flow::Throw(self.eval(activation, value)?)),
        }
    }

    /// Catch clauses catch every exception; the first clause handles it
    fn exec_try(
        &mut self,
        activation: &mut Activation,
        try_stmt: &TryStmt,
    ) -> Result<Flow, InterpreterError> {
        let mut flow = self.run(activation, &try_stmt.body, &[])?;

        if let Flow::Throw(exception) = &flow
            && let Some(catch) = try_stmt.catches.first()
        {
            if let Some(local) = catch.local {
                set_local(activation, local, exception.clone());
            }
            flow = self.run(activation, &catch.body, &[])?;
        }

        if let Some(finally) = &try_stmt.finally {
            let finally_flow = self.run(activation, finally, &[])?;
            if !matches!(finally_flow, Flow::Normal) {
                flow = finally_flow;
            }
        }
        Ok(flow)
    }

    fn eval(&mut self, activation: &mut Activation, expr: &Expr) -> Result<Value, InterpreterError> {
        match expr {
            Expr::Const(constant) => Ok(Value::from(*constant)),
            Expr::Local(local) => activation
                .locals
                .get(local.0 as usize)
                .cloned()
                .flatten()
                .ok_or(InterpreterError::UninitializedLocal(*local)),
            Expr::Param(param) => activation
                .args
                .get(param.0 as usize)
                .cloned()
                .ok_or(InterpreterError::MissingArgument(*param)),
            Expr::MachineField(slot) => self
                .fields
                .get(slot.0 as usize)
                .cloned()
                .ok_or_else(|| InterpreterError::Unsupported(format!("no field {slot}"))),
            Expr::Field { receiver, field } => {
                let receiver = self.eval_receiver(activation, receiver.as_deref())?;
                self.host.load_field(*field, receiver)
            }
            Expr::Call {
                callee,
                receiver,
                args,
            } => {
                let receiver = self.eval_receiver(activation, receiver.as_deref())?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(activation, arg))
                    .collect::<Result<Vec<_>, _>>()?;
                match callee {
                    Callee::Method(method) => self.host.call(*method, receiver, args),
                    Callee::Synthesized(method) => self.call_synthesized(*method, args),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(activation, lhs)?;
                let rhs = self.eval(activation, rhs)?;
                eval_binary_op(*op, lhs, rhs)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(activation, operand)?;
                eval_unary_op(*op, operand)
            }
            Expr::ArrayElement { .. } => Err(unsupported("array element access")),
            Expr::AddressOf(_) => Err(unsupported("address-of")),
            Expr::NewArray { .. } => Err(unsupported("array allocation")),
            Expr::TypeToken(_) => Err(unsupported("type handle")),
        }
    }

    fn eval_receiver(
        &mut self,
        activation: &mut Activation,
        receiver: Option<&Expr>,
    ) -> Result<Option<Value>, InterpreterError> {
        receiver
            .map(|receiver| self.eval(activation, receiver))
            .transpose()
    }

    fn call_synthesized(
        &mut self,
        method: SynthMethodId,
        args: Vec<Value>,
    ) -> Result<Value, InterpreterError> {
        let methods = self.methods;
        let target = methods
            .get(method.0 as usize)
            .ok_or(InterpreterError::UndefinedMethod(method))?;
        self.execute(&target.body, args)
    }

    fn write_place(
        &mut self,
        activation: &mut Activation,
        place: &Place,
        value: Value,
    ) -> Result<(), InterpreterError> {
        match place {
            Place::Local(local) => {
                set_local(activation, *local, value);
                Ok(())
            }
            Place::Param(param) => {
                let slot = activation
                    .args
                    .get_mut(param.0 as usize)
                    .ok_or(InterpreterError::MissingArgument(*param))?;
                *slot = value;
                Ok(())
            }
            Place::MachineField(slot) => {
                let field = self
                    .fields
                    .get_mut(slot.0 as usize)
                    .ok_or_else(|| InterpreterError::Unsupported(format!("no field {slot}")))?;
                *field = value;
                Ok(())
            }
            Place::Field { receiver, field } => {
                let receiver = self.eval_receiver(activation, receiver.as_deref())?;
                self.host.store_field(*field, receiver, value)
            }
            Place::ArrayElement { .. } => Err(unsupported("array element store")),
        }
    }
}

fn set_local(activation: &mut Activation, local: LocalId, value: Value) {
    let index = local.0 as usize;
    if activation.locals.len() <= index {
        activation.locals.resize(index + 1, None);
    }
    activation.locals[index] = Some(value);
}

/// Finds `label` among `stmts` or inside plain blocks nested in them
fn locate(stmts: &[Stmt], label: LabelId) -> Option<Vec<usize>> {
    stmts.iter().enumerate().find_map(|(index, stmt)| match stmt {
        Stmt::Label(candidate) if *candidate == label => Some(vec![index]),
        Stmt::Block(inner) => locate(inner, label).map(|mut path| {
            path.insert(0, index);
            path
        }),
        _ => None,
    })
}

fn mismatch(expected: &str, got: &Value) -> InterpreterError {
    InterpreterError::TypeMismatch {
        expected: expected.to_string(),
        got: format!("{got:?}"),
    }
}

fn unsupported(what: &str) -> InterpreterError {
    InterpreterError::Unsupported(what.to_string())
}

fn eval_binary_op(op: BinaryOp, left: Value, right: Value) -> Result<Value, InterpreterError> {
    match (op, left, right) {
        (BinaryOp::Add, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_add(r))),
        (BinaryOp::Sub, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_sub(r))),
        (BinaryOp::Mul, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_mul(r))),
        (BinaryOp::Div | BinaryOp::Rem, Value::Int(_), Value::Int(0)) => {
            Err(InterpreterError::DivisionByZero)
        }
        (BinaryOp::Div, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_div(r))),
        (BinaryOp::Rem, Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_rem(r))),

        (BinaryOp::Eq, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l == r)),
        (BinaryOp::Ne, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l != r)),
        (BinaryOp::Lt, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l < r)),
        (BinaryOp::Le, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l <= r)),
        (BinaryOp::Gt, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l > r)),
        (BinaryOp::Ge, Value::Int(l), Value::Int(r)) => Ok(Value::Bool(l >= r)),

        (BinaryOp::Eq, Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(l == r)),
        (BinaryOp::Ne, Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(l != r)),
        (BinaryOp::And, Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(l && r)),
        (BinaryOp::Or, Value::Bool(l), Value::Bool(r)) => Ok(Value::Bool(l || r)),

        (_op, left, right) => Err(InterpreterError::TypeMismatch {
            expected: format!("{left:?}"),
            got: format!("{right:?}"),
        }),
    }
}

fn eval_unary_op(op: UnaryOp, value: Value) -> Result<Value, InterpreterError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (_, value) => Err(mismatch(&format!("operand of {op}"), &value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use cv_bound::{BodyBuilder, CatchClause};
    use cv_symbols::{Primitive, SymbolTable};

    fn run_body(body: &Body) -> Result<Value, InterpreterError> {
        let mut host = RecordingHost::new();
        Interpreter::new(&mut host, &[], &mut []).execute(body, Vec::new())
    }

    #[test]
    fn test_loop_with_labels() {
        let symbols = SymbolTable::new();
        let int32 = symbols.primitive(Primitive::I4);
        let mut builder = BodyBuilder::new(symbols.interner.clone());
        let sum = builder.local("sum", int32);
        let index = builder.local("i", int32);
        let top = builder.label();
        let done = builder.label();
        let body = builder.finish(vec![
            Stmt::assign(Place::Local(sum), Expr::int(0)),
            Stmt::assign(Place::Local(index), Expr::int(1)),
            Stmt::Label(top),
            Stmt::goto_if(
                Expr::binary(BinaryOp::Gt, Expr::Local(index), Expr::int(4)),
                done,
            ),
            Stmt::Block(vec![
                Stmt::assign(
                    Place::Local(sum),
                    Expr::binary(BinaryOp::Add, Expr::Local(sum), Expr::Local(index)),
                ),
                Stmt::assign(
                    Place::Local(index),
                    Expr::binary(BinaryOp::Add, Expr::Local(index), Expr::int(1)),
                ),
            ]),
            Stmt::Goto(top),
            Stmt::Label(done),
            Stmt::Return(Some(Expr::Local(sum))),
        ]);

        assert_eq!(run_body(&body).ok(), Some(Value::Int(10)));
    }

    #[test]
    fn test_jump_into_nested_block() {
        let symbols = SymbolTable::new();
        let mut builder = BodyBuilder::new(symbols.interner.clone());
        let inside = builder.label();
        let body = builder.finish(vec![
            Stmt::Goto(inside),
            Stmt::Return(Some(Expr::int(1))),
            Stmt::Block(vec![
                Stmt::Return(Some(Expr::int(2))),
                Stmt::Label(inside),
                Stmt::Nop,
            ]),
            Stmt::Return(Some(Expr::int(3))),
        ]);

        assert_eq!(run_body(&body).ok(), Some(Value::Int(3)));
    }

    #[test]
    fn test_finally_runs_on_goto_and_catch_sees_exception() {
        let symbols = SymbolTable::new();
        let int32 = symbols.primitive(Primitive::I4);
        let mut builder = BodyBuilder::new(symbols.interner.clone());
        let log = builder.local("log", int32);
        let caught = builder.local("caught", int32);
        let outer = builder.try_id();
        let inner = builder.try_id();
        let out = builder.label();
        let body = builder.finish(vec![
            Stmt::assign(Place::Local(log), Expr::int(0)),
            Stmt::Try(TryStmt {
                id: outer,
                body: vec![Stmt::Throw(Expr::int(40))],
                catches: vec![CatchClause {
                    exception_ty: None,
                    local: Some(caught),
                    body: Vec::new(),
                }],
                finally: None,
            }),
            Stmt::try_finally(
                inner,
                vec![Stmt::Goto(out)],
                vec![Stmt::assign(
                    Place::Local(log),
                    Expr::binary(BinaryOp::Add, Expr::Local(caught), Expr::int(2)),
                )],
            ),
            Stmt::Return(Some(Expr::int(-1))),
            Stmt::Label(out),
            Stmt::Return(Some(Expr::Local(log))),
        ]);

        assert_eq!(run_body(&body).ok(), Some(Value::Int(42)));
    }

    #[test]
    fn test_fault_runs_only_on_throw() {
        let symbols = SymbolTable::new();
        let int32 = symbols.primitive(Primitive::I4);
        let mut builder = BodyBuilder::new(symbols.interner.clone());
        let marker = builder.local("marker", int32);
        let body = builder.finish(vec![
            Stmt::assign(Place::Local(marker), Expr::int(0)),
            Stmt::TryFault {
                body: vec![Stmt::Nop],
                fault: vec![Stmt::assign(Place::Local(marker), Expr::int(1))],
            },
            Stmt::TryFault {
                body: vec![Stmt::Throw(Expr::Local(marker))],
                fault: vec![Stmt::assign(Place::Local(marker), Expr::int(2))],
            },
        ]);

        assert!(matches!(
            run_body(&body),
            Err(InterpreterError::Thrown(Value::Int(0)))
        ));
    }

    #[test]
    fn test_fuel_bounds_infinite_loops() {
        let symbols = SymbolTable::new();
        let mut builder = BodyBuilder::new(symbols.interner.clone());
        let top = builder.label();
        let body = builder.finish(vec![Stmt::Label(top), Stmt::Goto(top)]);

        let mut host = RecordingHost::new();
        let result = Interpreter::new(&mut host, &[], &mut [])
            .with_fuel(100)
            .execute(&body, Vec::new());
        assert!(matches!(result, Err(InterpreterError::StepLimit)));
    }
}
