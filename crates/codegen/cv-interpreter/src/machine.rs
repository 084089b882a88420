//! Driving lowered state machines

use crate::host::Host;
use crate::interpreter::{DEFAULT_FUEL, Interpreter, InterpreterError};
use crate::value::Value;
use cv_bound::{FieldSlot, LocalId, ParamId};
use cv_iterator_lower::{
    CURRENT_FIELD, FieldKind, INITIAL_STATE, STATE_FIELD, StateMachine,
};
use tracing::trace;

/// One live instance of a state machine
pub struct MachineInstance<'machine> {
    machine: &'machine StateMachine,
    fields: Vec<Value>,
    fuel: u64,
}

impl<'machine> MachineInstance<'machine> {
    /// Creates an instance in the initial state with the given arguments
    #[must_use]
    pub fn new(machine: &'machine StateMachine, args: Vec<Value>) -> Self {
        let mut fields = vec![Value::Unit; machine.fields.len()];
        fields[STATE_FIELD.0 as usize] = Value::Int(i64::from(INITIAL_STATE));
        for (index, arg) in args.into_iter().enumerate() {
            if let Some(slot) = machine.param_slot(ParamId(index as u32)) {
                fields[slot.0 as usize] = arg;
            }
        }
        Self {
            machine,
            fields,
            fuel: DEFAULT_FUEL,
        }
    }

    /// Limits the statements each call may execute
    #[must_use]
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = fuel;
        self
    }

    /// Runs the step method; true when an element was produced
    ///
    /// # Errors
    /// Returns `InterpreterError` if execution fails or an exception escapes
    pub fn move_next(&mut self, host: &mut impl Host) -> Result<bool, InterpreterError> {
        let step = &self.machine.step().body;
        let result = Interpreter::new(host, &self.machine.methods, &mut self.fields)
            .with_fuel(self.fuel)
            .execute(step, Vec::new())?;
        trace!(target: "interpreter", machine = %self.machine.name, state = %self.state(), produced = %result, "step");
        result.as_bool().ok_or_else(|| InterpreterError::TypeMismatch {
            expected: "bool".to_string(),
            got: format!("{result:?}"),
        })
    }

    /// Runs the dispose method
    ///
    /// # Errors
    /// Returns `InterpreterError` if execution fails or an exception escapes
    pub fn dispose(&mut self, host: &mut impl Host) -> Result<(), InterpreterError> {
        let dispose = &self.machine.dispose().body;
        Interpreter::new(host, &self.machine.methods, &mut self.fields)
            .with_fuel(self.fuel)
            .execute(dispose, Vec::new())?;
        trace!(target: "interpreter", machine = %self.machine.name, state = %self.state(), "dispose");
        Ok(())
    }

    /// Steps until the machine finishes, collecting every element
    ///
    /// # Errors
    /// Returns `InterpreterError` if any step fails
    pub fn drain(&mut self, host: &mut impl Host) -> Result<Vec<Value>, InterpreterError> {
        let mut produced = Vec::new();
        while self.move_next(host)? {
            produced.push(self.current().clone());
        }
        Ok(produced)
    }

    /// Last produced element
    #[must_use]
    pub fn current(&self) -> &Value {
        &self.fields[CURRENT_FIELD.0 as usize]
    }

    /// Current state value
    #[must_use]
    pub fn state(&self) -> Value {
        self.fields[STATE_FIELD.0 as usize].clone()
    }

    /// Value of a field
    #[must_use]
    pub fn field(&self, slot: FieldSlot) -> &Value {
        &self.fields[slot.0 as usize]
    }

    /// Value of the field a local was hoisted into
    #[must_use]
    pub fn hoisted_local(&self, local: LocalId) -> Option<&Value> {
        self.machine
            .fields
            .iter()
            .position(|field| field.kind == FieldKind::Local(local))
            .map(|index| &self.fields[index])
    }
}
