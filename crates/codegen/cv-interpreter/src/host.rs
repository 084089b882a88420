//! Calls leaving the interpreted code

use crate::interpreter::InterpreterError;
use crate::value::Value;
use cv_symbols::MemberRefId;

/// Environment that services member references
///
/// A host signals a thrown exception by returning
/// [`InterpreterError::Thrown`]; the interpreter turns that into unwinding.
pub trait Host {
    /// Calls a method
    ///
    /// # Errors
    /// Returns `InterpreterError` if the call fails or throws
    fn call(
        &mut self,
        method: MemberRefId,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, InterpreterError>;

    /// Reads a field
    ///
    /// # Errors
    /// Returns `InterpreterError` if the field cannot be read
    fn load_field(
        &mut self,
        field: MemberRefId,
        _receiver: Option<Value>,
    ) -> Result<Value, InterpreterError> {
        Err(InterpreterError::Unsupported(format!("field load {field:?}")))
    }

    /// Writes a field
    ///
    /// # Errors
    /// Returns `InterpreterError` if the field cannot be written
    fn store_field(
        &mut self,
        field: MemberRefId,
        _receiver: Option<Value>,
        _value: Value,
    ) -> Result<(), InterpreterError> {
        Err(InterpreterError::Unsupported(format!("field store {field:?}")))
    }
}

/// Host that records every call and answers with a unit value
///
/// Calls to methods listed in `throwing` raise their first argument, or the
/// integer `0` without arguments.
#[derive(Debug, Default)]
pub struct RecordingHost {
    /// Calls in execution order
    pub calls: Vec<(MemberRefId, Vec<Value>)>,
    /// Methods that throw
    pub throwing: Vec<MemberRefId>,
}

impl RecordingHost {
    /// Creates an empty host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made to `method`
    #[must_use]
    pub fn count(&self, method: MemberRefId) -> usize {
        self.calls.iter().filter(|(called, _)| *called == method).count()
    }
}

impl Host for RecordingHost {
    fn call(
        &mut self,
        method: MemberRefId,
        _receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, InterpreterError> {
        self.calls.push((method, args.clone()));
        if self.throwing.contains(&method) {
            let exception = args.into_iter().next().unwrap_or(Value::Int(0));
            return Err(InterpreterError::Thrown(exception));
        }
        Ok(Value::Unit)
    }
}
