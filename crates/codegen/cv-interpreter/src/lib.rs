//! Bound-tree interpreter
//!
//! Executes bound bodies directly. Its main client is verification: driving a
//! lowered state machine step by step and observing which finally handlers
//! run, without going through emission.

pub mod host;
pub mod interpreter;
pub mod machine;
pub mod value;

pub use host::{Host, RecordingHost};
pub use interpreter::{Interpreter, InterpreterError};
pub use machine::MachineInstance;
pub use value::Value;
