//! Iterator lowering
//!
//! Turns an iterator method body into a resumable state machine: a step
//! method that runs to the next suspension point, a dispose method that runs
//! the finally handlers enclosing the suspended state, and one synthesized
//! handler per try statement that contains a suspension point.
//!
//! # State encoding
//!
//! | value | meaning |
//! |---|---|
//! | `0` | not started |
//! | `1..=N` | suspended at the N-th suspension point |
//! | `-1` | running outside any finally frame |
//! | `-2` | finished |
//! | `-3, -4, ...` | running inside a finally frame, one value per frame |

pub mod analyzer;
mod dispose;
mod frames;
mod rewriter;

pub use analyzer::YieldTryAnalysis;

use cv_bound::{Body, FieldSlot, LabelId, LocalId, ParamId, Stmt, SynthMethodId};
use cv_symbols::{MethodId, Primitive, SymbolTable, TyId};
use tracing::debug;

/// Entry state, before the first step
pub const INITIAL_STATE: i32 = 0;
/// Executing outside any finally frame
pub const RUNNING_STATE: i32 = -1;
/// Terminal state
pub const FINISHED_STATE: i32 = -2;
/// Finalize state of the first frame; later frames count down from here
pub const FIRST_FINALIZE_STATE: i32 = -3;

/// Field holding the state
pub const STATE_FIELD: FieldSlot = FieldSlot(0);
/// Field holding the last produced element
pub const CURRENT_FIELD: FieldSlot = FieldSlot(1);
/// Step method: runs to the next suspension point
pub const STEP_METHOD: SynthMethodId = SynthMethodId(0);
/// Dispose method: runs pending finally handlers
pub const DISPOSE_METHOD: SynthMethodId = SynthMethodId(1);

/// An iterator method as produced by the binder
#[derive(Debug, Clone)]
pub struct IteratorMethod {
    /// Method whose body is lowered
    pub method: MethodId,
    /// Bound body
    pub body: Body,
    /// Type of the produced elements
    pub element_ty: TyId,
}

/// Lowering knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweringOptions {
    /// Prefix of generated machine type names
    pub name_prefix: String,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            name_prefix: "<>d__".to_string(),
        }
    }
}

/// What a machine field stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// The state
    State,
    /// The current element
    Current,
    /// A hoisted parameter
    Param(ParamId),
    /// A hoisted local
    Local(LocalId),
}

/// One field of a state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineField {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TyId,
    /// Role
    pub kind: FieldKind,
}

/// Role of a synthesized method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// `MoveNext`
    Step,
    /// `Dispose`
    Dispose,
    /// Finally handler of one frame
    Finally {
        /// State of the frame the handler belongs to
        finalize_state: i32,
    },
}

/// A method synthesized for a state machine
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedMethod {
    /// Method name
    pub name: String,
    /// Role
    pub kind: MethodKind,
    /// Return type
    pub ret: TyId,
    /// Body
    pub body: Body,
}

/// A lowered iterator
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    /// Name of the machine type
    pub name: String,
    /// Iterator method the machine was lowered from
    pub method: MethodId,
    /// Type of the produced elements
    pub element_ty: TyId,
    /// Fields, indexed by [`FieldSlot`]
    pub fields: Vec<MachineField>,
    /// Methods, indexed by [`SynthMethodId`]: step, dispose, then handlers
    pub methods: Vec<SynthesizedMethod>,
    /// Non-negative states, initial state first
    pub resume_states: Vec<i32>,
    /// Finalize states in frame pre-order
    pub finalize_states: Vec<i32>,
}

impl StateMachine {
    /// Field in `slot`
    #[must_use]
    pub fn field(&self, slot: FieldSlot) -> &MachineField {
        &self.fields[slot.0 as usize]
    }

    /// Synthesized method `id`
    #[must_use]
    pub fn method(&self, id: SynthMethodId) -> &SynthesizedMethod {
        &self.methods[id.0 as usize]
    }

    /// Step method
    #[must_use]
    pub fn step(&self) -> &SynthesizedMethod {
        self.method(STEP_METHOD)
    }

    /// Dispose method
    #[must_use]
    pub fn dispose(&self) -> &SynthesizedMethod {
        self.method(DISPOSE_METHOD)
    }

    /// Finally handlers, outermost frame first
    pub fn handlers(&self) -> impl Iterator<Item = &SynthesizedMethod> {
        self.methods.iter().skip(2)
    }

    /// Field a parameter was hoisted into
    #[must_use]
    pub fn param_slot(&self, param: ParamId) -> Option<FieldSlot> {
        self.fields
            .iter()
            .position(|field| field.kind == FieldKind::Param(param))
            .map(|index| FieldSlot(index as u32))
    }

    /// Cases of the step method's resume dispatch
    #[must_use]
    pub fn resume_dispatch(&self) -> &[(i64, LabelId)] {
        let mut stmts = self.step().body.root.as_slice();
        if let [Stmt::TryFault { body, .. }] = stmts {
            stmts = body.as_slice();
        }
        stmts
            .iter()
            .find_map(|stmt| match stmt {
                Stmt::Switch { cases, .. } => Some(cases.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Lowers one iterator method
///
/// # Panics
///
/// Panics on bodies the binder never produces: a `return` statement, or a
/// suspension point in a position the analyzer rejects.
pub fn lower_iterator(
    iterator: &IteratorMethod,
    symbols: &SymbolTable,
    options: &LoweringOptions,
) -> StateMachine {
    let analysis = YieldTryAnalysis::analyze(&iterator.body);
    let mut rewriter = rewriter::Rewriter::new(symbols, &analysis, &iterator.body);
    let step = rewriter.rewrite_step(iterator.body.root.clone());
    let mut output = rewriter.finish();

    let int32 = symbols.primitive(Primitive::I4);
    let dispose = dispose::build_dispose(&output.frames, &mut output.ids, int32);

    let method_name = symbols
        .interner
        .resolve(symbols.methods[iterator.method].name);
    let name = format!("{}{method_name}", options.name_prefix);

    let mut methods = Vec::with_capacity(2 + output.handlers.len());
    methods.push(SynthesizedMethod {
        name: "MoveNext".to_string(),
        kind: MethodKind::Step,
        ret: symbols.primitive(Primitive::Bool),
        body: step,
    });
    methods.push(SynthesizedMethod {
        name: "Dispose".to_string(),
        kind: MethodKind::Dispose,
        ret: symbols.primitive(Primitive::Void),
        body: dispose,
    });
    methods.extend(output.handlers);
    for method in &mut methods {
        method.body.label_count = output.ids.next_label;
        method.body.try_count = output.ids.next_try;
    }

    let machine = StateMachine {
        name,
        method: iterator.method,
        element_ty: iterator.element_ty,
        fields: machine_fields(iterator, symbols),
        methods,
        resume_states: output.resume_states,
        finalize_states: output.finalize_states,
    };

    debug!(
        target: "iterator_lower",
        machine = %machine.name,
        states = machine.resume_states.len(),
        frames = machine.finalize_states.len(),
        fields = machine.fields.len(),
        "lowered iterator"
    );
    machine
}

/// State, current, then every parameter and local in declaration order
fn machine_fields(iterator: &IteratorMethod, symbols: &SymbolTable) -> Vec<MachineField> {
    let body = &iterator.body;
    let mut fields = Vec::with_capacity(2 + body.params.len() + body.locals.len());
    fields.push(MachineField {
        name: "<>1__state".to_string(),
        ty: symbols.primitive(Primitive::I4),
        kind: FieldKind::State,
    });
    fields.push(MachineField {
        name: "<>2__current".to_string(),
        ty: iterator.element_ty,
        kind: FieldKind::Current,
    });
    for (index, param) in body.params.iter().enumerate() {
        let name = param.name.map_or_else(
            || format!("<>3__arg{index}"),
            |name| symbols.interner.resolve(name),
        );
        fields.push(MachineField {
            name,
            ty: param.ty,
            kind: FieldKind::Param(ParamId(index as u32)),
        });
    }
    for (index, local) in body.locals.iter().enumerate() {
        let name = match local.name {
            Some(name) => format!("<{}>5__{}", symbols.interner.resolve(name), index + 1),
            None => format!("<>7__wrap{}", index + 1),
        };
        fields.push(MachineField {
            name,
            ty: local.ty,
            kind: FieldKind::Local(LocalId(index as u32)),
        });
    }
    fields
}
