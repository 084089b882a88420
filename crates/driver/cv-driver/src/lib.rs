//! Emission driver
//!
//! Orchestrates one output module: lowers every iterator method on a worker
//! pool, registers the resulting state machines as nested types of their
//! iterators' owners, freezes the symbol table, indexes definitions and
//! bodies with one shared indexer, and encodes the reference tables.

pub mod config;

pub use config::DriverConfig;

use anyhow::{Context, Result, bail};
use cv_bound::Body;
use cv_emit::{EmitSession, TablesImage};
use cv_iterator_lower::{IteratorMethod, StateMachine, lower_iterator};
use cv_symbols::{FieldId, MethodId, ModuleId, SymbolTable, TypeDefId};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info};

/// Everything the binder hands over for one output module
#[derive(Debug)]
pub struct CompilationUnit {
    /// Symbol table; the driver adds the state machine types to it
    pub symbols: SymbolTable,
    /// Module being emitted
    pub module: ModuleId,
    /// Iterator methods to lower
    pub iterators: Vec<IteratorMethod>,
    /// Bodies of ordinary methods
    pub bodies: Vec<(MethodId, Body)>,
}

/// A state machine and the definitions registered for it
#[derive(Debug, Clone)]
pub struct EmittedMachine {
    /// Lowered machine
    pub machine: StateMachine,
    /// Nested type holding the machine
    pub type_def: TypeDefId,
    /// Field definitions, in slot order
    pub fields: Vec<FieldId>,
    /// Method definitions: step, dispose, then handlers
    pub methods: Vec<MethodId>,
}

/// Result of emitting one module
#[derive(Debug)]
pub struct EmitOutput {
    /// Frozen symbol table, including the machine types
    pub symbols: Arc<SymbolTable>,
    /// Lowered iterators, in input order
    pub machines: Vec<EmittedMachine>,
    /// Tables image
    pub image: TablesImage,
    /// Encoded image
    pub bytes: Vec<u8>,
    /// Path the image was written to
    pub written: Option<PathBuf>,
}

impl EmitOutput {
    /// Machine lowered from `method`
    #[must_use]
    pub fn machine_for(&self, method: MethodId) -> Option<&EmittedMachine> {
        self.machines
            .iter()
            .find(|emitted| emitted.machine.method == method)
    }
}

/// Emission session
#[derive(Debug, Default)]
pub struct Session {
    config: DriverConfig,
    cancelled: Arc<AtomicBool>,
}

impl Session {
    /// Creates a session
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Flag that stops work before the next unit starts
    ///
    /// Units already running complete; `emit` then fails.
    #[must_use]
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Emits one module
    ///
    /// # Errors
    /// Returns an error when
    /// - cancellation was requested or a worker panicked while lowering
    ///   iterators or indexing bodies
    /// - indexing definitions or bodies fails, for instance when a token
    ///   table is full
    /// - the tables image cannot be built or encoded, such as when a
    ///   reference reaches the encoder without a token
    /// - the output directory or file cannot be written
    pub fn emit(&self, unit: CompilationUnit) -> Result<EmitOutput> {
        let CompilationUnit {
            mut symbols,
            module,
            iterators,
            bodies,
        } = unit;
        let workers = self.config.workers();
        let options = self.config.lowering_options();

        let lowered = self
            .fan_out(&iterators, workers, |iterator| {
                lower_iterator(iterator, &symbols, &options)
            })
            .context("Failed to lower iterators")?;
        debug!(target: "driver", machines = lowered.len(), workers, "lowered iterators");

        let machines: Vec<EmittedMachine> = lowered
            .into_iter()
            .map(|machine| register_machine(&mut symbols, machine))
            .collect();

        let symbols = Arc::new(symbols);
        let session = EmitSession::new(Arc::clone(&symbols), module);
        session
            .indexer()
            .visit_definitions()
            .context("Failed to index definitions")?;

        let all_bodies: Vec<&Body> = bodies
            .iter()
            .map(|(_, body)| body)
            .chain(
                machines
                    .iter()
                    .flat_map(|emitted| emitted.machine.methods.iter().map(|method| &method.body)),
            )
            .collect();
        let indexed = self
            .fan_out(&all_bodies, workers, |body| session.indexer().visit_body(body))
            .context("Failed to index bodies")?;
        for result in indexed {
            result.context("Failed to index bodies")?;
        }
        debug!(
            target: "driver",
            bodies = all_bodies.len(),
            seen = session.indexer().seen_count(),
            tokens = session.tokens().len(),
            "indexed bodies"
        );

        let image = session.build_image().context("Failed to build tables image")?;
        let bytes = image.encode().context("Failed to encode tables image")?;

        let written = match &self.config.emit.output {
            Some(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create output directory: {}", parent.display())
                    })?;
                }
                fs::write(path, &bytes)
                    .with_context(|| format!("Failed to write tables image: {}", path.display()))?;
                Some(path.clone())
            }
            None => None,
        };

        info!(
            target: "driver",
            module = %image.module_name,
            machines = machines.len(),
            tokens = session.tokens().len(),
            bytes = bytes.len(),
            "emitted module"
        );

        Ok(EmitOutput {
            symbols,
            machines,
            image,
            bytes,
            written,
        })
    }

    /// Runs `work` over `items` on up to `workers` scoped threads, keeping
    /// input order
    fn fan_out<T, R, F>(&self, items: &[T], workers: usize, work: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_len = items.len().div_ceil(workers.max(1));
        let cancelled = self.cancelled.as_ref();
        let work = &work;

        let joined: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = items
                .chunks(chunk_len)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut results = Vec::with_capacity(chunk.len());
                        for item in chunk {
                            if cancelled.load(Ordering::Relaxed) {
                                return None;
                            }
                            results.push(work(item));
                        }
                        Some(results)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join()).collect()
        });

        let mut results = Vec::with_capacity(items.len());
        for chunk in joined {
            match chunk {
                Ok(Some(chunk)) => results.extend(chunk),
                Ok(None) => bail!("emission cancelled"),
                Err(_) => bail!("worker thread panicked"),
            }
        }
        Ok(results)
    }
}

/// Adds the machine type, its fields and its methods to the symbol table
fn register_machine(symbols: &mut SymbolTable, machine: StateMachine) -> EmittedMachine {
    let owner = symbols.methods[machine.method].owner;
    let type_def = symbols.add_nested_type(owner, &machine.name, 0);
    let fields = machine
        .fields
        .iter()
        .map(|field| symbols.add_field(type_def, &field.name, field.ty))
        .collect();
    let methods = machine
        .methods
        .iter()
        .map(|method| symbols.add_method(type_def, &method.name, &[], method.ret))
        .collect();
    debug!(target: "driver", machine = %machine.name, "registered state machine type");

    EmittedMachine {
        machine,
        type_def,
        fields,
        methods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_bound::{BodyBuilder, Expr, Stmt};
    use cv_emit::TableKind;
    use cv_symbols::Primitive;

    fn unit() -> CompilationUnit {
        let mut symbols = SymbolTable::new();
        let corlib = symbols.add_assembly("corlib");
        let corlib_module = symbols.add_module(corlib, "corlib.dll");
        let console = symbols.add_type(corlib_module, Some("System"), "Console", 0);
        let int32 = symbols.primitive(Primitive::I4);
        let void = symbols.primitive(Primitive::Void);
        let write = symbols.add_method(console, "WriteLine", &[("value", int32)], void);
        let write = symbols.method_ref(write);

        let app = symbols.add_assembly("app");
        let module = symbols.add_module(app, "app.dll");
        let program = symbols.add_type(module, Some("App"), "Program", 0);
        let numbers = symbols.add_method(program, "Numbers", &[], int32);

        let mut builder = BodyBuilder::new(symbols.interner.clone());
        let try_id = builder.try_id();
        let body = builder.finish(vec![Stmt::try_finally(
            try_id,
            vec![Stmt::Yield(Expr::int(1))],
            vec![Stmt::Expr(Expr::call(write, vec![Expr::int(0)]))],
        )]);

        CompilationUnit {
            symbols,
            module,
            iterators: vec![IteratorMethod {
                method: numbers,
                body,
                element_ty: int32,
            }],
            bodies: Vec::new(),
        }
    }

    #[test]
    fn test_machine_becomes_nested_type() {
        let unit = unit();
        let numbers = unit.iterators[0].method;
        let output = Session::new(DriverConfig::default()).emit(unit).unwrap();

        let emitted = output.machine_for(numbers).unwrap();
        let type_def = &output.symbols.type_defs[emitted.type_def];
        assert_eq!(output.symbols.interner.resolve(type_def.name), "<>d__Numbers");
        assert!(type_def.enclosing.is_some());
        assert_eq!(emitted.methods.len(), 3);
        assert_eq!(emitted.fields.len(), emitted.machine.fields.len());

        // Program and its machine
        assert_eq!(output.image.row_count(TableKind::TypeDef), 2);
        // The finally handler calls Console.WriteLine
        assert_eq!(output.image.row_count(TableKind::MemberRef), 1);
        assert_eq!(output.image.row_count(TableKind::AssemblyRef), 1);
    }

    #[test]
    fn test_output_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("app.tables");
        let mut config = DriverConfig::default();
        config.emit.output = Some(path.clone());
        config.emit.workers = 2;

        let output = Session::new(config).emit(unit()).unwrap();

        assert_eq!(output.written.as_deref(), Some(path.as_path()));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(TablesImage::decode(&bytes).unwrap(), output.image);
    }

    #[test]
    fn test_cancelled_session_fails() {
        let session = Session::new(DriverConfig::default());
        session.cancellation().store(true, Ordering::Relaxed);

        let error = session.emit(unit()).unwrap_err();
        assert!(format!("{error:#}").contains("emission cancelled"));
    }
}
