//! Body factory
//!
//! Binders and lowering passes allocate locals, labels and try ids through
//! the builder so that every id in a finished body is unique.

use crate::{Body, LabelId, LocalDecl, LocalId, ParamId, Stmt, TryId};
use cv_intern::Interner;
use cv_symbols::TyId;

/// Builder for constructing bound bodies
pub struct BodyBuilder {
    interner: Interner,
    params: Vec<LocalDecl>,
    locals: Vec<LocalDecl>,
    label_count: u32,
    try_count: u32,
}

impl BodyBuilder {
    /// Creates an empty builder
    #[must_use]
    pub fn new(interner: Interner) -> Self {
        Self {
            interner,
            params: Vec::new(),
            locals: Vec::new(),
            label_count: 0,
            try_count: 0,
        }
    }

    /// Creates a builder whose label and try ids continue after `body`'s
    ///
    /// Used when statements taken from `body` are moved into a new body.
    #[must_use]
    pub fn continuing(interner: Interner, body: &Body) -> Self {
        Self {
            interner,
            params: Vec::new(),
            locals: Vec::new(),
            label_count: body.label_count,
            try_count: body.try_count,
        }
    }

    /// Declares a parameter
    pub fn param(&mut self, name: &str, ty: TyId) -> ParamId {
        let id = ParamId(self.params.len() as u32);
        self.params.push(LocalDecl {
            name: Some(self.interner.intern(name)),
            ty,
        });
        id
    }

    /// Declares a named local
    pub fn local(&mut self, name: &str, ty: TyId) -> LocalId {
        let name = self.interner.intern(name);
        self.push_local(Some(name), ty)
    }

    /// Declares a compiler temporary
    pub fn temp(&mut self, ty: TyId) -> LocalId {
        self.push_local(None, ty)
    }

    /// Allocates a fresh label
    pub fn label(&mut self) -> LabelId {
        let id = LabelId(self.label_count);
        self.label_count += 1;
        id
    }

    /// Allocates a fresh try id
    pub fn try_id(&mut self) -> TryId {
        let id = TryId(self.try_count);
        self.try_count += 1;
        id
    }

    /// Number of labels allocated so far
    #[must_use]
    pub fn label_count(&self) -> u32 {
        self.label_count
    }

    /// Finishes building with the given top-level statements
    #[must_use]
    pub fn finish(self, root: Vec<Stmt>) -> Body {
        Body {
            params: self.params,
            locals: self.locals,
            root,
            label_count: self.label_count,
            try_count: self.try_count,
        }
    }

    fn push_local(&mut self, name: Option<cv_intern::Symbol>, ty: TyId) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalDecl { name, ty });
        id
    }
}
