//! String interning for identifiers shared across emission workers

pub use lasso::Spur as Symbol;
use lasso::ThreadedRodeo;
use std::fmt;
use std::sync::Arc;

/// Thread-safe string interner
///
/// Cloning is cheap and every clone resolves the same symbols, so one
/// interner can be handed to each worker of an emission session.
#[derive(Clone)]
pub struct Interner {
    inner: Arc<ThreadedRodeo>,
}

impl Interner {
    /// Creates an empty interner
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ThreadedRodeo::new()),
        }
    }

    /// Interns a string, returning the existing symbol if already present
    pub fn intern(&self, text: &str) -> Symbol {
        self.inner.get_or_intern(text)
    }

    /// Looks up a string without interning it
    #[must_use]
    pub fn get(&self, text: &str) -> Option<Symbol> {
        self.inner.get(text)
    }

    /// Resolves a symbol to an owned string
    #[must_use]
    pub fn resolve(&self, sym: Symbol) -> String {
        self.inner.resolve(&sym).to_string()
    }

    /// Resolves a symbol, returning `None` for symbols from another interner
    #[must_use]
    pub fn try_resolve(&self, sym: Symbol) -> Option<String> {
        self.inner.try_resolve(&sym).map(ToString::to_string)
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_symbols() {
        let interner = Interner::new();
        let other = interner.clone();
        let sym = interner.intern("MoveNext");
        assert_eq!(other.get("MoveNext"), Some(sym));
        assert_eq!(other.resolve(sym), "MoveNext");
    }
}
