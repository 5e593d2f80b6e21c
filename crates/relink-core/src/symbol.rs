//! Executable symbols and symbol tables.
//!
//! Symbols are named by dotted paths (`lib.a.greeting`). A symbol body is
//! either a constant [`Value`] or a function. Functions receive the
//! [`ExecutionEnvironment`] of the module that owns them, so every further
//! lookup they perform goes through that module's isolation boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::environment::ExecutionEnvironment;
use crate::error::{CoreError, InvocationError, Result};

/// Values passed to and returned from symbols.
pub type Value = serde_json::Value;

/// Render a value as text: strings without quotes, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Something that can be called with arguments inside an environment.
pub trait Callable: Send + Sync {
    fn call(
        &self,
        env: &ExecutionEnvironment,
        args: &[Value],
    ) -> std::result::Result<Value, InvocationError>;
}

impl<F> Callable for F
where
    F: Fn(&ExecutionEnvironment, &[Value]) -> std::result::Result<Value, InvocationError>
        + Send
        + Sync,
{
    fn call(
        &self,
        env: &ExecutionEnvironment,
        args: &[Value],
    ) -> std::result::Result<Value, InvocationError> {
        self(env, args)
    }
}

/// The executable part of a symbol.
#[derive(Clone)]
pub enum SymbolBody {
    Constant(Value),
    Function(Arc<dyn Callable>),
}

impl fmt::Debug for SymbolBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolBody::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            SymbolBody::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A named executable unit.
#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    body: SymbolBody,
}

impl Symbol {
    /// A constant symbol.
    pub fn constant(name: impl Into<String>, value: Value) -> Result<Self> {
        Self::with_body(name.into(), SymbolBody::Constant(value))
    }

    /// A function symbol from a closure.
    pub fn function<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&ExecutionEnvironment, &[Value]) -> std::result::Result<Value, InvocationError>
            + Send
            + Sync
            + 'static,
    {
        Self::callable(name, Arc::new(f))
    }

    /// A function symbol from any [`Callable`].
    pub fn callable(name: impl Into<String>, f: Arc<dyn Callable>) -> Result<Self> {
        Self::with_body(name.into(), SymbolBody::Function(f))
    }

    /// A symbol from an already-built body.
    pub fn with_body(name: String, body: SymbolBody) -> Result<Self> {
        validate_dotted(&name).map_err(|reason| CoreError::InvalidSymbolName {
            name: name.clone(),
            reason,
        })?;
        Ok(Self { name, body })
    }

    /// Fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The symbol body.
    pub fn body(&self) -> &SymbolBody {
        &self.body
    }

    /// Whether the symbol is a function.
    pub fn is_function(&self) -> bool {
        matches!(self.body, SymbolBody::Function(_))
    }

    /// Evaluate the symbol. Constants accept no arguments.
    pub fn invoke(
        &self,
        env: &ExecutionEnvironment,
        args: &[Value],
    ) -> std::result::Result<Value, InvocationError> {
        match &self.body {
            SymbolBody::Constant(v) if args.is_empty() => Ok(v.clone()),
            SymbolBody::Constant(_) => Err(InvocationError::NotCallable(self.name.clone())),
            SymbolBody::Function(f) => f.call(env, args),
        }
    }
}

/// An ordered set of symbols keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Arc<Symbol>>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol. Names must be unique within the table.
    pub fn insert(&mut self, symbol: Symbol) -> Result<()> {
        self.insert_shared(Arc::new(symbol))
    }

    /// Add a symbol that may also live in other tables.
    pub fn insert_shared(&mut self, symbol: Arc<Symbol>) -> Result<()> {
        if self.symbols.contains_key(symbol.name()) {
            return Err(CoreError::DuplicateSymbol(symbol.name().to_string()));
        }
        self.symbols.insert(symbol.name().to_string(), symbol);
        Ok(())
    }

    /// Define a constant.
    pub fn define_constant(&mut self, name: impl Into<String>, value: Value) -> Result<()> {
        self.insert(Symbol::constant(name, value)?)
    }

    /// Define a function.
    pub fn define_function<F>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&ExecutionEnvironment, &[Value]) -> std::result::Result<Value, InvocationError>
            + Send
            + Sync
            + 'static,
    {
        self.insert(Symbol::function(name, f)?)
    }

    /// Look up a symbol by exact name.
    pub fn get(&self, name: &str) -> Option<&Arc<Symbol>> {
        self.symbols.get(name)
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Symbols in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Symbol>> {
        self.symbols.values()
    }

    /// A new table holding the symbols accepted by `keep`.
    pub fn filtered(&self, mut keep: impl FnMut(&Symbol) -> bool) -> SymbolTable {
        SymbolTable {
            symbols: self
                .symbols
                .iter()
                .filter(|(_, s)| keep(s))
                .map(|(k, s)| (k.clone(), Arc::clone(s)))
                .collect(),
        }
    }
}

/// Check that `path` is a dotted name made of `[A-Za-z0-9_-]` segments.
pub fn validate_dotted(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Err("name is empty".into());
    }
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err("empty path segment".into());
        }
        if let Some(c) = segment
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-')))
        {
            return Err(format!("illegal character '{c}'"));
        }
    }
    Ok(())
}

/// Whether `name` lies inside the namespace `prefix`, matching whole segments.
///
/// `pkg.allowed` covers `pkg.allowed` and `pkg.allowed.X` but not
/// `pkg.allowedX`.
pub fn within_namespace(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}
