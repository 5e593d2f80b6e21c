//! The core capability set visible to every module.

use relink_core::{
    display_value, CoreError, ExecutionEnvironment, InvocationError, SymbolTable, Value,
};

/// Namespace of the built-in core symbols.
pub const CORE_NAMESPACE: &str = "relink.core";

/// Runtime version reported by `relink.core.version`.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the default core table.
pub fn core_symbols() -> Result<SymbolTable, CoreError> {
    let mut table = SymbolTable::new();
    table.define_constant(
        format!("{CORE_NAMESPACE}.version"),
        Value::String(RUNTIME_VERSION.to_string()),
    )?;
    table.define_function(format!("{CORE_NAMESPACE}.concat"), concat)?;
    table.define_function(format!("{CORE_NAMESPACE}.upper"), upper)?;
    table.define_function(format!("{CORE_NAMESPACE}.lower"), lower)?;
    table.define_function(format!("{CORE_NAMESPACE}.len"), len)?;
    Ok(table)
}

fn concat(_: &ExecutionEnvironment, args: &[Value]) -> Result<Value, InvocationError> {
    Ok(Value::String(args.iter().map(display_value).collect()))
}

fn upper(_: &ExecutionEnvironment, args: &[Value]) -> Result<Value, InvocationError> {
    let s = single_string("relink.core.upper", args)?;
    Ok(Value::String(s.to_uppercase()))
}

fn lower(_: &ExecutionEnvironment, args: &[Value]) -> Result<Value, InvocationError> {
    let s = single_string("relink.core.lower", args)?;
    Ok(Value::String(s.to_lowercase()))
}

fn len(_: &ExecutionEnvironment, args: &[Value]) -> Result<Value, InvocationError> {
    let symbol = "relink.core.len";
    check_arity(symbol, args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
            return Err(InvocationError::Failed {
                symbol: symbol.into(),
                message: format!("no length for {other}"),
            })
        }
    };
    Ok(Value::from(n))
}

fn single_string<'a>(symbol: &str, args: &'a [Value]) -> Result<&'a str, InvocationError> {
    check_arity(symbol, args, 1)?;
    args[0].as_str().ok_or_else(|| InvocationError::Failed {
        symbol: symbol.into(),
        message: format!("expected a string, got {}", args[0]),
    })
}

fn check_arity(symbol: &str, args: &[Value], expected: usize) -> Result<(), InvocationError> {
    if args.len() != expected {
        return Err(InvocationError::Arity {
            symbol: symbol.into(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}
