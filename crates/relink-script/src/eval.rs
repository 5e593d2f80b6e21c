//! Evaluation of parsed script expressions.

use std::cell::Cell;

use relink_core::{display_value, ExecutionEnvironment, InvocationError, Value};

use crate::parse::Expr;

/// Deepest evaluation on one thread, counting nested expressions and calls
/// between script functions together.
pub const MAX_EVAL_DEPTH: usize = 256;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one level of [`DEPTH`] until dropped.
struct DepthGuard {
    depth: usize,
}

impl DepthGuard {
    fn enter() -> Self {
        let depth = DEPTH.with(|d| {
            let depth = d.get() + 1;
            d.set(depth);
            depth
        });
        Self { depth }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Evaluate `expr` as the body of `symbol`. Every name lookup goes through
/// `env`, so a script can only reach what its boundary exposes.
///
/// Runaway recursion fails the invocation once [`MAX_EVAL_DEPTH`] is reached.
pub fn evaluate(
    expr: &Expr,
    env: &ExecutionEnvironment,
    args: &[Value],
    symbol: &str,
) -> Result<Value, InvocationError> {
    let guard = DepthGuard::enter();
    if guard.depth > MAX_EVAL_DEPTH {
        return Err(InvocationError::Failed {
            symbol: symbol.to_string(),
            message: "recursion limit exceeded".into(),
        });
    }
    match expr {
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Int(n) => Ok(Value::from(*n)),
        Expr::Arg(n) => args.get(n - 1).cloned().ok_or_else(|| InvocationError::Arity {
            symbol: symbol.to_string(),
            expected: *n,
            actual: args.len(),
        }),
        Expr::Ref(name) => env.invoke(name, &[]),
        Expr::Call(name, call_args) => {
            let values = call_args
                .iter()
                .map(|a| evaluate(a, env, args, symbol))
                .collect::<Result<Vec<_>, _>>()?;
            env.invoke(name, &values)
        }
        Expr::Add(l, r) => {
            let left = evaluate(l, env, args, symbol)?;
            let right = evaluate(r, env, args, symbol)?;
            add(&left, &right, symbol)
        }
    }
}

fn add(left: &Value, right: &Value, symbol: &str) -> Result<Value, InvocationError> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return a
            .checked_add(b)
            .map(Value::from)
            .ok_or_else(|| InvocationError::Failed {
                symbol: symbol.to_string(),
                message: format!("integer overflow in {a} + {b}"),
            });
    }
    Ok(Value::String(format!(
        "{}{}",
        display_value(left),
        display_value(right)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;
    use serde_json::json;

    fn eval_body(source: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let defs = parse_source(source, "m").unwrap();
        evaluate(&defs[0].body, &ExecutionEnvironment::detached(), args, &defs[0].name)
    }

    #[test]
    fn integers_add_and_strings_concatenate() {
        assert_eq!(eval_body("let a = 2 + $1", &[json!(40)]).unwrap(), json!(42));
        assert_eq!(eval_body("let a = \"n=\" + $1", &[json!(7)]).unwrap(), json!("n=7"));
        assert_eq!(
            eval_body("let a = $1 + $2", &[json!(true), json!("!")]).unwrap(),
            json!("true!")
        );
    }

    #[test]
    fn overflow_is_an_invocation_failure() {
        let err = eval_body("let a = $1 + 1", &[json!(i64::MAX)]).unwrap_err();
        assert!(matches!(err, InvocationError::Failed { symbol, .. } if symbol == "m.a"));
    }

    #[test]
    fn missing_argument_reports_arity() {
        let err = eval_body("let a = $2", &[json!(1)]).unwrap_err();
        assert_eq!(
            err,
            InvocationError::Arity {
                symbol: "m.a".into(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn references_outside_the_environment_are_violations() {
        let err = eval_body("let a = secret.value", &[]).unwrap_err();
        assert!(matches!(
            err,
            InvocationError::IsolationViolation { symbol, .. } if symbol == "secret.value"
        ));
    }
}
