//! Reference compiler backends for relink.
//!
//! - [`ScriptCompiler`] compiles `.rls` expression scripts into function
//!   symbols that resolve every name through their module's environment.
//! - [`SymbolsLoader`] passes precompiled `*.symbols.toml` constant tables
//!   straight through.
//! - [`MixedCompiler`] does both for one archive, compiling the scripts
//!   against the loaded constants.

pub mod compiler;
pub mod eval;
pub mod mixed;
pub mod parse;
pub mod symbols;

// Re-exports for convenience.
pub use compiler::{ScriptCompiler, PLUGIN_ID as SCRIPT_PLUGIN_ID, SOURCE_SUFFIX};
pub use eval::MAX_EVAL_DEPTH;
pub use mixed::{MixedCompiler, PLUGIN_ID as MIXED_PLUGIN_ID};
pub use parse::{parse_source, Definition, Expr, ParseError, MAX_NESTING};
pub use symbols::{SymbolsLoader, PLUGIN_ID as SYMBOLS_PLUGIN_ID, SYMBOLS_SUFFIX};
