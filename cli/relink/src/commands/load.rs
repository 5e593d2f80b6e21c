//! `relink load`: load archives as one change-set and optionally invoke a
//! symbol.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use relink_core::{display_value, ModuleId, Value};
use relink_loader::{ModuleLoader, ReloadReport};

use super::{load_all, read_archives};

/// A `MODULE:SYMBOL` invocation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeTarget {
    pub module: ModuleId,
    pub symbol: String,
}

impl InvokeTarget {
    pub fn parse(s: &str) -> Result<Self> {
        let Some((module, symbol)) = s.split_once(':') else {
            bail!("invoke target '{s}' must look like MODULE:SYMBOL");
        };
        if symbol.is_empty() {
            bail!("invoke target '{s}' has no symbol");
        }
        Ok(Self {
            module: ModuleId::parse(module).with_context(|| format!("invoke target '{s}'"))?,
            symbol: symbol.to_string(),
        })
    }
}

/// Parse `--arg` values. Anything that is not valid JSON is taken as a
/// plain string.
pub fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

pub fn run(
    loader: &ModuleLoader,
    dirs: &[PathBuf],
    invoke: Option<&str>,
    args: &[String],
    out: &mut dyn Write,
) -> Result<()> {
    let target = invoke.map(InvokeTarget::parse).transpose()?;
    let report = load_all(loader, read_archives(dirs)?);
    print_report(&report, out)?;

    if let Some(target) = target {
        let Some(module) = loader.lookup(&target.module) else {
            bail!("module '{}' is not published", target.module);
        };
        let value = module
            .invoke(&target.symbol, &parse_args(args))
            .with_context(|| format!("invoking {}:{}", target.module, target.symbol))?;
        writeln!(out, "{}", display_value(&value))?;
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} module(s) failed to load");
    }
    Ok(())
}

pub fn print_report(report: &ReloadReport, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "reload {} (snapshot {})", report.cycle_id, report.snapshot_version)?;
    for id in &report.order {
        if let Some(outcome) = report.outcome(id) {
            writeln!(out, "  {id}: {outcome}")?;
        }
    }
    for (id, outcome) in &report.outcomes {
        if !report.order.contains(id) {
            writeln!(out, "  {id}: {outcome}")?;
        }
    }
    Ok(())
}
