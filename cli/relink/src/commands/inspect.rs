//! `relink inspect`: everything one module can see.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use relink_core::{ModuleId, Origin};
use relink_loader::ModuleLoader;

use super::{describe_origin, load_all, read_archives};

pub fn run(
    loader: &ModuleLoader,
    dirs: &[PathBuf],
    module: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let id = ModuleId::parse(module)?;
    let report = load_all(loader, read_archives(dirs)?);
    let Some(compiled) = loader.lookup(&id) else {
        match report.outcome(&id) {
            Some(outcome) => bail!("module '{id}' is not published: {outcome}"),
            None => bail!("module '{id}' is not among the loaded archives"),
        }
    };

    writeln!(
        out,
        "{} r{} [{}] {}",
        compiled.id(),
        compiled.revision(),
        compiled.compiler().map_or("no compiler", |p| p.as_str()),
        compiled.content_hash().short()
    )?;
    for linked in compiled.linked_dependencies() {
        writeln!(out, "  links {} r{}", linked.id, linked.revision)?;
    }
    for name in compiled.symbols().names() {
        writeln!(out, "  {name}  ({})", describe_origin(&Origin::Own))?;
    }
    for (name, origin) in compiled.environment().boundary().visible() {
        if !compiled.symbols().contains(&name) {
            writeln!(out, "  {name}  ({})", describe_origin(&origin))?;
        }
    }
    Ok(())
}
