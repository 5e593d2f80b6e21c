//! `relink order`: show how a set of archives would be built.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use relink_loader::{ChangeSet, ModuleLoader};

use super::read_archives;

pub fn run(loader: &ModuleLoader, dirs: &[PathBuf], out: &mut dyn Write) -> Result<()> {
    let changes = read_archives(dirs)?
        .into_iter()
        .fold(ChangeSet::new(), |changes, archive| changes.add(archive));
    let resolution = loader.resolve_change_set(&changes);

    for (index, tier) in resolution.tiers.iter().enumerate() {
        let names: Vec<String> = tier.iter().map(ToString::to_string).collect();
        writeln!(out, "tier {index}: {}", names.join(", "))?;
    }
    for (id, error) in &resolution.rejected {
        writeln!(out, "rejected {id}: {error}")?;
    }
    Ok(())
}
