// Snapshot files: a JSON array of tuples
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tuple_reconciler::{flatten_group, group_tuples, Tuple, TupleGroup};

pub fn load(path: &Path) -> Result<TupleGroup> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let tuples: Vec<Tuple> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid snapshot {}", path.display()))?;
    Ok(group_tuples(tuples))
}

pub fn save(path: &Path, group: &TupleGroup) -> Result<()> {
    let raw = serde_json::to_string_pretty(&flatten_group(group))?;
    fs::write(path, raw).with_context(|| format!("failed to write snapshot {}", path.display()))
}
