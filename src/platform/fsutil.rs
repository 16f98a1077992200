//! Small filesystem utilities.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use walkdir::WalkDir;

use crate::{LogKind, TraceGridError, TraceGridResult};

/// Versions with at least one log file directly inside `log_dir`, and the kinds each has.
///
/// File names follow `<prefix><version>`; an empty version label is ignored.
pub fn discover_versions(log_dir: &Path) -> TraceGridResult<BTreeMap<String, BTreeSet<LogKind>>> {
    let patterns: Vec<String> = LogKind::ALL
        .iter()
        .map(|kind| format!("{}*", kind.file_prefix()))
        .collect();
    let set = compile_globset(&patterns)?;

    let mut out: BTreeMap<String, BTreeSet<LogKind>> = BTreeMap::new();
    for entry in WalkDir::new(log_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let msg = format!("{}: {e}", log_dir.display());
            TraceGridError::Io(
                e.into_io_error()
                    .map(|io| std::io::Error::new(io.kind(), msg.clone()))
                    .unwrap_or_else(|| std::io::Error::other(msg)),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        for idx in set.matches(name) {
            let kind = LogKind::ALL[idx];
            let version = &name[kind.file_prefix().len()..];
            if version.is_empty() {
                continue;
            }
            out.entry(version.to_string()).or_default().insert(kind);
        }
    }
    tracing::debug!(dir = %log_dir.display(), versions = out.len(), "discovered run logs");
    Ok(out)
}

fn compile_globset(patterns: &[String]) -> TraceGridResult<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        let g = Glob::new(p)
            .map_err(|e| TraceGridError::InvalidArgument(format!("invalid glob {p:?}: {e}")))?;
        b.add(g);
    }
    b.build()
        .map_err(|e| TraceGridError::InvalidArgument(format!("invalid globset: {e}")))
}

pub fn write_json(path: &Path, value: &impl Serialize) -> TraceGridResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}
