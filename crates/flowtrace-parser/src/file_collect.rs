use crate::{Dialect, LanguageRegistry};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Every file under `root` with a recognized dialect, in a stable order.
///
/// Ignore files and hidden-entry rules are not applied: the search covers the
/// tree as it is on disk, minus directories named in `exclude_dirs`.
pub fn collect_source_files(
    root: &Path,
    exclude_dirs: &[String],
    registry: &LanguageRegistry,
) -> Vec<(PathBuf, Dialect)> {
    let excluded: Vec<String> = exclude_dirs.to_vec();

    let mut walker_builder = WalkBuilder::new(root);
    walker_builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !excluded.iter().any(|dir| dir.as_str() == name.as_ref())
        });

    let mut files = Vec::new();
    for dent in walker_builder.build() {
        let dent = match dent {
            Ok(d) => d,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };

        if !dent.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let path = dent.path();
        if let Some(dialect) = registry.detect_dialect(path) {
            files.push((path.to_path_buf(), dialect));
        }
    }

    debug!(
        "Collected {} source files under {}",
        files.len(),
        root.display()
    );
    files
}
