use std::path::{Path, PathBuf};

use crate::{error::Result, loader::DocumentKind};

/// Expand command-line paths into the files to ingest.
///
/// Files are kept as given, whatever their extension, so ingestion can
/// report unsupported types. Directories are replaced by the supported
/// files found under them.
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(discover_files(path)?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Recursively walk a directory and discover ingestible document files.
///
/// Skips hidden files/directories (names starting with `.`) and only
/// returns files with supported extensions (.pdf, .txt, .md, any case).
/// Results are sorted by path.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(root: &Path, current: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();

        // Skip hidden files and directories.
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue; // broken symlink
            };
            // Directory links back into the tree would loop.
            if resolved.is_dir() && resolved.starts_with(root) {
                continue;
            }
            if resolved.is_dir() {
                walk_dir(root, &resolved, results)?;
            } else if is_supported(&resolved) {
                results.push(resolved);
            }
        } else if file_type.is_file() && is_supported(&path) {
            results.push(path);
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    DocumentKind::from_path(path).is_some()
}
