use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, UploadError};

/// A file to upload and the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub path: PathBuf,
    pub key: String,
}

/// Recursively list the files under `root`, sorted by key.
///
/// Dot-files and dot-directories are skipped unless `include_hidden` is set. Symlinks are
/// followed, but each directory is walked at most once.
pub fn collect_files(root: &Path, include_hidden: bool) -> Result<Vec<AssetFile>> {
    if !root.is_dir() {
        return Err(UploadError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![(root.to_path_buf(), Vec::<String>::new())];

    while let Some((dir, segments)) = pending.pop() {
        let real = fs::canonicalize(&dir).map_err(|source| UploadError::Io {
            path: dir.clone(),
            source,
        })?;
        if !visited.insert(real) {
            tracing::warn!(path = %dir.display(), "Skipping already visited directory");
            continue;
        }

        let entries = fs::read_dir(&dir).map_err(|source| UploadError::Io {
            path: dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| UploadError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();

            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::warn!(path = %path.display(), "Skipping non UTF-8 file name");
                continue;
            };
            if !include_hidden && name.starts_with('.') {
                tracing::debug!(path = %path.display(), "Skipping hidden entry");
                continue;
            }

            let mut child = segments.clone();
            child.push(name);

            if path.is_dir() {
                pending.push((path, child));
            } else if path.is_file() {
                files.push(AssetFile {
                    path,
                    key: child.join("/"),
                });
            }
        }
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}
