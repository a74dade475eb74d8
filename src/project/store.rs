//! project::store
//!
//! The metadata store seam.
//!
//! The template branch is wiped before every mutation, so metadata files
//! have to be carried across from the real working tree. The engine does
//! that through [`ConfigStore`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use super::schema::{CONFIG_FILE_NAME, PROJECT_CONFIG_FILE_NAME};

/// Lists and copies persisted metadata files.
pub trait ConfigStore {
    /// Metadata files beneath `root`, relative to it.
    fn metadata_files(&self, root: &Path) -> anyhow::Result<Vec<PathBuf>>;

    /// Copy every metadata file beneath `from` to the same relative place
    /// beneath `to`.
    fn copy_metadata(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        for relative in self.metadata_files(from)? {
            let target = to.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::copy(from.join(&relative), &target)
                .with_context(|| format!("failed to copy {}", relative.display()))?;
        }
        Ok(())
    }
}

/// Finds `flexlate.json` and `flexlate-project.json` files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileConfigStore;

impl ConfigStore for FileConfigStore {
    fn metadata_files(&self, root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name();
            if name == CONFIG_FILE_NAME || name == PROJECT_CONFIG_FILE_NAME {
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .with_context(|| format!("{} escaped {}", entry.path().display(), root.display()))?;
                found.push(relative.to_path_buf());
            }
        }

        tracing::debug!(root = %root.display(), files = found.len(), "found metadata files");
        Ok(found)
    }
}
