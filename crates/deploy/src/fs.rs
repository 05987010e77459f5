//! File system utils.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

pub struct FsHandler;

impl FsHandler {
    /// Create the parent directory of `path` if it doesn't exist.
    pub fn create_parent_directory(path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent)?;
                tracing::debug!("Created directory: {}", parent.display());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Replace the content of `path` without ever leaving a half-written file.
    ///
    /// The bytes are written and synced to a sibling temporary file, which is
    /// then renamed over `path`.
    pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
        Self::create_parent_directory(path)?;

        let tmp_path = Self::sibling(path, "tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, path)
    }

    /// Open (creating if needed) the lock file guarding `path`.
    pub fn open_lock_file(path: &Path) -> io::Result<(PathBuf, File)> {
        Self::create_parent_directory(path)?;

        let lock_path = Self::sibling(path, "lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        Ok((lock_path, file))
    }

    /// `<path>.<suffix>`, next to `path`.
    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(suffix);
        path.with_file_name(name)
    }
}
