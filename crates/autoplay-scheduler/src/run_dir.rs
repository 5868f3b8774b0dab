//! Temporary per-run working directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

/// Timestamp part of a run directory name.
pub const RUN_DIR_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_%6f";

const SUFFIX_DIGITS: usize = 5;

/// Permissions of a run directory: owner and group only.
#[cfg(unix)]
pub const RUN_DIR_MODE: u32 = 0o750;

/// Unique, not yet created directory name below `base`.
pub fn allocate_path(base: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    base.join(format!("{}_{}", now.format(RUN_DIR_TIME_FORMAT), suffix))
}

/// A run directory that is removed exactly once, either through
/// [`RunDirectory::release`] or when dropped.
#[derive(Debug)]
pub struct RunDirectory {
    path: PathBuf,
    released: bool,
}

impl RunDirectory {
    /// Create `path` (its parents as needed) with restrictive permissions.
    ///
    /// Fails if the directory already exists.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(RUN_DIR_MODE))?;
        }

        debug!("Created run directory {:?}", path);
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory tree now and report failures.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_tree(&self.path)
    }
}

impl Drop for RunDirectory {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = remove_tree(&self.path) {
            warn!("Failed to remove run directory {:?}: {}", self.path, e);
        }
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("Removed run directory {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
