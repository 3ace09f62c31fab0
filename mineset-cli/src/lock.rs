use anyhow::{anyhow, Context, Result};
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

#[cfg(unix)]
use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

/// Exclusive advisory lock on a registry file, held by every command that writes
/// the registry for as long as it runs
pub struct RegistryLock {
    path: PathBuf,
    #[cfg(unix)]
    _lock: Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl RegistryLock {
    /// Take the lock without waiting
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let path = lock_path(store_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        #[cfg(unix)]
        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_file, Errno::EWOULDBLOCK)) => {
                return Err(anyhow!(
                    "The registry {} is in use by another mineset process (is `mineset run` active?). Stop it and retry.",
                    store_path.display()
                ));
            }
            Err((_file, e)) => return Err(anyhow!("Lock failed on {}: {}", path.display(), e)),
        };

        Ok(Self {
            path,
            #[cfg(unix)]
            _lock: lock,
            #[cfg(not(unix))]
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sibling lock file of the registry, e.g. `.miners.json.lock`
pub fn lock_path(store_path: &Path) -> PathBuf {
    let name = store_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "miners.json".to_string());
    store_path.with_file_name(format!(".{}.lock", name))
}
