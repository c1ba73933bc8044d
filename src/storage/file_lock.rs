use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;

/// Single process guarantee for a database directory
pub struct FileLock {
    pub file: File,
    pub path: PathBuf,
}

impl FileLock {
    pub fn acquire(storage: &StorageLayout) -> Result<Self> {
        let path = storage.lock_path();

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_EX, LOCK_NB};

            let fd = file.as_raw_fd();

            unsafe {
                if flock(fd, LOCK_EX | LOCK_NB) != 0 {
                    return Err(Error::new(
                        ErrorKind::DatabaseLocked,
                        format!("database is locked, please check the lock file '{}'", path.display()),
                    ));
                }
            }
        }

        Ok(FileLock { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }

        let _ = std::fs::remove_file(&self.path);
    }
}
