use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::error::{Error, Result};

/// Exclusive writer ownership of a store directory, held as an advisory
/// lock on the `write.lock` file.
///
/// The OS drops the advisory lock when the holding process exits, so a
/// lock file left behind by a crash does not keep the directory locked;
/// only a live second writer is refused.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
    path: PathBuf,
}

impl WriteLock {
    /// Creates (or reuses) the lock file and takes the exclusive lock.
    /// The file records the holder's process ID for debugging.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new().create(true).write(true).open(&path)?;

        if let Err(e) = Self::try_lock(&file) {
            if e.kind() == io::ErrorKind::WouldBlock {
                return Err(Error::Locked(path));
            }
            return Err(e.into());
        }

        // Only the lock holder may rewrite the file contents.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { file, path })
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> io::Result<()> {
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock(_file: &File) -> io::Result<()> {
        // No advisory locking here; the lock file alone gives best-effort
        // exclusion.
        Ok(())
    }

    /// Removes the lock file and releases the lock (clean close).
    pub fn release_and_remove(self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        drop(self.file);
        Ok(())
    }
}
