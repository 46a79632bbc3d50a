//! Open/lock layer shared by both formats.
//!
//! Every operation on a store file, readers included, runs the same way:
//! open read-write, take the advisory `lockf` lock on byte 0, do the I/O,
//! release the lock, close. The lock covers the whole file by contract and
//! interoperates with any other `lockf`/`fcntl` user. Timestamps are taken
//! after the lock is held, so wall-clock write order on a single file equals
//! lock-acquisition order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ffi;

/// A store file with the byte-0 advisory lock held. Dropping it releases
/// the lock; a failed release is logged and otherwise ignored.
pub struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Open an existing file and block until the lock is ours.
    pub fn open(path: &Path) -> Result<LockedFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::lock(file)
    }

    /// Open or create a file (with `mode` when created) and block until the
    /// lock is ours.
    pub fn create(path: &Path, mode: u32) -> Result<LockedFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(mode)
            .open(path)?;
        Self::lock(file)
    }

    fn lock(mut file: File) -> Result<LockedFile> {
        file.seek(SeekFrom::Start(0))?;
        ffi::lockf(&file, libc::F_LOCK, 1)?;
        Ok(LockedFile { file })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// The version word at the start of the file.
    pub fn version(&self) -> Result<u32> {
        read_version(&self.file)
    }

    /// Read the whole image.
    pub fn read_image(&self) -> Result<Vec<u8>> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut image = Vec::new();
        file.read_to_end(&mut image)?;
        Ok(image)
    }

    /// Rewrite the whole image in place, optionally dropping any trailing
    /// bytes of a longer pre-existing file.
    pub fn write_image(&self, image: &[u8], truncate: bool) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(image)?;
        if truncate {
            ffi::ftruncate(&self.file, image.len() as u64)?;
        }
        Ok(())
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let release = (&self.file)
            .seek(SeekFrom::Start(0))
            .and_then(|_| ffi::lockf(&self.file, libc::F_ULOCK, 1));
        if let Err(e) = release {
            tracing::warn!("failed to release file lock: {e}");
        }
    }
}

pub(crate) fn read_version(file: &File) -> Result<u32> {
    let mut file = file;
    file.seek(SeekFrom::Start(0))?;
    let mut raw = [0u8; 4];
    file.read_exact(&mut raw)
        .map_err(|_| Error::Corrupt("missing version header"))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(u32::from_le_bytes(raw))
}
