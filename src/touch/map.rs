use std::fs::File;
use std::io::{Error, Result};
use std::ptr::NonNull;
use std::slice;

use crate::ffi;

/// Shared read-write mapping of a whole touch file. The mapping lives for
/// one operation under the file lock; growth drops it, extends the file and
/// maps again.
pub(super) struct Map {
    ptr: NonNull<u8>,
    len: usize,
}

impl Map {
    pub fn new(file: &File, len: usize) -> Result<Map> {
        let prot = libc::PROT_READ | libc::PROT_WRITE;
        let ptr = unsafe { ffi::mmap(len, prot, libc::MAP_SHARED, file) }?;
        let ptr = NonNull::new(ptr).ok_or_else(|| Error::other("mmap returned a null mapping"))?;
        Ok(Map { ptr, len })
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Map {
    fn drop(&mut self) {
        if let Err(e) = unsafe { ffi::munmap(self.ptr.as_ptr(), self.len) } {
            tracing::warn!("failed to unmap touch file: {e}");
        }
    }
}
