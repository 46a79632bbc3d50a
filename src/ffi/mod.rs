//! Thin wrappers over the libc calls the store depends on. All `unsafe`
//! around raw file descriptors and mappings lives here.

use std::fs::File;
use std::io::{Error, Result};
use std::os::fd::AsRawFd;

pub fn lockf(file: &File, cmd: i32, len: i64) -> Result<()> {
    let result = unsafe { libc::lockf(file.as_raw_fd(), cmd, len as libc::off_t) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn mmap(len: usize, prot: i32, flags: i32, file: &File) -> Result<*mut u8> {
    let ptr = libc::mmap(std::ptr::null_mut(), len, prot, flags, file.as_raw_fd(), 0);
    if ptr != libc::MAP_FAILED {
        Ok(ptr as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn munmap(ptr: *mut u8, len: usize) -> Result<()> {
    let result = libc::munmap(ptr as _, len);
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// `posix_fallocate` reports failure through its return value, not errno.
pub fn fallocate(file: &File, offset: u64, len: u64) -> Result<()> {
    let result = unsafe {
        libc::posix_fallocate(file.as_raw_fd(), offset as libc::off_t, len as libc::off_t)
    };
    if result == 0 {
        Ok(())
    } else {
        Err(Error::from_raw_os_error(result))
    }
}

pub fn ftruncate(file: &File, len: u64) -> Result<()> {
    let result = unsafe { libc::ftruncate(file.as_raw_fd(), len as libc::off_t) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// Install `handler` for `signum` without `SA_RESTART`, so a blocked stdin
/// read returns `EINTR` and the pipe loop can observe the interrupt flag.
pub fn sigaction(signum: i32, handler: extern "C" fn(i32)) -> Result<()> {
    let mut act: libc::sigaction = unsafe { std::mem::zeroed() };
    act.sa_sigaction = handler as usize;
    let result = unsafe { libc::sigaction(signum, &act, std::ptr::null_mut()) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}
