//! File backed AVIOContext for local inputs.

use crate::core::{ContainerError, Result};
use ffmpeg_next::ffi;
use log::{debug, warn};
use std::ffi::c_void;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::raw::c_int;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const IO_BUFFER_SIZE: usize = 4096;

const AVSEEK_SIZE: c_int = 0x10000;
const AVSEEK_FORCE: c_int = 0x20000;

/// Polls while waiting for a growing file.
const PROGRESSIVE_POLL: Duration = Duration::from_millis(100);
/// Give up after this many polls without new data.
const PROGRESSIVE_MAX_POLLS: u32 = 50;

struct IoState {
    file: File,
    progressive: bool,
    abort: Arc<AtomicBool>,
}

impl IoState {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut polls = 0;
        loop {
            let n = self.file.read(buf)?;
            if n > 0 || !self.progressive {
                return Ok(n);
            }
            // file may still be written by a recorder
            if self.abort.load(Ordering::Relaxed) || polls >= PROGRESSIVE_MAX_POLLS {
                return Ok(0);
            }
            polls += 1;
            thread::sleep(PROGRESSIVE_POLL);
        }
    }

    fn seek(&mut self, offset: i64, whence: c_int) -> i64 {
        let whence = whence & !AVSEEK_FORCE;
        if whence == AVSEEK_SIZE {
            return -1;
        }
        let pos = match whence {
            libc::SEEK_SET if offset >= 0 => SeekFrom::Start(offset as u64),
            libc::SEEK_CUR => SeekFrom::Current(offset),
            libc::SEEK_END => SeekFrom::End(offset),
            _ => return -(libc::EINVAL as i64),
        };
        match self.file.seek(pos) {
            Ok(p) => p as i64,
            Err(e) => -(e.raw_os_error().unwrap_or(libc::EIO) as i64),
        }
    }
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    if opaque.is_null() || buf.is_null() || buf_size <= 0 {
        return ffi::AVERROR_EOF;
    }
    let state = &mut *(opaque as *mut IoState);
    let buf = std::slice::from_raw_parts_mut(buf, buf_size as usize);
    match state.read(buf) {
        Ok(0) => ffi::AVERROR_EOF,
        Ok(n) => n as c_int,
        Err(e) => -(e.raw_os_error().unwrap_or(libc::EIO)),
    }
}

unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    if opaque.is_null() {
        return -1;
    }
    let state = &mut *(opaque as *mut IoState);
    state.seek(offset, whence)
}

/// Owns the AVIOContext, its buffer and the file behind it.
///
/// Must outlive the format context it is attached to.
pub struct CustomIo {
    ctx: *mut ffi::AVIOContext,
    state: *mut IoState,
}

impl CustomIo {
    pub fn open(path: &Path, progressive: bool, abort: Arc<AtomicBool>) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| ContainerError::OpenError(format!("{}: {}", path.display(), e)))?;
        debug!("custom io: {} (progressive={})", path.display(), progressive);

        let state = Box::into_raw(Box::new(IoState {
            file,
            progressive,
            abort,
        }));

        unsafe {
            let buffer = ffi::av_malloc(IO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(state));
                return Err(ContainerError::NoMem);
            }
            let ctx = ffi::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                state as *mut c_void,
                Some(read_packet),
                None,
                Some(seek),
            );
            if ctx.is_null() {
                ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(state));
                return Err(ContainerError::NoMem);
            }
            Ok(Self { ctx, state })
        }
    }

    pub fn as_ptr(&self) -> *mut ffi::AVIOContext {
        self.ctx
    }
}

impl Drop for CustomIo {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                // the buffer may have been reallocated by avio
                ffi::av_freep(&mut (*self.ctx).buffer as *mut *mut u8 as *mut c_void);
                ffi::avio_context_free(&mut self.ctx);
            }
            if !self.state.is_null() {
                drop(Box::from_raw(self.state));
                self.state = std::ptr::null_mut();
            }
        }
    }
}

/// Local path for bare paths and `file://` URLs.
pub fn local_path(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(Path::new(path))
    } else if !url.contains("://") {
        Some(Path::new(url))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn state_for(data: &[u8], progressive: bool) -> (tempfile::NamedTempFile, IoState) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        let state = IoState {
            file: File::open(tmp.path()).unwrap(),
            progressive,
            abort: Arc::new(AtomicBool::new(false)),
        };
        (tmp, state)
    }

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("file:///a/b.ts"), Some(Path::new("/a/b.ts")));
        assert_eq!(local_path("/a/b.ts"), Some(Path::new("/a/b.ts")));
        assert_eq!(local_path("http://h/b.ts"), None);
    }

    #[test]
    fn test_seek_and_size_query() {
        let (_tmp, mut state) = state_for(b"0123456789", false);
        assert_eq!(state.seek(0, AVSEEK_SIZE), -1);
        assert_eq!(state.seek(4, libc::SEEK_SET), 4);
        let mut buf = [0u8; 3];
        assert_eq!(state.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");
        assert_eq!(state.seek(-2, libc::SEEK_END), 8);
        assert_eq!(state.seek(1, libc::SEEK_CUR | AVSEEK_FORCE), 9);
    }

    #[test]
    fn test_progressive_read_stops_on_abort() {
        let (_tmp, mut state) = state_for(b"ab", true);
        let mut buf = [0u8; 8];
        assert_eq!(state.read(&mut buf).unwrap(), 2);
        state.abort.store(true, Ordering::Relaxed);
        assert_eq!(state.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_progressive_read_picks_up_appended_data() {
        let (tmp, mut state) = state_for(b"ab", true);
        let mut buf = [0u8; 8];
        assert_eq!(state.read(&mut buf).unwrap(), 2);

        let path = tmp.path().to_path_buf();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
            f.write_all(b"cd").unwrap();
        });
        assert_eq!(state.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"cd");
        writer.join().unwrap();
    }
}
