//! Keyboard forwarding from evdev devices into the frontend's input FIFO.

use crate::platform::keymap;
use crate::platform::Result;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::stat::Mode;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::mem;
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const EV_KEY: u16 = 0x01;
const EV_MAX: usize = 0x1f;
const POLL_TIMEOUT_MS: u16 = 100;

pub const EVENT_SIZE: usize = mem::size_of::<libc::input_event>();

// EVIOCGBIT(0, len): supported event types
nix::ioctl_read_buf!(eviocgbit_types, b'E', 0x20, u8);

/// Unlinks whatever is at `path` and creates a fresh FIFO readable and
/// writable by the owner only.
pub fn create_fifo(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR)?;
    Ok(())
}

fn open_nonblocking(path: &Path) -> std::io::Result<File> {
    // std adds O_CLOEXEC
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

/// Keyboard events only, with the key code remapped for the remote control
/// layout.
pub fn translate(ev: &libc::input_event) -> Option<libc::input_event> {
    if ev.type_ != EV_KEY {
        return None;
    }
    let mut out = *ev;
    out.code = keymap::remap(ev.code);
    Some(out)
}

pub fn event_from_bytes(buf: &[u8; EVENT_SIZE]) -> libc::input_event {
    unsafe { std::ptr::read_unaligned(buf.as_ptr().cast()) }
}

pub fn event_to_bytes(ev: &libc::input_event) -> [u8; EVENT_SIZE] {
    let mut buf = [0u8; EVENT_SIZE];
    unsafe {
        std::ptr::copy_nonoverlapping(
            (ev as *const libc::input_event).cast::<u8>(),
            buf.as_mut_ptr(),
            EVENT_SIZE,
        );
    }
    buf
}

struct InputDevice {
    path: PathBuf,
    file: File,
}

fn has_key_events(file: &File) -> bool {
    let mut bits = [0u8; EV_MAX / 8 + 1];
    match unsafe { eviocgbit_types(file.as_raw_fd(), &mut bits) } {
        Ok(_) => bits[(EV_KEY / 8) as usize] & (1 << (EV_KEY % 8)) != 0,
        Err(_) => false,
    }
}

/// `event*` nodes in `dir` that report key events.
fn scan_devices(dir: &Path) -> Vec<InputDevice> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("⚠️ cannot scan {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("event"))
        .map(|e| e.path())
        .collect();
    paths.sort();

    let mut devices = Vec::new();
    for path in paths {
        let file = match open_nonblocking(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!("skip {}: {}", path.display(), e);
                continue;
            }
        };
        if has_key_events(&file) {
            info!("⌨️ input device {}", path.display());
            devices.push(InputDevice { path, file });
        } else {
            debug!("{} has no key events", path.display());
        }
    }
    devices
}

/// Background thread copying key presses into the input FIFO.
pub struct InputForwarder {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    fifo: PathBuf,
}

impl InputForwarder {
    pub fn start(input_dir: &Path, fifo: &Path) -> Result<Self> {
        create_fifo(fifo)?;
        let out = open_nonblocking(fifo)?;
        let devices = scan_devices(input_dir);
        if devices.is_empty() {
            warn!("⚠️ no keyboard found in {}", input_dir.display());
        }
        Self::spawn(devices, out, fifo)
    }

    fn spawn(devices: Vec<InputDevice>, out: File, fifo: &Path) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("hal:input".to_string())
            .spawn(move || forward_loop(devices, out, flag))?;
        Ok(Self {
            running,
            handle: Some(handle),
            fifo: fifo.to_path_buf(),
        })
    }

    pub fn fifo(&self) -> &Path {
        &self.fifo
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("⚠️ input thread panicked");
            }
        }
    }
}

impl Drop for InputForwarder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reads every pending event of one device. Returns false once the device
/// is gone.
fn drain_device(dev: &mut InputDevice, out: &mut File) -> bool {
    let mut buf = [0u8; EVENT_SIZE];
    loop {
        match dev.file.read(&mut buf) {
            Ok(n) if n == EVENT_SIZE => {
                if let Some(ev) = translate(&event_from_bytes(&buf)) {
                    debug!("key code {} value {}", ev.code, ev.value);
                    if let Err(e) = out.write_all(&event_to_bytes(&ev)) {
                        warn!("⚠️ input fifo write: {}", e);
                    }
                }
            }
            // short read
            Ok(_) => return true,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.raw_os_error() == Some(Errno::ENODEV as i32) => {
                info!("⌨️ input device {} removed", dev.path.display());
                return false;
            }
            Err(e) => {
                debug!("{}: {}", dev.path.display(), e);
                return true;
            }
        }
    }
}

fn forward_loop(mut devices: Vec<InputDevice>, mut out: File, running: Arc<AtomicBool>) {
    debug!("input thread started, {} devices", devices.len());
    while running.load(Ordering::Relaxed) {
        let ready: Vec<bool> = {
            let mut fds: Vec<PollFd> = devices
                .iter()
                .map(|d| PollFd::new(d.file.as_fd(), PollFlags::POLLIN))
                .collect();
            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) => continue,
                Ok(_) => fds
                    .iter()
                    .map(|fd| fd.revents().is_some_and(|r| !r.is_empty()))
                    .collect(),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("⚠️ input poll: {}", e);
                    thread::sleep(std::time::Duration::from_millis(POLL_TIMEOUT_MS as u64));
                    continue;
                }
            }
        };

        let mut idx = 0;
        devices.retain_mut(|dev| {
            let keep = !ready[idx] || drain_device(dev, &mut out);
            idx += 1;
            keep
        });
    }
    debug!("input thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;
    use std::time::{Duration, Instant};

    fn key_event(type_: u16, code: u16, value: i32) -> libc::input_event {
        libc::input_event {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_,
            code,
            value,
        }
    }

    fn read_event(reader: &mut File, timeout: Duration) -> Option<libc::input_event> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; EVENT_SIZE];
        let mut filled = 0;
        while Instant::now() < deadline {
            match reader.read(&mut buf[filled..]) {
                Ok(n) => {
                    filled += n;
                    if filled == EVENT_SIZE {
                        return Some(event_from_bytes(&buf));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => panic!("read: {}", e),
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_create_fifo_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input");
        fs::write(&path, b"stale").unwrap();

        create_fifo(&path).unwrap();
        let meta = fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
        use std::os::unix::fs::PermissionsExt;
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        // again on top of the fifo
        create_fifo(&path).unwrap();
        assert!(fs::metadata(&path).unwrap().file_type().is_fifo());
    }

    #[test]
    fn test_translate_keeps_key_events_only() {
        let ev = translate(&key_event(EV_KEY, keymap::KEY_ENTER, 1)).unwrap();
        assert_eq!(ev.code, keymap::KEY_OK);
        assert_eq!(ev.value, 1);
        // EV_REL, EV_SYN
        assert!(translate(&key_event(0x02, 0, 5)).is_none());
        assert!(translate(&key_event(0x00, 0, 0)).is_none());
    }

    #[test]
    fn test_event_bytes() {
        let ev = key_event(EV_KEY, keymap::KEY_F1, 2);
        let back = event_from_bytes(&event_to_bytes(&ev));
        assert_eq!((back.type_, back.code, back.value), (EV_KEY, keymap::KEY_F1, 2));
    }

    #[test]
    fn test_start_without_keyboards() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("input");
        fs::create_dir(&input_dir).unwrap();
        // not an evdev node, EVIOCGBIT fails
        fs::write(input_dir.join("event0"), b"").unwrap();
        fs::write(input_dir.join("mouse0"), b"").unwrap();
        let fifo = dir.path().join("neutrino.input");

        let mut fwd = InputForwarder::start(&input_dir, &fifo).unwrap();
        assert!(fs::metadata(&fifo).unwrap().file_type().is_fifo());
        assert!(fwd.is_running());
        fwd.stop();
        assert!(!fwd.is_running());
    }

    #[test]
    fn test_forwards_remapped_keys() {
        let dir = tempfile::tempdir().unwrap();
        let dev_path = dir.path().join("event0");
        let fifo = dir.path().join("neutrino.input");
        create_fifo(&dev_path).unwrap();
        create_fifo(&fifo).unwrap();

        let device = InputDevice {
            path: dev_path.clone(),
            file: open_nonblocking(&dev_path).unwrap(),
        };
        let out = open_nonblocking(&fifo).unwrap();
        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&fifo)
            .unwrap();
        let mut writer = OpenOptions::new().write(true).open(&dev_path).unwrap();

        let _fwd = InputForwarder::spawn(vec![device], out, &fifo).unwrap();

        writer
            .write_all(&event_to_bytes(&key_event(0x02, 1, 1)))
            .unwrap();
        writer
            .write_all(&event_to_bytes(&key_event(EV_KEY, keymap::KEY_F2, 1)))
            .unwrap();

        let ev = read_event(&mut reader, Duration::from_secs(2)).unwrap();
        assert_eq!(ev.type_, EV_KEY);
        assert_eq!(ev.code, keymap::KEY_GREEN);
        assert!(read_event(&mut reader, Duration::from_millis(300)).is_none());
    }
}
