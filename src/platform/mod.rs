//! Platform bring-up: OSD surface and remote control input.

pub mod framebuffer;
#[cfg(target_os = "linux")]
pub mod input;
pub mod keymap;

use crate::config::PlatformOptions;
use log::{info, warn};
use thiserror::Error;

pub use framebuffer::Framebuffer;
#[cfg(target_os = "linux")]
pub use input::InputForwarder;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("system error: {0}")]
    Sys(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

pub struct Platform {
    framebuffer: Option<Framebuffer>,
    #[cfg(target_os = "linux")]
    input: Option<InputForwarder>,
}

impl Platform {
    pub fn init(opts: &PlatformOptions) -> Result<Self> {
        info!("🚀 platform init");
        let framebuffer = Framebuffer::from_env();
        #[cfg(target_os = "linux")]
        let input = match InputForwarder::start(&opts.input_dir, &opts.input_fifo) {
            Ok(input) => Some(input),
            Err(e) => {
                warn!(
                    "⚠️ input forwarding disabled, {}: {}",
                    opts.input_fifo.display(),
                    e
                );
                None
            }
        };
        #[cfg(not(target_os = "linux"))]
        let _ = opts;
        Ok(Self {
            framebuffer: Some(framebuffer),
            #[cfg(target_os = "linux")]
            input,
        })
    }

    #[cfg(target_os = "linux")]
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn framebuffer(&mut self) -> Option<&mut Framebuffer> {
        self.framebuffer.as_mut()
    }

    pub fn shutdown(&mut self) {
        #[cfg(target_os = "linux")]
        if let Some(mut input) = self.input.take() {
            input.stop();
            info!("platform input stopped");
        }
        self.framebuffer = None;
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn test_init_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PlatformOptions {
            enable: true,
            input_dir: dir.path().to_path_buf(),
            input_fifo: dir.path().join("neutrino.input"),
        };
        let mut platform = Platform::init(&opts).unwrap();
        assert!(std::fs::metadata(&opts.input_fifo)
            .unwrap()
            .file_type()
            .is_fifo());
        assert!(platform.framebuffer().is_some());
        assert!(platform.has_input());

        platform.shutdown();
        assert!(!platform.has_input());
        assert!(platform.framebuffer().is_none());
        // second shutdown from Drop is a no-op
    }

    #[test]
    fn test_init_without_fifo_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PlatformOptions {
            enable: true,
            input_dir: dir.path().to_path_buf(),
            input_fifo: dir.path().join("missing").join("neutrino.input"),
        };
        let mut platform = Platform::init(&opts).unwrap();
        assert!(!platform.has_input());
        assert!(platform.framebuffer().is_some());
    }
}
