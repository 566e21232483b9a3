use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("container init failed: {0}")]
    Init(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("container already running")]
    Running,

    #[error("out of memory")]
    NoMem,

    #[error("无法打开: {0}")]
    OpenError(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("missing argument: {0}")]
    Null(&'static str),

    #[error("{0}")]
    Other(String),

    #[error("end of file reached")]
    EndOfFile,

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl ContainerError {
    /// Numeric status code as reported on the control protocol.
    pub fn code(&self) -> i32 {
        match self {
            ContainerError::Init(_) => -1,
            ContainerError::NotSupported(_) => -2,
            ContainerError::InvalidFile(_) => -3,
            ContainerError::Running => -4,
            ContainerError::NoMem => -5,
            ContainerError::OpenError(_) => -6,
            ContainerError::Stream(_) => -7,
            ContainerError::Null(_) => -8,
            ContainerError::EndOfFile => -10,
            ContainerError::FFmpegError(_)
            | ContainerError::IoError(_)
            | ContainerError::Other(_)
            | ContainerError::AnyhowError(_) => -9,
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
