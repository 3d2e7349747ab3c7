use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    AlreadyExists,
    OutOfSpace,
    DirectoryFull,
    TableFull,
    InvalidDescriptor,
    NameTooLong,
    InvalidName,
    InvalidOffset,
    /// 超级块校验失败
    Corrupted,
}

pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotFound => "no such file",
            Self::AlreadyExists => "file already exists",
            Self::OutOfSpace => "no space left on device",
            Self::DirectoryFull => "directory is full",
            Self::TableFull => "too many open files",
            Self::InvalidDescriptor => "bad file descriptor",
            Self::NameTooLong => "file name too long",
            Self::InvalidName => "invalid file name",
            Self::InvalidOffset => "invalid seek offset",
            Self::Corrupted => "not a flat-fs image",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
