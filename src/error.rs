use std::fmt::Display;
use std::path::PathBuf;

/// siltdb errors.
#[derive(Debug)]
pub enum Error {
    /// The directory is already owned by another live writer.
    Locked(PathBuf),
    /// An IO failure the store cannot recover from locally.
    Io(String),
    /// On-disk data that cannot be decoded: a frame or record whose length
    /// prefix runs past the end of its file.
    Corrupt(String),
    /// Invalid caller input, such as an empty key.
    InvalidInput(String),
    /// The store has been closed; no further operations are accepted.
    Closed,
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Locked(dir) => {
                write!(f, "directory {} is locked by another writer", dir.display())
            }
            Error::Io(msg) => write!(f, "io error: {msg}"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Closed => write!(f, "store is closed"),
        }
    }
}

/// A siltdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Io(err.to_string())
    }
}
