use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a store operation can fail with.
///
/// The command layer prints these as a single `ERROR: …` line on standard
/// output; none of them terminates the process or the pipe loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The file image does not decode as the format its version advertises.
    #[error("corrupt file: {0}")]
    Corrupt(&'static str),

    /// The version word at the start of the file is not one we know.
    #[error("Unknown file format")]
    UnknownVersion,

    #[error("xform index out of bounds")]
    XformIndexOutOfBounds,

    /// Arguments that can never name a valid operation.
    #[error("{0}")]
    Input(String),
}

impl Error {
    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }
}
