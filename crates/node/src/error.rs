//! A bunch of wrap errors.
use crate::prelude::ringkv_core;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors enum mapping global custom errors.
/// The error type can be expressed in decimal, where the high decs represent
/// the error category and the low decs represent the error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[repr(u32)]
pub enum Error {
    #[error("Create File Error: {0}")]
    CreateFileError(String) = 100,
    #[error("Open File Error: {0}")]
    OpenFileError(String) = 101,
    #[error("Cannot find home directory")]
    HomeDirError = 102,
    #[error("Cannot find parent directory")]
    ParentDirError = 103,
    #[error("Serde yaml error: {0}")]
    SerdeYamlError(#[from] serde_yaml::Error) = 104,
    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error) = 105,
    #[error("Core error: {0}")]
    CoreError(#[from] ringkv_core::error::Error) = 200,
    #[error("Node {0} not found")]
    NodeNotFound(u64) = 201,
    #[error("Node {0} already spawned")]
    NodeExists(u64) = 202,
    #[error("Client {0} got no result in time")]
    ClientTimeout(String) = 300,
    #[error("Inbox of client {0} closed")]
    ClientInboxClosed(String) = 301,
    #[error("Client {0} got unexpected reply {1}")]
    UnexpectedReply(String, String) = 302,
    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String) = 400,
}

impl Error {
    fn discriminant(&self) -> u32 {
        // SAFETY: `Self` is `repr(u32)`, so its layout is a `repr(C)` union of
        // `repr(C)` structs that all start with the `u32` discriminant.
        // ref: https://doc.rust-lang.org/std/mem/fn.discriminant.html
        unsafe { *<*const _>::from(self).cast::<u32>() }
    }

    /// Numeric code of the error.
    pub fn code(&self) -> u32 {
        self.discriminant()
    }
}
