use derive_more::{Display, Error};

/// Shared result enumeration for every bus, device and registry operation.
///
/// `Ok` is not a variant; success is the `Ok` side of [`Result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Error)]
pub enum Error {
    #[display("unknown error")]
    Unknown,
    /// The bus object is missing, released, or lacks the requested operation.
    #[display("invalid object")]
    InvalidObject,
    /// The device handle does not belong to an open device on this bus.
    #[display("invalid handle")]
    InvalidHandle,
    /// No registered backend matches the requested name, or the name is taken.
    #[display("invalid name")]
    InvalidName,
    #[display("invalid argument")]
    InvalidArgument,
    #[display("invalid parameter")]
    InvalidParam,
    /// The transport library refused the request.
    #[display("backend failure")]
    BackendFailure,
    /// The peer did not acknowledge, or the link dropped mid-transfer.
    #[display("communication error")]
    CommunicationError,
    #[display("busy")]
    Busy,
    #[display("not enough memory")]
    NoMemory,
    #[display("no such device")]
    NoDevice,
    #[display("I/O error")]
    IoError,
    /// The connection string is missing or malformed.
    #[display("invalid URI")]
    InvalidUri,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    const ALL: [Error; 13] = [
        Error::Unknown,
        Error::InvalidObject,
        Error::InvalidHandle,
        Error::InvalidName,
        Error::InvalidArgument,
        Error::InvalidParam,
        Error::BackendFailure,
        Error::CommunicationError,
        Error::Busy,
        Error::NoMemory,
        Error::NoDevice,
        Error::IoError,
        Error::InvalidUri,
    ];

    /// Stable negative status code; `0` is reserved for success.
    pub const fn code(self) -> i32 {
        match self {
            Error::Unknown => -1,
            Error::InvalidObject => -2,
            Error::InvalidHandle => -3,
            Error::InvalidName => -4,
            Error::InvalidArgument => -5,
            Error::InvalidParam => -6,
            Error::BackendFailure => -7,
            Error::CommunicationError => -8,
            Error::Busy => -9,
            Error::NoMemory => -10,
            Error::NoDevice => -11,
            Error::IoError => -12,
            Error::InvalidUri => -13,
        }
    }

    /// Map a status code back to an error. `0` and unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.code() == code)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NoDevice,
            _ => Error::IoError,
        }
    }
}
