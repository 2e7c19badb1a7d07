use crate::transport::TransportError;

/// The error returned by every host facing operation of a [`Core`](crate::Core).
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum Error {
    /// The core needs to be halted for this operation.
    NotHalted,
    /// The target is in an unsafe state: {0}
    TargetFailure(&'static str),
    /// No free {0} is available.
    ResourceNotAvailable(Resource),
    /// Operation failed: {0}
    OperationFailed(#[from] OperationError),
    /// {0} is not supported by this core variant.
    Unsupported(&'static str),
    /// Invalid argument: {0}
    SyntaxError(String),
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Error::OperationFailed(OperationError::Transport(error))
    }
}

/// The cause of an [`Error::OperationFailed`].
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum OperationError {
    /// register transport error
    Transport(#[from] TransportError),
    /// timed out waiting for {0}
    Timeout(&'static str),
    /// no register context was saved since the last halt
    NoSavedContext,
}

/// A hardware resource which can run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, docsplay::Display)]
pub enum Resource {
    /// instruction comparator
    InstructionComparator,
    /// data comparator
    DataComparator,
}
