use crate::handle::{Handle, ResourceType};

/// Stable numeric error codes. The discriminants never change between
/// releases; message text may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    OutOfMemory = 1,
    ObjectCreationFailed = 2,
    InvalidOperation = 3,
    InvalidBinding = 4,
    OutOfBounds = 5,
    Unsupported = 6,
    InvalidHandle = 7,
    FenceTimeout = 8,
    Native = 9,
    Config = 10,
    Io = 11,
}

#[derive(Debug, thiserror::Error)]
pub enum NgfError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("failed to create {kind}: {reason}")]
    ObjectCreationFailed { kind: ResourceType, reason: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(Handle),

    #[error("fence wait timed out for frame {frame}")]
    FenceTimeout { frame: u64 },

    #[error("native error: code={code}, message={message}")]
    Native { code: i32, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NgfError {
    pub fn creation(kind: ResourceType, reason: impl Into<String>) -> Self {
        NgfError::ObjectCreationFailed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn invalid_op(msg: impl Into<String>) -> Self {
        NgfError::InvalidOperation(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            NgfError::OutOfMemory => ErrorCode::OutOfMemory,
            NgfError::ObjectCreationFailed { .. } => ErrorCode::ObjectCreationFailed,
            NgfError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            NgfError::InvalidBinding(_) => ErrorCode::InvalidBinding,
            NgfError::OutOfBounds(_) => ErrorCode::OutOfBounds,
            NgfError::Unsupported(_) => ErrorCode::Unsupported,
            NgfError::InvalidHandle(_) => ErrorCode::InvalidHandle,
            NgfError::FenceTimeout { .. } => ErrorCode::FenceTimeout,
            NgfError::Native { .. } => ErrorCode::Native,
            NgfError::Config(_) => ErrorCode::Config,
            NgfError::Io(_) => ErrorCode::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, NgfError>;

/// A failed submission. The first `consumed` buffers of the batch were
/// executed or queued before the failure and must not be submitted again.
#[derive(Debug, thiserror::Error)]
#[error("submission failed after {consumed} command buffers: {error}")]
pub struct SubmitError {
    pub consumed: usize,
    #[source]
    pub error: NgfError,
}

impl From<NgfError> for SubmitError {
    fn from(error: NgfError) -> Self {
        SubmitError { consumed: 0, error }
    }
}

impl From<SubmitError> for NgfError {
    fn from(e: SubmitError) -> Self {
        e.error
    }
}
