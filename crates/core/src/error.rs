//! Error types for the pipeline simulator.
//!
//! Only genuine failures are errors. A buffer timeout is an expected outcome
//! and is reported through `bool`/`Option` returns, never through this type.

use thiserror::Error;

/// Top-level error type for all fallible operations in the system.
///
/// Each variant corresponds to a specific failure domain:
/// - Record: validation of a student record
/// - Frame: length-prefixed message transport
/// - Store: persisted record files
/// - Serialization: record text format
/// - I/O: sockets and file system
#[derive(Debug, Error)]
pub enum Error {
    /// Record failed validation (empty identity, bad marks)
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    /// Framed channel error (oversized or truncated message)
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Persisted record could not be resolved
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Record text could not be produced or parsed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Socket or file I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Record validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Name is empty after trimming
    #[error("student name cannot be empty")]
    EmptyName,

    /// ID is empty after trimming
    #[error("student ID cannot be empty")]
    EmptyId,

    /// Course and mark lists differ in length
    #[error("courses and marks must have the same length: {courses} courses, {marks} marks")]
    LengthMismatch { courses: usize, marks: usize },

    /// A mark lies outside [0, 100]
    #[error("mark {mark} for course {course:?} is not between 0 and 100")]
    MarkOutOfRange { course: String, mark: i32 },
}

/// Framed channel errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload (or declared length) exceeds the frame limit
    #[error("frame of {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Peer closed the stream part way through a payload
    #[error("stream closed mid-message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// Underlying transport failed
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No file exists for the requested identifier
    #[error("record file {path} does not exist")]
    NotFound { path: String },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl FrameError {
    /// True if the error means the peer went away (reset, broken pipe, EOF).
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::Truncated { .. } => true,
            FrameError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            FrameError::TooLarge { .. } => false,
        }
    }
}
