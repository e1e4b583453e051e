use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

/// Server codes MongoDB uses for unique-constraint violations.
const DUPLICATE_KEY_CODES: [i32; 3] = [11000, 11001, 12582];

/// Server code returned for operations on a collection that does not exist.
pub(crate) const NAMESPACE_NOT_FOUND_CODE: i32 = 26;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("MongoDB error: {0}")]
    MongoError(#[from] mongodb::error::Error),

    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: &'static str },

    #[error("Failed to serialize document: {0}")]
    FailedToSerializeDocument(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl DatabaseError {
    /// True when the error stems from duplicate values on a unique index.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            DatabaseError::DuplicateKey(_) => true,
            DatabaseError::MongoError(err) => is_duplicate_key(err),
            _ => false,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, DatabaseError::DeadlineExceeded { .. })
    }
}

impl From<mongodb::bson::ser::Error> for DatabaseError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        DatabaseError::FailedToSerializeDocument(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for DatabaseError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        DatabaseError::FailedToSerializeDocument(err.to_string())
    }
}

/// Duplicate-key detection for raw driver errors. Index builds report it as
/// a command error, inserts as a write error.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    server_code(err).is_some_and(|code| DUPLICATE_KEY_CODES.contains(&code))
}

pub(crate) fn server_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command_error) => Some(command_error.code),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        _ => None,
    }
}
