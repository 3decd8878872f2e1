//! Error types for the docdump core library.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the docdump library.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, raised before a run touches the filesystem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Document encode/decode error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Archive packaging or extraction error
    #[error("Archive error: {0}")]
    Archive(String),

    /// Index metadata error
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Collection not found
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection already exists
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    /// Name cannot be used as a path component
    #[error("Invalid name: {0}")]
    InvalidName(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DatabaseError {
    /// Connection failed
    #[error("Failed to connect to {uri}: {message}")]
    ConnectionFailed { uri: String, message: String },

    /// Command rejected by the server
    #[error("Command {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Cursor failed while being drained
    #[error("Cursor error on {collection}: {message}")]
    Cursor { collection: String, message: String },

    /// Insert rejected a document with an `_id` already present
    #[error("Duplicate key {id} in {collection}")]
    DuplicateKey { collection: String, id: String },

    /// Driver backend error
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Codec-specific errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Document could not be serialized
    #[error("Failed to encode document: {0}")]
    Encode(String),

    /// Bytes could not be parsed as a document
    #[error("Failed to decode document: {0}")]
    Decode(String),

    /// Entry in a collection directory is not a regular file
    #[error("Not a regular document file: {0}")]
    NotAFile(String),

    /// Document has no usable `_id` for a file name
    #[error("Unusable document id: {0}")]
    DocumentId(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Codec(CodecError::Encode(err.to_string()))
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::Database(DatabaseError::Backend(err.to_string()))
    }
}
