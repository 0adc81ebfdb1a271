//! Error types for the document-mapping layer.

use thiserror::Error;

/// Result type for mapping-layer operations.
pub type OrmResult<T> = Result<T, OrmError>;

/// Errors that can occur while mapping documents or executing operations.
#[derive(Error, Debug)]
pub enum OrmError {
    /// Opaque passthrough from the MongoDB driver.
    #[error("store error: {0}")]
    Store(#[from] mongodb::error::Error),

    /// Malformed external identifier string.
    #[error("invalid object id: {0}")]
    InvalidId(String),

    /// Missing or invalid identifier on save/update/delete, or misuse
    /// rejected under strict mode.
    #[error("validation error: {0}")]
    Validation(String),

    /// Store-generated identifier of unexpected shape.
    #[error("cast error: {0}")]
    Cast(String),

    /// Zero-match fetch.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Shape mismatch between a stored document and the target structure.
    #[error("decode error: {0}")]
    Decode(String),

    /// Structure-to-BSON serialization failure.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation deadline exceeded.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl OrmError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a cast error.
    pub fn cast(message: impl Into<String>) -> Self {
        Self::Cast(message.into())
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a timeout error from the exceeded deadline. Deadlines beyond
    /// `u64::MAX` milliseconds clamp instead of truncating.
    pub fn timed_out(deadline: std::time::Duration) -> Self {
        Self::Timeout(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX))
    }

    /// Convert a driver error, pulling out BSON codec failures so shape
    /// mismatches surface as decode/serialize errors rather than opaque
    /// store errors.
    pub(crate) fn from_store(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match &*err.kind {
            ErrorKind::BsonDeserialization(de) => Self::Decode(de.to_string()),
            ErrorKind::BsonSerialization(se) => Self::Serialize(se.to_string()),
            _ => Self::Store(err),
        }
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is an invalid identifier error.
    pub fn is_invalid_id(&self) -> bool {
        matches!(self, Self::InvalidId(_))
    }

    /// Check if this is a cast error.
    pub fn is_cast(&self) -> bool {
        matches!(self, Self::Cast(_))
    }
}

impl From<bson::oid::Error> for OrmError {
    fn from(err: bson::oid::Error) -> Self {
        OrmError::InvalidId(err.to_string())
    }
}

impl From<bson::ser::Error> for OrmError {
    fn from(err: bson::ser::Error) -> Self {
        OrmError::Serialize(err.to_string())
    }
}

impl From<bson::de::Error> for OrmError {
    fn from(err: bson::de::Error) -> Self {
        OrmError::Decode(err.to_string())
    }
}
