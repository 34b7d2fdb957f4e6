//! Error types for the gRPC-GraphQL bridge.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bridge
///
/// Schema-build failures (`UnknownKind`, `SchemaNameConflict`, `Descriptor`)
/// are fatal and raised before any request is served. Call failures are
/// passed through to the execution engine, which owns their presentation.
#[derive(Error, Debug)]
pub enum Error {
    /// A field kind outside the supported set (scalar, enum reference,
    /// message reference, timestamp, or a list of one of those)
    #[error("unknown field kind: {0}")]
    UnknownKind(String),

    /// Two distinct definitions mapped to the same GraphQL type name
    #[error("schema name conflict: {0}")]
    SchemaNameConflict(String),

    /// A protobuf descriptor set could not be decoded or is incomplete
    #[error("descriptor error: {0}")]
    Descriptor(String),

    /// The remote call could not be established (unreachable backend,
    /// missing stub, unknown method)
    #[error("connection error: {0}")]
    Connection(String),

    /// gRPC call errors, passed through unwrapped
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    /// Any other error
    #[error("error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error is a schema-build error.
    ///
    /// Assembly must fail before the server starts serving rather than
    /// serve a partially built schema.
    pub fn is_schema_build_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownKind(_) | Error::SchemaNameConflict(_) | Error::Descriptor(_)
        )
    }
}
