use crate::models::EntityKind;
use resilience::Transient;
use thiserror::Error;
use uuid::Uuid;

/// SQLSTATE codes reported when the store itself cannot be reached:
/// `08001` (client unable to establish a connection) and `08006`
/// (connection failure mid-session).
pub const TRANSIENT_FAULT_CODES: [&str; 2] = ["08001", "08006"];

/// Lower-cased message fragments that identify connectivity faults
const TRANSIENT_SIGNATURES: [&str; 9] = [
    "connection reset",
    "connection refused",
    "connection closed",
    "timed out",
    "timeout",
    "server unreachable",
    "can't reach database server",
    "broken pipe",
    "pool timed out",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable{}: {message}", fmt_code(.code))]
    Unavailable {
        code: Option<String>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

fn fmt_code(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        is_transient(self)
    }
}

/// Decides whether a store failure is worth retrying.
///
/// Connectivity faults are recognised either by a known SQLSTATE fault code
/// or by their message; validation, constraint and not-found failures never are.
pub fn is_transient(err: &StoreError) -> bool {
    match err {
        StoreError::Database(e) => match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
            sqlx::Error::Io(io) => {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::NotConnected
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::TimedOut
                ) || is_transient_message(&io.to_string())
            }
            sqlx::Error::Database(db_err) => {
                db_err.code().is_some_and(|code| is_transient_code(&code))
                    || is_transient_message(db_err.message())
            }
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Decode(_) => false,
            other => is_transient_message(&other.to_string()),
        },
        StoreError::Unavailable { code, message } => {
            code.as_deref().is_some_and(is_transient_code) || is_transient_message(message)
        }
        StoreError::NotFound(_) | StoreError::InvalidData(_) => false,
    }
}

pub fn is_transient_code(code: &str) -> bool {
    TRANSIENT_FAULT_CODES.contains(&code)
}

pub fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

/// Malformed rating data for one entity; the entity is skipped for the run
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("pillar {pillar_id} has weight {weight} outside [0, 10]")]
    InvalidWeight { pillar_id: Uuid, weight: f64 },

    #[error("pillar {pillar_id} has score {score} outside [0, 10]")]
    InvalidScore { pillar_id: Uuid, score: f64 },
}

/// A whole kind could not be processed
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to list {kind} entities: {source}")]
    ListEntities {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },

    #[error("Failed to list {kind} ratings: {source}")]
    ListRatings {
        kind: EntityKind,
        #[source]
        source: StoreError,
    },
}
