//! The crate's two error axes: [`ValidationError`] for construction-time
//! faults and [`ErrorKind`] for operational faults that flow through the
//! reliability stack as typed results. Every variant maps 1:1 to a
//! stable integer code so callers can match on the wire-stable identity
//! rather than the Rust type.

use thiserror::Error;

/// Errors raised at construction boundaries (endpoint lists, filters).
/// These never reach the network layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("duplicate endpoint: {0}")]
    DuplicateEndpoint(String),
    #[error("primary endpoint list must not be empty")]
    EmptyPrimary,
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl ValidationError {
    pub fn code(&self) -> i32 {
        match self {
            ValidationError::InvalidEndpoint(_) => 100,
            ValidationError::DuplicateEndpoint(_) => 101,
            ValidationError::EmptyPrimary => 102,
            ValidationError::InvalidValue(_) => 103,
        }
    }
}

/// Operational errors, carried upward as typed results at every layer of
/// the reliability stack. Never a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A peer is presumed to be throttling us. `explicit` distinguishes
    /// a recognized HTTP 429/503 from an inferred connect/timeout
    /// failure; both get the same local recovery.
    #[error("endpoint overloaded (explicit={explicit})")]
    Overloading { explicit: bool },

    #[error("server error: {0}")]
    BadServer(String),

    #[error("malformed response: {0}")]
    BadResponse(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("block missing or not mined yet")]
    NoBlock,

    #[error("transaction missing or not mined yet")]
    NoTransaction,

    #[error("endpoint request quota exhausted")]
    RequestQuota,

    #[error("requested block is not yet confirmed safe")]
    UnsafeBlock,

    #[error("gateway exhausted all backends, last error: {source}")]
    GatewayBadBackend { source: Box<ErrorKind> },

    #[error("gateway has no configured backends")]
    GatewayNoBackend,
}

impl ErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::Overloading { explicit: false } => 200,
            ErrorKind::Overloading { explicit: true } => 201,
            ErrorKind::BadRequest(_) => 202,
            ErrorKind::BadResponse(_) => 203,
            ErrorKind::BadServer(_) => 204,
            ErrorKind::NoBlock => 205,
            ErrorKind::NoTransaction => 206,
            ErrorKind::RequestQuota => 300,
            ErrorKind::UnsafeBlock => 301,
            ErrorKind::GatewayBadBackend { .. } => 400,
            ErrorKind::GatewayNoBackend => 401,
        }
    }

    /// Whether this error, reported to a `RequestValve`, locks the
    /// endpoint out for a while.
    pub fn lock_duration_ms(&self) -> Option<u64> {
        match self {
            ErrorKind::Overloading { .. } => Some(15_000),
            ErrorKind::BadServer(_) => Some(30_000),
            ErrorKind::BadResponse(_) => Some(30_000),
            _ => None,
        }
    }
}
