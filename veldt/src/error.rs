//! Error kinds surfaced by the engine's public operations.

use crate::store::StoreError;


/// Every failure a caller of the engine, store or harvest operations can
/// observe. Storage and serialization causes are folded into [`Error::Internal`]
/// so collaborators only have to map a closed set of kinds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input: coordinates, amounts or template sets.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The referenced world, chunk, node or character does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A row already exists at a unique key.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// The node is inactive, awaiting respawn.
    #[error("node is inactive, awaiting respawn")]
    Unavailable,
    /// The harvest amount exceeds the node's current yield. The caller may
    /// retry with a smaller amount; no partial harvest happened.
    #[error("insufficient yield: requested {requested}, available {available}")]
    Insufficient { requested: u32, available: u32 },
    /// The transaction retry budget was exhausted.
    #[error("transaction conflict, retry budget exhausted")]
    Conflict,
    /// Storage or serialization failure.
    #[error("storage: {0}")]
    Internal(#[from] StoreError),
    /// The caller canceled the operation.
    #[error("operation canceled")]
    Canceled,
    /// The caller-supplied deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}
