//! Error taxonomy for the group order engine
use crate::group::OrderState;
use crate::store::{CommitError, StoreError};

/// Creation-time and input rules. These surface to callers wrapped in
/// [`EngineError::InvalidParameters`].
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("supplier id is not set")]
    MissingSupplier,
    #[error("product id is not set")]
    MissingProduct,
    #[error("target quantity must be positive")]
    NonPositiveTarget,
    #[error("min participants must be at least 1")]
    NoMinParticipants,
    #[error("max participants {max} is below min participants {min}")]
    ParticipantBoundsInverted { min: u32, max: u32 },
    #[error("at least one discount tier is required")]
    NoTiers,
    #[error("discount tier thresholds must be strictly ascending")]
    TiersNotAscending,
    #[error("discount percent {0} exceeds 100")]
    PercentOutOfRange(u8),
    #[error("expiry is not set")]
    MissingExpiry,
    #[error("expiry must be strictly in the future")]
    ExpiryNotInFuture,
    #[error("quantity must be positive")]
    ZeroQuantity,
    #[error("vendor already holds an active entry for this group order")]
    DuplicateParticipant,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("group order is closed ({0:?})")]
    GroupOrderClosed(OrderState),
    #[error("group order has expired")]
    GroupOrderExpired,
    #[error("capacity exceeded: group order allows at most {0} participants")]
    CapacityExceeded(u32),
    #[error("unauthorized: only the owning supplier may do this")]
    Unauthorized,
    #[error("transaction contention, safe to retry")]
    Contention,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

impl From<CommitError> for EngineError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Contention => EngineError::Contention,
            CommitError::Store(inner) => EngineError::Store(inner),
        }
    }
}
