//! Error types for the failover orchestrator core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of error kinds a failover attempt can surface (spec §7).
///
/// This is recorded on `StepRecord`/`FailoverRecord`, never raised across a
/// component boundary as an exception — probes and the coordinator always
/// return it as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverErrorKind {
    Unreachable,
    WrongRole,
    LagTooHigh,
    PromotionFailed,
    QuorumUnavailable,
    CacheFailoverFailed,
    RoutingUpdateFailed,
    ValidationFailed,
    DeadlineExceeded,
    AlreadyInProgress,
    AlreadyAtTarget,
    UnknownRegion,
}

/// Errors returned by the relational probe (C1).
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("relational endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected recovery role: {0}")]
    WrongRole(String),
    #[error("promotion did not confirm: {0}")]
    PromotionFailed(String),
    #[error("validation write/read-back failed: {0}")]
    ValidationFailed(String),
    #[error("probe call timed out")]
    Timeout,
}

impl ProbeError {
    pub fn kind(&self) -> FailoverErrorKind {
        match self {
            ProbeError::Unreachable(_) => FailoverErrorKind::Unreachable,
            ProbeError::WrongRole(_) => FailoverErrorKind::WrongRole,
            ProbeError::PromotionFailed(_) => FailoverErrorKind::PromotionFailed,
            ProbeError::ValidationFailed(_) => FailoverErrorKind::ValidationFailed,
            ProbeError::Timeout => FailoverErrorKind::DeadlineExceeded,
        }
    }
}

/// Errors returned by the cache sentinel client (C2).
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("sentinel quorum unavailable: {0}")]
    QuorumUnavailable(String),
    #[error("cache endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("cache failover did not complete: {0}")]
    FailoverFailed(String),
    #[error("validation write/read-back failed: {0}")]
    ValidationFailed(String),
}

impl CacheError {
    pub fn kind(&self) -> FailoverErrorKind {
        match self {
            CacheError::QuorumUnavailable(_) => FailoverErrorKind::QuorumUnavailable,
            CacheError::Unreachable(_) => FailoverErrorKind::Unreachable,
            CacheError::FailoverFailed(_) => FailoverErrorKind::CacheFailoverFailed,
            CacheError::ValidationFailed(_) => FailoverErrorKind::ValidationFailed,
        }
    }
}

/// Errors returned by the routing registry (C3).
#[derive(Debug, Clone, Copy, Error)]
pub enum RegistryError {
    #[error("routing registry is busy with a concurrent swap")]
    Busy,
}

/// Rejections the coordinator (C5) can return before running any step.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CoordinatorRejection {
    #[error("a failover attempt is already in progress")]
    AlreadyInProgress,
    #[error("target region equals the current active region")]
    AlreadyAtTarget,
    #[error("target region is not configured")]
    UnknownRegion,
}

impl CoordinatorRejection {
    pub fn kind(&self) -> FailoverErrorKind {
        match self {
            CoordinatorRejection::AlreadyInProgress => FailoverErrorKind::AlreadyInProgress,
            CoordinatorRejection::AlreadyAtTarget => FailoverErrorKind::AlreadyAtTarget,
            CoordinatorRejection::UnknownRegion => FailoverErrorKind::UnknownRegion,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
