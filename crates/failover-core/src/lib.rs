//! Multi-region failover orchestrator core.
//!
//! Coordinates a controlled switch of authoritative read/write traffic from
//! one region's data plane to another's: a relational primary with a
//! streaming-replicated hot standby, a cache master governed by a sentinel
//! quorum, and a thin routing layer consulted by application services.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    FAILOVER COORDINATOR (C5)                    │
//! │                                                                  │
//! │   health_check → promote_relational → failover_cache →          │
//! │                 update_routing → validate                       │
//! │                                                                  │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌───────────┐ │
//! │  │ relational │  │   cache    │  │  routing   │  │  history  │ │
//! │  │ probe (C1) │  │ sentinel   │  │ registry   │  │ & metrics │ │
//! │  │            │  │ client(C2) │  │   (C3)     │  │   (C6)    │ │
//! │  └────────────┘  └────────────┘  └────────────┘  └───────────┘ │
//! │                         step executor (C4)                      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The control API (C7) lives in the sibling `failover-api` crate; this
//! crate is the library it wraps.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod history;
pub mod probes;
pub mod region;
pub mod routing;

pub use config::FailoverConfig;
pub use coordinator::FailoverCoordinator;
pub use error::{CacheError, CoordinatorRejection, FailoverErrorKind, ProbeError, RegistryError};
pub use executor::{Step, StepExecutor, StepName, StepOkDetail, StepOutcome, StepRecord};
pub use history::{FailoverRecord, HistoryStore, MetricsSnapshot};
pub use probes::cache::{CacheSentinelClient, SentinelClient};
pub use probes::relational::{RecoveryState, RelationalProbe, TcpRelationalProbe};
pub use region::{Region, RegionMap};
pub use routing::{RoutingRecord, RoutingRegistry};
