//! Health and replication probes (C1, C2).

pub mod cache;
pub mod relational;

pub use cache::{CacheSentinelClient, SentinelClient};
pub use relational::{RecoveryState, RelationalProbe, TcpRelationalProbe};
