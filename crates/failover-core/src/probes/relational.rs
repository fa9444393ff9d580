//! Relational probe (C1).
//!
//! Exposes reachability, recovery-state, and replication-lag queries plus a
//! promotion command, against a relational node's control endpoint. All
//! operations are read-only except `promote`; none ever raise to the
//! caller — every outcome is a `Result` value (spec §7).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ProbeError;

/// Whether a relational node is accepting writes or applying replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    Primary,
    Standby,
    Unknown,
}

/// Poll cadence and cap for `promote`'s confirmation loop (spec §4.1).
const PROMOTE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROMOTE_POLL_CAP: Duration = Duration::from_secs(3);

#[async_trait]
pub trait RelationalProbe: Send + Sync {
    /// Connection, authentication, and a trivial round-trip succeed.
    async fn check_reachable(&self, endpoint: &str, budget: Duration) -> Result<(), ProbeError>;

    /// Whether the node is accepting writes or applying replication.
    async fn recovery_state(&self, endpoint: &str, budget: Duration) -> Result<RecoveryState, ProbeError>;

    /// Seconds between the latest committed write and the latest
    /// acknowledged replay on `standby`, or `None` if the deployment
    /// cannot report it (the caller must not treat `None` as zero lag).
    async fn replication_lag(&self, primary: &str, standby: &str, budget: Duration) -> Result<Option<f64>, ProbeError>;

    /// Request that `endpoint` assume primary status. Idempotent: a call
    /// against an already-primary node is a no-op observed via
    /// `recovery_state`. Completes only once a subsequent `recovery_state`
    /// call confirms `Primary`, polling up to a 3s cap.
    async fn promote(&self, endpoint: &str) -> Result<(), ProbeError>;

    /// Validation-only operation (spec §4.5 step 5): write a sentinel row
    /// carrying `token` to `endpoint` and read it back, confirming the new
    /// primary genuinely accepts and serves writes.
    async fn write_and_readback(&self, endpoint: &str, token: &str, budget: Duration) -> Result<(), ProbeError>;
}

/// Production implementation: a minimal line-based control protocol over
/// TCP. Real deployments would speak the relational engine's own
/// replication-status protocol (e.g. Postgres `pg_stat_replication`); this
/// probe assumes the endpoint exposes an equivalent line-oriented summary,
/// matching the "thin text protocol" the spec describes for the sentinel
/// side.
pub struct TcpRelationalProbe;

impl Default for TcpRelationalProbe {
    fn default() -> Self {
        Self
    }
}

impl TcpRelationalProbe {
    pub fn new() -> Self {
        Self
    }

    async fn query(&self, endpoint: &str, command: &str, budget: Duration) -> Result<String, ProbeError> {
        let connect = async {
            let mut stream = TcpStream::connect(endpoint)
                .await
                .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
            stream
                .write_all(format!("{command}\n").as_bytes())
                .await
                .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader
                .read_line(&mut line)
                .await
                .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
            Ok(line.trim().to_string())
        };

        match timeout(budget, connect).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

#[async_trait]
impl RelationalProbe for TcpRelationalProbe {
    async fn check_reachable(&self, endpoint: &str, budget: Duration) -> Result<(), ProbeError> {
        self.query(endpoint, "PING", budget).await.map(|_| ())
    }

    async fn recovery_state(&self, endpoint: &str, budget: Duration) -> Result<RecoveryState, ProbeError> {
        let reply = self.query(endpoint, "RECOVERY_STATE", budget).await?;
        Ok(match reply.as_str() {
            "primary" => RecoveryState::Primary,
            "standby" => RecoveryState::Standby,
            _ => RecoveryState::Unknown,
        })
    }

    async fn replication_lag(&self, primary: &str, standby: &str, budget: Duration) -> Result<Option<f64>, ProbeError> {
        let command = format!("REPLICATION_LAG {standby}");
        let reply = self.query(primary, &command, budget).await?;
        Ok(reply.parse::<f64>().ok())
    }

    async fn promote(&self, endpoint: &str) -> Result<(), ProbeError> {
        // Idempotent request: issue it, then poll recovery_state for
        // confirmation. A node that is already primary satisfies the poll
        // on the first iteration.
        self.query(endpoint, "PROMOTE", Duration::from_millis(500)).await?;

        let deadline = tokio::time::Instant::now() + PROMOTE_POLL_CAP;
        loop {
            if self.recovery_state(endpoint, Duration::from_millis(500)).await == Ok(RecoveryState::Primary) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ProbeError::PromotionFailed(format!(
                    "{endpoint} did not confirm primary within {PROMOTE_POLL_CAP:?}"
                )));
            }
            tokio::time::sleep(PROMOTE_POLL_INTERVAL).await;
        }
    }

    async fn write_and_readback(&self, endpoint: &str, token: &str, budget: Duration) -> Result<(), ProbeError> {
        let command = format!("VALIDATE_WRITE {token}");
        let reply = self.query(endpoint, &command, budget).await?;
        if reply == token {
            Ok(())
        } else {
            Err(ProbeError::ValidationFailed(format!("readback mismatch for token {token}")))
        }
    }
}

/// In-memory fakes for exercising the coordinator and executor without
/// real network I/O. Not behind `#[cfg(test)]` so integration tests under
/// `tests/` (compiled as a separate crate) can use them too.
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory fake used by coordinator/executor tests — deterministic,
    /// no real network I/O.
    pub struct FakeRelationalProbe {
        pub states: Mutex<HashMap<String, RecoveryState>>,
        pub lag_seconds: Mutex<HashMap<String, Option<f64>>>,
        pub unreachable: Mutex<Vec<String>>,
        pub promote_fails: Mutex<Vec<String>>,
        pub validation_fails: Mutex<bool>,
        /// Artificial delay injected before `write_and_readback` responds,
        /// for exercising deadline-exceeded behaviour under a tight budget.
        pub write_and_readback_delay: Mutex<Option<Duration>>,
        /// Artificial delay injected before `check_reachable` responds, for
        /// exercising genuine interleaving of two concurrent triggers (the
        /// health check is the first real suspension point in an attempt).
        pub check_reachable_delay: Mutex<Option<Duration>>,
    }

    impl FakeRelationalProbe {
        pub fn new() -> Self {
            Self {
                states: Mutex::new(HashMap::new()),
                lag_seconds: Mutex::new(HashMap::new()),
                unreachable: Mutex::new(Vec::new()),
                promote_fails: Mutex::new(Vec::new()),
                validation_fails: Mutex::new(false),
                write_and_readback_delay: Mutex::new(None),
                check_reachable_delay: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl RelationalProbe for FakeRelationalProbe {
        async fn check_reachable(&self, endpoint: &str, _budget: Duration) -> Result<(), ProbeError> {
            if let Some(delay) = *self.check_reachable_delay.lock().unwrap() {
                tokio::time::sleep(delay).await;
            }
            if self.unreachable.lock().unwrap().contains(&endpoint.to_string()) {
                return Err(ProbeError::Unreachable(endpoint.to_string()));
            }
            Ok(())
        }

        async fn recovery_state(&self, endpoint: &str, _budget: Duration) -> Result<RecoveryState, ProbeError> {
            Ok(self
                .states
                .lock()
                .unwrap()
                .get(endpoint)
                .copied()
                .unwrap_or(RecoveryState::Unknown))
        }

        async fn replication_lag(&self, _primary: &str, standby: &str, _budget: Duration) -> Result<Option<f64>, ProbeError> {
            Ok(self.lag_seconds.lock().unwrap().get(standby).copied().flatten())
        }

        async fn promote(&self, endpoint: &str) -> Result<(), ProbeError> {
            if self.promote_fails.lock().unwrap().contains(&endpoint.to_string()) {
                return Err(ProbeError::PromotionFailed(endpoint.to_string()));
            }
            self.states
                .lock()
                .unwrap()
                .insert(endpoint.to_string(), RecoveryState::Primary);
            Ok(())
        }

        async fn write_and_readback(&self, endpoint: &str, token: &str, _budget: Duration) -> Result<(), ProbeError> {
            if let Some(delay) = *self.write_and_readback_delay.lock().unwrap() {
                tokio::time::sleep(delay).await;
            }
            if self.unreachable.lock().unwrap().contains(&endpoint.to_string()) {
                return Err(ProbeError::Unreachable(endpoint.to_string()));
            }
            if *self.validation_fails.lock().unwrap() {
                return Err(ProbeError::ValidationFailed(format!("readback mismatch for token {token}")));
            }
            Ok(())
        }
    }
}
