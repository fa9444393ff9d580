//! Cache sentinel client (C2).
//!
//! Treats the sentinel quorum as the sole source of truth for cache
//! leadership — this client never designates a master itself, it only
//! asks the quorum and, when instructed to fail over, waits for the
//! quorum's own view to change.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::CacheError;

const FAILOVER_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FAILOVER_POLL_CAP: Duration = Duration::from_secs(2);

#[async_trait]
pub trait CacheSentinelClient: Send + Sync {
    /// The endpoint the quorum currently advertises as master.
    async fn current_master(&self, service_name: &str, budget: Duration) -> Result<String, CacheError>;

    /// Instruct the quorum to elect a new master. Complete once
    /// `current_master` returns an endpoint different from the pre-call
    /// value, polled every 100ms up to a 2s cap.
    async fn request_failover(&self, service_name: &str) -> Result<(), CacheError>;

    /// Trivial health probe against a sentinel endpoint.
    async fn check_reachable(&self, endpoint: &str, budget: Duration) -> Result<(), CacheError>;

    /// Validation-only operation (spec §4.5 step 5): write a sentinel key
    /// carrying `token` against the current master and read it back,
    /// confirming the new master genuinely accepts and serves writes.
    async fn write_and_readback(&self, service_name: &str, token: &str, budget: Duration) -> Result<(), CacheError>;
}

/// Production implementation: a small text protocol against a configured
/// sentinel quorum, modeled on Redis Sentinel's `SENTINEL
/// get-master-addr-by-name` / `SENTINEL failover` commands. Queries the
/// first reachable sentinel in the quorum; if none respond within budget
/// the call fails with `quorum_unavailable`.
pub struct SentinelClient {
    quorum: Vec<String>,
}

impl SentinelClient {
    pub fn new(quorum: Vec<String>) -> Self {
        Self { quorum }
    }

    async fn query(&self, command: &str, budget: Duration) -> Result<String, CacheError> {
        let mut last_err = None;
        for sentinel in &self.quorum {
            let attempt = async {
                let mut stream = TcpStream::connect(sentinel)
                    .await
                    .map_err(|e| e.to_string())?;
                stream
                    .write_all(format!("{command}\n").as_bytes())
                    .await
                    .map_err(|e| e.to_string())?;
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                reader.read_line(&mut line).await.map_err(|e| e.to_string())?;
                Ok::<_, String>(line.trim().to_string())
            };
            match timeout(budget, attempt).await {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => last_err = Some("timed out".to_string()),
            }
        }
        Err(CacheError::QuorumUnavailable(
            last_err.unwrap_or_else(|| "no sentinels configured".to_string()),
        ))
    }
}

#[async_trait]
impl CacheSentinelClient for SentinelClient {
    async fn current_master(&self, service_name: &str, budget: Duration) -> Result<String, CacheError> {
        self.query(&format!("SENTINEL get-master-addr-by-name {service_name}"), budget)
            .await
    }

    async fn request_failover(&self, service_name: &str) -> Result<(), CacheError> {
        let before = self.current_master(service_name, Duration::from_millis(500)).await?;
        self.query(&format!("SENTINEL failover {service_name}"), Duration::from_millis(500))
            .await?;

        let deadline = tokio::time::Instant::now() + FAILOVER_POLL_CAP;
        loop {
            if let Ok(current) = self.current_master(service_name, Duration::from_millis(500)).await {
                if current != before {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CacheError::FailoverFailed(format!(
                    "master for {service_name} did not change within {FAILOVER_POLL_CAP:?}"
                )));
            }
            tokio::time::sleep(FAILOVER_POLL_INTERVAL).await;
        }
    }

    async fn check_reachable(&self, endpoint: &str, budget: Duration) -> Result<(), CacheError> {
        let attempt = TcpStream::connect(endpoint);
        match timeout(budget, attempt).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(CacheError::Unreachable(e.to_string())),
            Err(_) => Err(CacheError::Unreachable("timed out".to_string())),
        }
    }

    async fn write_and_readback(&self, service_name: &str, token: &str, budget: Duration) -> Result<(), CacheError> {
        self.current_master(service_name, budget).await?;
        let command = format!("VALIDATE_WRITE {service_name} {token}");
        let reply = self.query(&command, budget).await?;
        if reply == token {
            Ok(())
        } else {
            Err(CacheError::ValidationFailed(format!("readback mismatch for token {token}")))
        }
    }
}

/// In-memory fakes for coordinator/executor tests.
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct FakeCacheSentinelClient {
        pub masters: Mutex<HashMap<String, String>>,
        pub unreachable: Mutex<bool>,
        pub quorum_unavailable: Mutex<bool>,
        pub failover_stalls: Mutex<bool>,
        pub validation_fails: Mutex<bool>,
    }

    impl FakeCacheSentinelClient {
        pub fn new() -> Self {
            Self {
                masters: Mutex::new(HashMap::new()),
                unreachable: Mutex::new(false),
                quorum_unavailable: Mutex::new(false),
                failover_stalls: Mutex::new(false),
                validation_fails: Mutex::new(false),
            }
        }

        pub fn with_master(service_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
            let client = Self::new();
            client.masters.lock().unwrap().insert(service_name.into(), endpoint.into());
            client
        }
    }

    #[async_trait]
    impl CacheSentinelClient for FakeCacheSentinelClient {
        async fn current_master(&self, service_name: &str, _budget: Duration) -> Result<String, CacheError> {
            if *self.quorum_unavailable.lock().unwrap() {
                return Err(CacheError::QuorumUnavailable("fake quorum down".into()));
            }
            self.masters
                .lock()
                .unwrap()
                .get(service_name)
                .cloned()
                .ok_or_else(|| CacheError::QuorumUnavailable(format!("unknown service {service_name}")))
        }

        async fn request_failover(&self, service_name: &str) -> Result<(), CacheError> {
            if *self.quorum_unavailable.lock().unwrap() {
                return Err(CacheError::QuorumUnavailable("fake quorum down".into()));
            }
            if *self.failover_stalls.lock().unwrap() {
                return Err(CacheError::FailoverFailed("fake stall".into()));
            }
            let mut masters = self.masters.lock().unwrap();
            let current = masters.get(service_name).cloned().unwrap_or_default();
            masters.insert(service_name.to_string(), format!("{current}-failed-over"));
            Ok(())
        }

        async fn check_reachable(&self, _endpoint: &str, _budget: Duration) -> Result<(), CacheError> {
            if *self.unreachable.lock().unwrap() {
                return Err(CacheError::Unreachable("fake unreachable".into()));
            }
            Ok(())
        }

        async fn write_and_readback(&self, service_name: &str, token: &str, _budget: Duration) -> Result<(), CacheError> {
            if *self.quorum_unavailable.lock().unwrap() {
                return Err(CacheError::QuorumUnavailable("fake quorum down".into()));
            }
            self.current_master(service_name, Duration::from_millis(1)).await?;
            if *self.validation_fails.lock().unwrap() {
                return Err(CacheError::ValidationFailed(format!("readback mismatch for token {token}")));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeCacheSentinelClient;
    use super::*;

    #[tokio::test]
    async fn request_failover_changes_master() {
        let client = FakeCacheSentinelClient::with_master("cache-prod", "10.0.0.1:6379");
        client.request_failover("cache-prod").await.unwrap();
        let new_master = client.current_master("cache-prod", Duration::from_millis(1)).await.unwrap();
        assert_ne!(new_master, "10.0.0.1:6379");
    }

    #[tokio::test]
    async fn stalled_failover_fails() {
        let client = FakeCacheSentinelClient::with_master("cache-prod", "10.0.0.1:6379");
        *client.failover_stalls.lock().unwrap() = true;
        let result = client.request_failover("cache-prod").await;
        assert!(matches!(result, Err(CacheError::FailoverFailed(_))));
    }

    #[tokio::test]
    async fn write_and_readback_reports_validation_failure() {
        let client = FakeCacheSentinelClient::with_master("cache-prod", "10.0.0.1:6379");
        *client.validation_fails.lock().unwrap() = true;
        let result = client.write_and_readback("cache-prod", "tok-1", Duration::from_millis(1)).await;
        assert!(matches!(result, Err(CacheError::ValidationFailed(_))));
    }
}
