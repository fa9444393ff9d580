//! Shared application state threaded through every handler.

use std::sync::Arc;
use std::time::Duration;

use failover_core::{CacheSentinelClient, FailoverConfig, FailoverCoordinator, HistoryStore, RelationalProbe, RoutingRegistry};

const HEALTH_PROBE_BUDGET: Duration = Duration::from_millis(500);

/// Everything a handler needs: the coordinator plus direct read access to
/// the registry and history store it owns, and the raw probes for the
/// `/health` liveness check (spec: "reach both sentinel and at least one
/// relational endpoint").
pub struct ApiState {
    pub config: Arc<FailoverConfig>,
    pub coordinator: Arc<FailoverCoordinator>,
    pub relational: Arc<dyn RelationalProbe>,
    pub cache: Arc<dyn CacheSentinelClient>,
    pub registry: Arc<RoutingRegistry>,
    pub history: Arc<HistoryStore>,
}

impl ApiState {
    pub fn new(
        config: Arc<FailoverConfig>,
        coordinator: Arc<FailoverCoordinator>,
        relational: Arc<dyn RelationalProbe>,
        cache: Arc<dyn CacheSentinelClient>,
        registry: Arc<RoutingRegistry>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            config,
            coordinator,
            relational,
            cache,
            registry,
            history,
        }
    }

    /// Returns `Ok(())` iff the sentinel quorum and at least one configured
    /// relational endpoint answered within budget; otherwise `Err(detail)`.
    pub async fn check_reachability(&self) -> Result<(), String> {
        let sentinel = self
            .config
            .sentinel_endpoints
            .first()
            .cloned()
            .ok_or_else(|| "no sentinel endpoints configured".to_string())?;
        self.cache
            .check_reachable(&sentinel, HEALTH_PROBE_BUDGET)
            .await
            .map_err(|e| format!("sentinel quorum unreachable: {e}"))?;

        let mut last_err = None;
        for region in self.config.regions.values() {
            match self.relational.check_reachable(&region.relational_endpoint, HEALTH_PROBE_BUDGET).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(format!(
            "no relational endpoint reachable: {}",
            last_err.unwrap_or_else(|| "no regions configured".to_string())
        ))
    }
}
