//! Failover coordinator (C5) — the top-level state machine that composes
//! the relational probe, cache sentinel client, routing registry, and step
//! executor into a single failover attempt.
//!
//! The five steps below are the fixed sequence from the coordinator's
//! contract: Health → Promote-Relational → Failover-Cache →
//! Update-Routing → Validate. Each is a thin `Step` adapter around C1/C2/C3;
//! the coordinator itself only decides what to build them with and what to
//! do with the sealed record afterward.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::FailoverConfig;
use crate::error::{CoordinatorRejection, FailoverErrorKind};
use crate::executor::{Step, StepBodyResult, StepExecutor, StepName, StepOkDetail, StepOutcome};
use crate::history::{FailoverRecord, FailoverRecordError, HistoryStore};
use crate::probes::cache::CacheSentinelClient;
use crate::probes::relational::{RecoveryState, RelationalProbe};
use crate::routing::RoutingRegistry;

/// Resets the in-flight flag on every exit path, including early returns and
/// panics unwinding through `run_attempt`.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        Self { flag }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Health check (step 1, critical, default 500ms): target must be
/// reachable, in `standby`, within lag tolerance; sentinel quorum must be
/// reachable. No mutation on any outcome.
struct HealthCheckStep {
    relational: Arc<dyn RelationalProbe>,
    cache: Arc<dyn CacheSentinelClient>,
    source_relational_endpoint: String,
    target_relational_endpoint: String,
    sentinel_endpoint: String,
    max_lag_tolerated: Duration,
    budget: Duration,
}

#[async_trait]
impl Step for HealthCheckStep {
    fn name(&self) -> StepName {
        StepName::HealthCheck
    }
    fn critical(&self) -> bool {
        true
    }
    fn timeout(&self) -> Duration {
        self.budget
    }
    async fn run(&self, budget: Duration) -> StepBodyResult {
        self.relational
            .check_reachable(&self.target_relational_endpoint, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;

        let state = self
            .relational
            .recovery_state(&self.target_relational_endpoint, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        if state != RecoveryState::Standby {
            return Err((
                FailoverErrorKind::WrongRole,
                format!("expected {} to be standby, observed {state:?}", self.target_relational_endpoint),
            ));
        }

        let lag = self
            .relational
            .replication_lag(&self.source_relational_endpoint, &self.target_relational_endpoint, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        let tolerated = self.max_lag_tolerated.as_secs_f64();
        match lag {
            // An unreadable lag cannot be confirmed within tolerance, so it
            // is treated as a failure rather than passed through silently.
            None => {
                return Err((
                    FailoverErrorKind::LagTooHigh,
                    "replication lag unavailable; cannot confirm standby is within tolerance".to_string(),
                ))
            }
            Some(seconds) if seconds > tolerated => {
                return Err((
                    FailoverErrorKind::LagTooHigh,
                    format!("observed lag {seconds}s exceeds tolerance {tolerated}s"),
                ))
            }
            Some(_) => {}
        }

        self.cache
            .check_reachable(&self.sentinel_endpoint, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;

        Ok(Some(StepOkDetail {
            lag_seconds: lag,
            ..Default::default()
        }))
    }
}

/// Relational promotion (step 2, critical, default 2s). No prior mutation
/// has occurred, so an abort here leaves the system exactly as it was.
struct PromoteRelationalStep {
    relational: Arc<dyn RelationalProbe>,
    target_relational_endpoint: String,
    budget: Duration,
}

#[async_trait]
impl Step for PromoteRelationalStep {
    fn name(&self) -> StepName {
        StepName::PromoteRelational
    }
    fn critical(&self) -> bool {
        true
    }
    fn timeout(&self) -> Duration {
        self.budget
    }
    async fn run(&self, _budget: Duration) -> StepBodyResult {
        self.relational
            .promote(&self.target_relational_endpoint)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        Ok(None)
    }
}

/// Cache failover (step 3, critical, default 1s). The relational promotion
/// is the durable commit point (spec notes, unchanged here): a failure past
/// this point is never rolled back.
struct FailoverCacheStep {
    cache: Arc<dyn CacheSentinelClient>,
    cache_service_name: String,
    new_master: Arc<Mutex<Option<String>>>,
    budget: Duration,
}

#[async_trait]
impl Step for FailoverCacheStep {
    fn name(&self) -> StepName {
        StepName::FailoverCache
    }
    fn critical(&self) -> bool {
        true
    }
    fn timeout(&self) -> Duration {
        self.budget
    }
    async fn run(&self, budget: Duration) -> StepBodyResult {
        self.cache
            .request_failover(&self.cache_service_name)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        let new_master = self
            .cache
            .current_master(&self.cache_service_name, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        *self.new_master.lock() = Some(new_master.clone());
        Ok(Some(StepOkDetail {
            new_master_endpoint: Some(new_master),
            ..Default::default()
        }))
    }
}

/// Routing update (step 4, critical, default 200ms). This is the point at
/// which external routers observe the new topology.
struct UpdateRoutingStep {
    registry: Arc<RoutingRegistry>,
    target_region: String,
    target_relational_endpoint: String,
    fallback_cache_endpoint: String,
    new_master: Arc<Mutex<Option<String>>>,
    budget: Duration,
}

#[async_trait]
impl Step for UpdateRoutingStep {
    fn name(&self) -> StepName {
        StepName::UpdateRouting
    }
    fn critical(&self) -> bool {
        true
    }
    fn timeout(&self) -> Duration {
        self.budget
    }
    async fn run(&self, _budget: Duration) -> StepBodyResult {
        let cache_endpoint = self
            .new_master
            .lock()
            .clone()
            .unwrap_or_else(|| self.fallback_cache_endpoint.clone());
        let record = self
            .registry
            .swap(self.target_region.clone(), self.target_relational_endpoint.clone(), cache_endpoint)
            .map_err(|_| (FailoverErrorKind::RoutingUpdateFailed, "routing registry busy".to_string()))?;
        Ok(Some(StepOkDetail {
            new_master_endpoint: Some(record.cache_master_endpoint),
            ..Default::default()
        }))
    }
}

/// Validation (step 5, critical, default 1.5s). A failure here does not
/// revert the routing swap (see design notes): the new region has already
/// become the durable source.
struct ValidateStep {
    relational: Arc<dyn RelationalProbe>,
    cache: Arc<dyn CacheSentinelClient>,
    target_relational_endpoint: String,
    cache_service_name: String,
    budget: Duration,
}

#[async_trait]
impl Step for ValidateStep {
    fn name(&self) -> StepName {
        StepName::Validate
    }
    fn critical(&self) -> bool {
        true
    }
    fn timeout(&self) -> Duration {
        self.budget
    }
    async fn run(&self, budget: Duration) -> StepBodyResult {
        let token = Uuid::new_v4().to_string();
        self.relational
            .write_and_readback(&self.target_relational_endpoint, &token, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        self.cache
            .write_and_readback(&self.cache_service_name, &token, budget)
            .await
            .map_err(|e| (e.kind(), e.to_string()))?;
        Ok(Some(StepOkDetail {
            validation_token: Some(token),
            ..Default::default()
        }))
    }
}

/// C5: the failover coordinator. Holds the single source of at-most-one
/// in-flight discipline; everything else is delegated to the components it
/// composes.
pub struct FailoverCoordinator {
    config: Arc<FailoverConfig>,
    relational: Arc<dyn RelationalProbe>,
    cache: Arc<dyn CacheSentinelClient>,
    registry: Arc<RoutingRegistry>,
    history: Arc<HistoryStore>,
    in_flight: AtomicBool,
}

impl FailoverCoordinator {
    pub fn new(
        config: Arc<FailoverConfig>,
        relational: Arc<dyn RelationalProbe>,
        cache: Arc<dyn CacheSentinelClient>,
        registry: Arc<RoutingRegistry>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            config,
            relational,
            cache,
            registry,
            history,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validates the trigger, reserves the single in-flight slot, runs the
    /// fixed step sequence, seals a `FailoverRecord`, and appends it to
    /// history. Rejections never acquire the in-flight slot and never touch
    /// history — a no-op retrigger must be side-effect free.
    pub async fn trigger(&self, target_region: &str) -> Result<FailoverRecord, CoordinatorRejection> {
        if !self.config.regions.contains_key(target_region) {
            return Err(CoordinatorRejection::UnknownRegion);
        }

        let snapshot = self.registry.read();
        if snapshot.active_region == target_region {
            return Err(CoordinatorRejection::AlreadyAtTarget);
        }

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(CoordinatorRejection::AlreadyInProgress);
        }
        let _guard = InFlightGuard::new(&self.in_flight);

        let record = self.run_attempt(&snapshot.active_region, target_region).await;
        self.history.append(record.clone());
        Ok(record)
    }

    async fn run_attempt(&self, source_region: &str, target_region: &str) -> FailoverRecord {
        let id = Uuid::new_v4();
        let triggered_at = Utc::now();
        let attempt_start = tokio::time::Instant::now();
        let span = tracing::info_span!("failover", %id, source_region, target_region);
        let _entered = span.enter();
        tracing::info!("failover attempt triggered");

        let target = self
            .config
            .region(target_region)
            .expect("target_region validated present in trigger()");
        let snapshot = self.registry.read();
        let sentinel_endpoint = self
            .config
            .sentinel_endpoints
            .first()
            .cloned()
            .unwrap_or_default();
        let new_master: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let budgets = &self.config.step_budgets;
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(HealthCheckStep {
                relational: self.relational.clone(),
                cache: self.cache.clone(),
                source_relational_endpoint: snapshot.relational_primary_endpoint.clone(),
                target_relational_endpoint: target.relational_endpoint.clone(),
                sentinel_endpoint,
                max_lag_tolerated: self.config.max_lag_tolerated(),
                budget: budgets.health_check(),
            }),
            Box::new(PromoteRelationalStep {
                relational: self.relational.clone(),
                target_relational_endpoint: target.relational_endpoint.clone(),
                budget: budgets.promote_relational(),
            }),
            Box::new(FailoverCacheStep {
                cache: self.cache.clone(),
                cache_service_name: self.config.cache_service_name.clone(),
                new_master: new_master.clone(),
                budget: budgets.failover_cache(),
            }),
            Box::new(UpdateRoutingStep {
                registry: self.registry.clone(),
                target_region: target_region.to_string(),
                target_relational_endpoint: target.relational_endpoint.clone(),
                fallback_cache_endpoint: target.cache_endpoint.clone(),
                new_master: new_master.clone(),
                budget: budgets.update_routing(),
            }),
            Box::new(ValidateStep {
                relational: self.relational.clone(),
                cache: self.cache.clone(),
                target_relational_endpoint: target.relational_endpoint.clone(),
                cache_service_name: self.config.cache_service_name.clone(),
                budget: budgets.validate(),
            }),
        ];

        let executor = StepExecutor::new(self.config.overall_budget());
        let (step_records, success) = executor.run_all(steps).await;

        let total_duration_ms = attempt_start.elapsed().as_millis() as u64;
        let sla_compliant = total_duration_ms <= self.config.overall_budget_ms + 50;
        let error = step_records.iter().find_map(|r| match &r.outcome {
            StepOutcome::Failed { kind, message } => Some(FailoverRecordError {
                kind: *kind,
                message: message.clone(),
            }),
            _ => None,
        });

        if success {
            tracing::info!(total_duration_ms, "failover attempt succeeded");
        } else {
            tracing::warn!(total_duration_ms, ?error, "failover attempt failed");
        }

        FailoverRecord {
            id,
            source_region: source_region.to_string(),
            target_region: target_region.to_string(),
            triggered_at,
            completed_at: Utc::now(),
            success,
            total_duration_ms,
            sla_compliant,
            steps: step_records,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepBudgets;
    use crate::probes::cache::testing::FakeCacheSentinelClient;
    use crate::probes::relational::testing::FakeRelationalProbe;
    use crate::region::{Region, RegionMap};
    use crate::routing::RoutingRecord;
    use std::collections::HashMap;

    fn two_region_config() -> FailoverConfig {
        let mut regions: RegionMap = HashMap::new();
        regions.insert(
            "a".into(),
            Region {
                id: "a".into(),
                relational_endpoint: "rel-a".into(),
                cache_endpoint: "cache-a".into(),
            },
        );
        regions.insert(
            "b".into(),
            Region {
                id: "b".into(),
                relational_endpoint: "rel-b".into(),
                cache_endpoint: "cache-b".into(),
            },
        );
        FailoverConfig {
            regions,
            initial_active_region: "a".into(),
            sentinel_endpoints: vec!["sentinel-1".into()],
            cache_service_name: "prod-cache".into(),
            overall_budget_ms: 5_000,
            max_lag_tolerated_ms: 1_000,
            history_capacity: 100,
            step_budgets: StepBudgets::default(),
        }
    }

    fn harness(config: FailoverConfig) -> (FailoverCoordinator, Arc<FakeRelationalProbe>, Arc<FakeCacheSentinelClient>) {
        let relational = Arc::new(FakeRelationalProbe::new());
        relational.states.lock().unwrap().insert("rel-a".into(), RecoveryState::Primary);
        relational.states.lock().unwrap().insert("rel-b".into(), RecoveryState::Standby);
        relational.lag_seconds.lock().unwrap().insert("rel-b".into(), Some(0.2));

        let cache = Arc::new(FakeCacheSentinelClient::with_master("prod-cache", "cache-a"));

        let registry = Arc::new(RoutingRegistry::new(RoutingRecord::initial("a", "rel-a", "cache-a")));
        let history = Arc::new(HistoryStore::new(config.history_capacity));
        let coordinator = FailoverCoordinator::new(Arc::new(config), relational.clone(), cache.clone(), registry, history);
        (coordinator, relational, cache)
    }

    #[tokio::test]
    async fn happy_path_succeeds_and_advances_routing() {
        let (coordinator, _relational, _cache) = harness(two_region_config());
        let record = coordinator.trigger("b").await.unwrap();

        assert!(record.success);
        assert!(record.sla_compliant);
        assert_eq!(record.steps.len(), 5);
        assert!(record.steps.iter().all(|s| matches!(s.outcome, StepOutcome::Ok { .. })));
        assert_eq!(coordinator.registry.read().active_region, "b");
        assert_eq!(coordinator.registry.read().version, 1);
    }

    #[tokio::test]
    async fn lag_too_high_rejects_at_health_check() {
        let (coordinator, relational, _cache) = harness(two_region_config());
        relational.lag_seconds.lock().unwrap().insert("rel-b".into(), Some(5.0));

        let record = coordinator.trigger("b").await.unwrap();
        assert!(!record.success);
        assert!(matches!(record.steps[0].outcome, StepOutcome::Failed { kind: FailoverErrorKind::LagTooHigh, .. }));
        assert!(record.steps[1..].iter().all(|s| matches!(s.outcome, StepOutcome::Skipped { .. })));
        assert_eq!(coordinator.registry.read().active_region, "a");
        assert_eq!(coordinator.registry.read().version, 0);
    }

    #[tokio::test]
    async fn promotion_failure_aborts_before_any_mutation() {
        let (coordinator, relational, _cache) = harness(two_region_config());
        relational.promote_fails.lock().unwrap().push("rel-b".into());

        let record = coordinator.trigger("b").await.unwrap();
        assert!(!record.success);
        assert!(matches!(record.steps[0].outcome, StepOutcome::Ok { .. }));
        assert!(matches!(record.steps[1].outcome, StepOutcome::Failed { kind: FailoverErrorKind::PromotionFailed, .. }));
        assert!(record.steps[2..].iter().all(|s| matches!(s.outcome, StepOutcome::Skipped { .. })));
        assert_eq!(coordinator.registry.read().version, 0);
    }

    #[tokio::test]
    async fn cache_failover_failure_leaves_routing_unchanged() {
        let (coordinator, _relational, cache) = harness(two_region_config());
        *cache.failover_stalls.lock().unwrap() = true;

        let record = coordinator.trigger("b").await.unwrap();
        assert!(!record.success);
        assert!(matches!(record.steps[1].outcome, StepOutcome::Ok { .. }));
        assert!(matches!(record.steps[2].outcome, StepOutcome::Failed { kind: FailoverErrorKind::CacheFailoverFailed, .. }));
        assert!(matches!(record.steps[3].outcome, StepOutcome::Skipped { .. }));
        assert!(matches!(record.steps[4].outcome, StepOutcome::Skipped { .. }));
        assert_eq!(coordinator.registry.read().active_region, "a");
    }

    #[tokio::test]
    async fn unknown_region_is_rejected_without_side_effects() {
        let (coordinator, _relational, _cache) = harness(two_region_config());
        let result = coordinator.trigger("c").await;
        assert_eq!(result.unwrap_err(), CoordinatorRejection::UnknownRegion);
        assert!(!coordinator.is_in_flight());
        assert_eq!(coordinator.history.recent(10).len(), 0);
    }

    #[tokio::test]
    async fn no_op_trigger_is_rejected_without_side_effects() {
        let (coordinator, _relational, _cache) = harness(two_region_config());
        let result = coordinator.trigger("a").await;
        assert_eq!(result.unwrap_err(), CoordinatorRejection::AlreadyAtTarget);
        assert_eq!(coordinator.registry.read().version, 0);
        assert_eq!(coordinator.history.recent(10).len(), 0);
    }

    #[tokio::test]
    async fn concurrent_triggers_only_one_runs() {
        let (coordinator, _relational, _cache) = harness(two_region_config());
        let coordinator = Arc::new(coordinator);

        coordinator.in_flight.store(true, Ordering::SeqCst);
        let result = coordinator.trigger("b").await;
        assert_eq!(result.unwrap_err(), CoordinatorRejection::AlreadyInProgress);
        assert_eq!(coordinator.history.recent(10).len(), 0);
    }
}
