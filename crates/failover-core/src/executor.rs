//! Step executor (C4) — generic machinery for running a finite ordered
//! sequence of named, timed operations under a global deadline.
//!
//! This is deliberately decoupled from the coordinator (C5): the executor
//! knows nothing about relational probes, cache sentinels, or routing — it
//! only knows how to run `Step` implementations under a deadline and
//! record what happened. That split is what makes it testable in
//! isolation (see `tests` below) rather than only exercisable through a
//! full failover attempt.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::FailoverErrorKind;

/// The closed set of step names from spec §4.5/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    HealthCheck,
    PromoteRelational,
    FailoverCache,
    UpdateRouting,
    Validate,
}

/// Typed detail attached to a successful step — the re-architected
/// replacement for the source's schemaless per-step map (spec §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOkDetail {
    pub lag_seconds: Option<f64>,
    pub new_master_endpoint: Option<String>,
    pub validation_token: Option<String>,
}

/// A step's outcome, tagged over the closed error-kind set plus an `ok`
/// variant carrying optional typed detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok { detail: Option<StepOkDetail> },
    Failed { kind: FailoverErrorKind, message: String },
    Skipped { kind: FailoverErrorKind },
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepOutcome::Ok { .. })
    }
}

/// One step's audit record, always present in a `FailoverRecord` in fixed
/// order regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: StepName,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// What a step body returns: typed detail on success, or an error kind
/// plus message on failure. Never panics, never raises — always a value.
pub type StepBodyResult = Result<Option<StepOkDetail>, (FailoverErrorKind, String)>;

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;
    /// Whether a failure here aborts the remaining sequence.
    fn critical(&self) -> bool;
    /// This step's own timeout, before being clamped to the remaining
    /// overall budget.
    fn timeout(&self) -> Duration;
    /// Run the step body with the given (already-clamped) budget.
    async fn run(&self, budget: Duration) -> StepBodyResult;
}

/// Runs a sequence of `Step`s under one overall deadline, producing the
/// ordered `StepRecord` list and an overall success flag.
pub struct StepExecutor {
    deadline: Instant,
}

impl StepExecutor {
    pub fn new(overall_budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + overall_budget,
        }
    }

    pub async fn run_all(&self, steps: Vec<Box<dyn Step>>) -> (Vec<StepRecord>, bool) {
        let mut records = Vec::with_capacity(steps.len());
        let mut abort_kind: Option<FailoverErrorKind> = None;

        for step in steps {
            if let Some(kind) = abort_kind {
                records.push(StepRecord {
                    name: step.name(),
                    started_at: Utc::now(),
                    duration_ms: 0,
                    outcome: StepOutcome::Skipped { kind },
                });
                continue;
            }

            let now = Instant::now();
            if now >= self.deadline {
                tracing::warn!(step = ?step.name(), "overall deadline exceeded before step started");
                records.push(StepRecord {
                    name: step.name(),
                    started_at: Utc::now(),
                    duration_ms: 0,
                    outcome: StepOutcome::Skipped { kind: FailoverErrorKind::DeadlineExceeded },
                });
                abort_kind = Some(FailoverErrorKind::DeadlineExceeded);
                continue;
            }

            let remaining = self.deadline.saturating_duration_since(now);
            let budget = std::cmp::min(step.timeout(), remaining);
            let wall_start = Utc::now();
            let monotonic_start = Instant::now();

            let outcome = match tokio::time::timeout(budget, step.run(budget)).await {
                Ok(Ok(detail)) => {
                    tracing::info!(step = ?step.name(), "step completed");
                    StepOutcome::Ok { detail }
                }
                Ok(Err((kind, message))) => {
                    tracing::warn!(step = ?step.name(), ?kind, %message, "step failed");
                    StepOutcome::Failed { kind, message }
                }
                Err(_) => {
                    tracing::warn!(step = ?step.name(), "step exceeded its budget");
                    StepOutcome::Failed {
                        kind: FailoverErrorKind::DeadlineExceeded,
                        message: format!("step did not complete within {budget:?}"),
                    }
                }
            };

            let duration_ms = monotonic_start.elapsed().as_millis() as u64;
            let critical_failure = !outcome.is_ok() && step.critical();
            if critical_failure {
                abort_kind = Some(match &outcome {
                    StepOutcome::Failed { kind, .. } => *kind,
                    _ => unreachable!(),
                });
            }

            records.push(StepRecord {
                name: step.name(),
                started_at: wall_start,
                duration_ms,
                outcome,
            });
        }

        let success = abort_kind.is_none() && records.iter().all(|r| r.outcome.is_ok());
        (records, success)
    }
}
