//! Goal-evaluation service.

use crate::conversation::transcript::ChatLine;
use crate::error::{RehearseError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalRequest {
    pub transcript: Vec<ChatLine>,
    pub goals: Vec<String>,
}

/// Indices into the request's goal list that the trainee has achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GoalReport {
    #[serde(alias = "achieved_goals", alias = "achievedGoals")]
    pub achieved: Vec<usize>,
}

#[async_trait]
pub trait GoalEvaluator: Send + Sync {
    async fn evaluate(&self, request: GoalRequest) -> Result<GoalReport>;
}

#[derive(Debug, Clone)]
struct ScriptedReport {
    achieved: std::result::Result<Vec<usize>, String>,
    latency: Duration,
}

/// Mock goal evaluator for testing
///
/// Answers calls with scripted reports in call order. Each report can carry
/// its own latency, so a slow early call can finish after a later one.
#[derive(Debug, Default)]
pub struct MockGoalEvaluator {
    script: Mutex<VecDeque<ScriptedReport>>,
    requests: Mutex<Vec<GoalRequest>>,
    calls: AtomicUsize,
}

impl MockGoalEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(self, achieved: &[usize]) -> Self {
        self.with_slow_report(achieved, Duration::ZERO)
    }

    pub fn with_slow_report(self, achieved: &[usize], latency: Duration) -> Self {
        self.push(ScriptedReport {
            achieved: Ok(achieved.to_vec()),
            latency,
        });
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.push(ScriptedReport {
            achieved: Err(message.to_string()),
            latency: Duration::ZERO,
        });
        self
    }

    /// Number of calls that reached the evaluator
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GoalRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn push(&self, report: ScriptedReport) {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(report);
    }
}

#[async_trait]
impl GoalEvaluator for MockGoalEvaluator {
    async fn evaluate(&self, request: GoalRequest) -> Result<GoalReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        let Some(report) = next else {
            return Ok(GoalReport::default());
        };
        if !report.latency.is_zero() {
            tokio::time::sleep(report.latency).await;
        }
        report
            .achieved
            .map(|achieved| GoalReport { achieved })
            .map_err(|message| RehearseError::remote("goals", message))
    }
}
