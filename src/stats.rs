use crate::backend::BackendId;
use crate::structure::Level;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Outcome of a single backend attempt.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    pub backend: BackendId,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub succeeded: bool,
}

/// Outputs of every task for one structural unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub title: String,
    pub level: Level,
    pub word_count: usize,
    pub outputs: BTreeMap<String, String>,
}

impl UnitResult {
    pub fn output(&self, task: &str) -> Option<&str> {
        self.outputs.get(task).map(String::as_str)
    }
}

/// Counters and results accumulated over one run.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    started: Instant,
    pub total_calls: usize,
    pub total_errors: usize,
    pub total_fallbacks: usize,
    /// Durations of successful calls, per backend, in call order.
    pub durations: BTreeMap<BackendId, Vec<Duration>>,
    pub errors: BTreeMap<BackendId, usize>,
    pub unit_results: Vec<UnitResult>,
    pub outline_review: Option<String>,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_calls: 0,
            total_errors: 0,
            total_fallbacks: 0,
            durations: BTreeMap::new(),
            errors: BTreeMap::new(),
            unit_results: Vec::new(),
            outline_review: None,
        }
    }

    pub fn record_attempt(&mut self, attempt: &CallAttempt) {
        self.total_calls += 1;
        if attempt.succeeded {
            self.durations
                .entry(attempt.backend)
                .or_default()
                .push(attempt.duration);
        } else {
            self.total_errors += 1;
            *self.errors.entry(attempt.backend).or_default() += 1;
        }
    }

    pub fn record_fallback(&mut self) {
        self.total_fallbacks += 1;
    }

    pub fn record_unit(&mut self, result: UnitResult) {
        self.unit_results.push(result);
    }

    pub fn successful_calls(&self) -> usize {
        self.total_calls - self.total_errors
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self) -> RunSummary {
        let elapsed = self.elapsed().as_secs_f64();
        let success_rate = if self.total_calls == 0 {
            100.0
        } else {
            100.0 * (1.0 - self.total_errors as f64 / self.total_calls as f64)
        };

        let backends = BackendId::ALL
            .into_iter()
            .filter_map(|backend| {
                let durations = self.durations.get(&backend).map_or(&[][..], Vec::as_slice);
                let errors = self.errors.get(&backend).copied().unwrap_or(0);
                if durations.is_empty() && errors == 0 {
                    return None;
                }
                Some(BackendSummary {
                    backend,
                    successful_calls: durations.len(),
                    errors,
                    mean_latency_secs: round2(mean_secs(durations)),
                })
            })
            .collect();

        let all: Vec<Duration> = self.durations.values().flatten().copied().collect();

        RunSummary {
            elapsed_secs: round2(elapsed),
            elapsed_minutes: round2(elapsed / 60.0),
            total_calls: self.total_calls,
            total_errors: self.total_errors,
            total_fallbacks: self.total_fallbacks,
            success_rate: (success_rate * 10.0).round() / 10.0,
            mean_latency_secs: round2(mean_secs(&all)),
            units_analyzed: self.unit_results.len(),
            backends,
        }
    }
}

fn mean_secs(durations: &[Duration]) -> f64 {
    if durations.is_empty() {
        return 0.0;
    }
    durations.iter().map(Duration::as_secs_f64).sum::<f64>() / durations.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derived view of [`RunStatistics`] for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub elapsed_secs: f64,
    pub elapsed_minutes: f64,
    pub total_calls: usize,
    pub total_errors: usize,
    pub total_fallbacks: usize,
    /// Percentage of attempts that succeeded, one decimal.
    pub success_rate: f64,
    pub mean_latency_secs: f64,
    pub units_analyzed: usize,
    pub backends: Vec<BackendSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSummary {
    pub backend: BackendId,
    pub successful_calls: usize,
    pub errors: usize,
    pub mean_latency_secs: f64,
}
