// file: src/utils/telemetry.rs
// description: health probes and operation timing for the query engine
// reference: component health reporting

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::Result;

/// Health status for a component or the whole service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn icon(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "✓",
            HealthStatus::Degraded => "⚠",
            HealthStatus::Unhealthy => "✗",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub response_time_ms: u64,
}

impl HealthCheck {
    pub fn healthy(component: &str, response_time: Duration) -> Self {
        Self::with_status(component, HealthStatus::Healthy, None, response_time)
    }

    pub fn degraded(component: &str, message: String, response_time: Duration) -> Self {
        Self::with_status(component, HealthStatus::Degraded, Some(message), response_time)
    }

    pub fn unhealthy(component: &str, message: String, response_time: Duration) -> Self {
        Self::with_status(component, HealthStatus::Unhealthy, Some(message), response_time)
    }

    fn with_status(
        component: &str,
        status: HealthStatus,
        message: Option<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            component: component.to_string(),
            status,
            message,
            response_time_ms: response_time.as_millis() as u64,
        }
    }
}

/// Times a probe future. Failures mark the component `failure_status`.
///
/// The generative service is optional for answering queries, so callers pass
/// `Degraded` for it and `Unhealthy` for the embedder and store.
pub async fn probe<F>(component: &str, failure_status: HealthStatus, check: F) -> HealthCheck
where
    F: Future<Output = Result<()>>,
{
    let start = Instant::now();
    let outcome = check.await;
    let elapsed = start.elapsed();

    match outcome {
        Ok(()) => HealthCheck::healthy(component, elapsed),
        Err(e) => {
            warn!(component, error = %e, "Health probe failed");
            HealthCheck::with_status(component, failure_status, Some(e.to_string()), elapsed)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub timestamp: u64,
    pub version: String,
}

impl HealthReport {
    pub fn new(checks: Vec<HealthCheck>, version: String) -> Self {
        let overall_status = if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            overall_status,
            checks,
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            version,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status != HealthStatus::Unhealthy
    }

    pub fn format(&self) -> String {
        let mut output = format!(
            "{} Search service: {:?}\nVersion: {}\nTimestamp: {}\n\n",
            self.overall_status.icon(),
            self.overall_status,
            self.version,
            chrono::DateTime::from_timestamp(self.timestamp as i64, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        for check in &self.checks {
            output.push_str(&format!(
                "{} {} ({:?}) - {}ms",
                check.status.icon(),
                check.component,
                check.status,
                check.response_time_ms
            ));

            if let Some(ref msg) = check.message {
                output.push_str(&format!("\n  {}", msg));
            }

            output.push('\n');
        }

        output
    }
}

/// Logs how long an operation took, with a slow-operation warning.
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish_with_count(self, count: usize) -> Duration {
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        info!(
            "Completed {}: {} items in {:.2}s ({:.2} items/sec)",
            self.operation,
            count,
            secs,
            if secs > 0.0 { count as f64 / secs } else { 0.0 }
        );
        elapsed
    }

    pub fn warn_if_slow(&self, threshold: Duration) {
        let elapsed = self.elapsed();
        if elapsed > threshold {
            warn!(
                "Slow {}: took {}ms (threshold {}ms)",
                self.operation,
                elapsed.as_millis(),
                threshold.as_millis()
            );
        }
    }
}
