//! Reconciliation report artifact.

use serde::Serialize;

use crate::error::EngineError;
use crate::models::{OrderAction, OrderStatusRecord};

use super::classify::Classification;

/// Verdict and evidence for one submitted order.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledOrder {
    /// Broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Quantity the plan asked for.
    pub requested_quantity: i64,
    /// Quantity the broker reports filled.
    pub broker_filled_quantity: i64,
    /// Final verdict.
    pub classification: Classification,
    /// Human-readable explanation of the verdict.
    pub narrative: String,
    /// The submission-time record the verdict was reached from.
    pub submission: OrderStatusRecord,
}

/// The persisted result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// One verdict per submitted order, in plan order.
    pub results: Vec<ReconciledOrder>,
    /// Share of orders with a success verdict, in `[0.0, 1.0]`.
    pub success_rate: f64,
    /// Whether any broker state fetch failed or timed out.
    pub incomplete: bool,
    /// Errors from failed broker state fetches.
    pub fetch_errors: Vec<String>,
    /// When the pass finished (RFC 3339).
    pub completed_at: String,
    /// Wall-clock duration of the pass in milliseconds.
    pub duration_ms: u64,
}

impl ReconciliationReport {
    /// Count of orders with a success verdict.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.classification.is_success())
            .count()
    }

    /// The fetch failure behind an incomplete pass, if any.
    #[must_use]
    pub fn incomplete_error(&self) -> Option<EngineError> {
        self.incomplete.then(|| EngineError::ReconciliationIncomplete {
            reason: if self.fetch_errors.is_empty() {
                "broker state fetch incomplete".to_string()
            } else {
                self.fetch_errors.join("; ")
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(incomplete: bool, fetch_errors: Vec<String>) -> ReconciliationReport {
        ReconciliationReport {
            results: Vec::new(),
            success_rate: 1.0,
            incomplete,
            fetch_errors,
            completed_at: "2026-03-02T15:00:00Z".to_string(),
            duration_ms: 12,
        }
    }

    #[test]
    fn complete_pass_has_no_incomplete_error() {
        assert!(report(false, Vec::new()).incomplete_error().is_none());
    }

    #[test]
    fn incomplete_pass_surfaces_fetch_errors() {
        let err = report(
            true,
            vec!["positions: request timed out after 4s".to_string()],
        )
        .incomplete_error()
        .expect("incomplete pass produces an error");
        assert!(matches!(err, EngineError::ReconciliationIncomplete { .. }));
        assert!(err.to_string().contains("positions: request timed out"));
    }
}
