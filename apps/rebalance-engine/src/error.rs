//! Engine-level error taxonomy.
//!
//! Propagation policy: failures local to one asset or one order are absorbed
//! into report statuses and never surface as errors from a run; only
//! pool-wide broker unavailability terminates an in-flight operation.

use thiserror::Error;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session pool exhausted or broker unreachable. Terminal for the
    /// in-flight operation; the caller may retry with backoff.
    #[error("broker unavailable: {reason}")]
    BrokerUnavailable {
        /// Why no session could be obtained.
        reason: String,
    },

    /// One asset could not be resolved. Degrades to "unresolved" in the
    /// resolution snapshot, never aborts the batch.
    #[error("resolution failed for {ticker}: {reason}")]
    ResolutionFailure {
        /// Upstream ticker that failed to resolve.
        ticker: String,
        /// NotFound or ambiguity detail.
        reason: String,
    },

    /// Broker rejected one order. Carries the broker's raw code; does not
    /// stop remaining submissions.
    #[error("submission rejected for {symbol}: [{code}] {message}")]
    SubmissionRejected {
        /// Broker symbol of the rejected order.
        symbol: String,
        /// Raw broker error code.
        code: String,
        /// Raw broker error message.
        message: String,
    },

    /// Reconciliation data fetch timed out; partial data was used.
    #[error("reconciliation incomplete: {reason}")]
    ReconciliationIncomplete {
        /// What could not be fetched in time.
        reason: String,
    },

    /// Run artifact could not be written or read.
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Run artifact could not be serialized.
    #[error("artifact serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = EngineError::SubmissionRejected {
            symbol: "XYZ".to_string(),
            code: "201".to_string(),
            message: "insufficient margin".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "submission rejected for XYZ: [201] insufficient margin"
        );

        let err = EngineError::BrokerUnavailable {
            reason: "pool acquire timed out after 5s".to_string(),
        };
        assert!(err.to_string().contains("pool acquire timed out"));
    }
}
