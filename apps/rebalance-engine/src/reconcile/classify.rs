//! Outcome classification and the broker-error-code rule table.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ErrorRuleRow;

/// Final verdict for one submitted order after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Broker state shows exactly the requested quantity filled.
    FilledExact,
    /// Broker state shows a fill, but not the requested quantity.
    QuantityMismatch,
    /// Order is held until the market session opens.
    PendingMarketHours,
    /// Broker refused the order for account-level reasons.
    AccountRestriction,
    /// Broker refused the order for margin reasons.
    MarginConstraint,
    /// Broker could not execute for liquidity reasons.
    LiquidityConstraint,
    /// Short sale waiting on a share locate.
    LocatingDelay,
    /// No trace of the order in any broker ledger.
    NotFound,
    /// Broker state could not be fetched completely.
    Unknown,
}

impl Classification {
    /// Whether this outcome counts toward the run success rate.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::FilledExact | Self::PendingMarketHours)
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FILLED_EXACT" => Ok(Self::FilledExact),
            "QUANTITY_MISMATCH" => Ok(Self::QuantityMismatch),
            "PENDING_MARKET_HOURS" => Ok(Self::PendingMarketHours),
            "ACCOUNT_RESTRICTION" => Ok(Self::AccountRestriction),
            "MARGIN_CONSTRAINT" => Ok(Self::MarginConstraint),
            "LIQUIDITY_CONSTRAINT" => Ok(Self::LiquidityConstraint),
            "LOCATING_DELAY" => Ok(Self::LocatingDelay),
            "NOT_FOUND" => Ok(Self::NotFound),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown classification {other}")),
        }
    }
}

/// One broker-error-code rule: code, verdict, and a narrative template.
///
/// `{symbol}` in the template is replaced with the order's symbol.
#[derive(Debug, Clone)]
pub struct ErrorRule {
    /// Broker error code this rule matches.
    pub code: String,
    /// Verdict for orders carrying the code.
    pub classification: Classification,
    /// Human-readable narrative template.
    pub narrative: String,
}

/// Built-in rules for the broker's numeric error code space.
const DEFAULT_RULES: &[(&str, Classification, &str)] = &[
    (
        "201",
        Classification::MarginConstraint,
        "{symbol}: order rejected, insufficient margin",
    ),
    (
        "202",
        Classification::AccountRestriction,
        "{symbol}: order cancelled by the broker",
    ),
    (
        "203",
        Classification::AccountRestriction,
        "{symbol}: security is not available for this account",
    ),
    (
        "399",
        Classification::PendingMarketHours,
        "{symbol}: order held, will trade when the market opens",
    ),
    (
        "404",
        Classification::LocatingDelay,
        "{symbol}: short sale waiting on shares to locate",
    ),
    (
        "163",
        Classification::LiquidityConstraint,
        "{symbol}: order size exceeds the liquidity constraint",
    ),
];

/// The rule table consulted during reconciliation.
#[derive(Debug, Clone)]
pub struct ErrorRuleTable {
    rules: Vec<ErrorRule>,
}

impl ErrorRuleTable {
    /// Built-in rules plus operator-supplied extras.
    ///
    /// Extra rules are consulted first so operators can override a
    /// built-in verdict for a code. Rows with an unknown classification
    /// name are dropped with a warning at config validation time, so here
    /// they are silently skipped.
    #[must_use]
    pub fn with_extra_rules(extra: &[ErrorRuleRow]) -> Self {
        let mut rules: Vec<ErrorRule> = extra
            .iter()
            .filter_map(|row| {
                Classification::from_str(&row.classification)
                    .ok()
                    .map(|classification| ErrorRule {
                        code: row.code.clone(),
                        classification,
                        narrative: row.narrative.clone(),
                    })
            })
            .collect();
        rules.extend(DEFAULT_RULES.iter().map(|(code, classification, narrative)| {
            ErrorRule {
                code: (*code).to_string(),
                classification: *classification,
                narrative: (*narrative).to_string(),
            }
        }));
        Self { rules }
    }

    /// Look up the verdict and narrative for a broker error code.
    #[must_use]
    pub fn lookup(&self, code: &str, symbol: &str) -> Option<(Classification, String)> {
        self.rules.iter().find(|r| r.code == code).map(|r| {
            (
                r.classification,
                r.narrative.replace("{symbol}", symbol),
            )
        })
    }
}

impl Default for ErrorRuleTable {
    fn default() -> Self {
        Self::with_extra_rules(&[])
    }
}
