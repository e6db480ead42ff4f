//! Order type selection policy.
//!
//! Which order type and time-in-force to use depends only on whether the
//! instrument trades in the account's local currency and whether the local
//! market session is open. The mapping is a data table so new combinations
//! are rows, not branches.

use chrono::{DateTime, Timelike, Utc};

use crate::broker::{WireOrderType, WireTimeInForce};

/// Whether the instrument's currency matches the account's local currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// Instrument trades in the account currency.
    Local,
    /// Instrument trades in a foreign currency.
    Foreign,
}

/// Coarse state of the local market session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSession {
    /// Regular trading hours.
    Regular,
    /// Outside regular trading hours.
    Closed,
}

impl MarketSession {
    /// Approximate the US regular session (14:30-21:00 UTC) at `now`.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        let minutes = now.hour() * 60 + now.minute();
        if (14 * 60 + 30..21 * 60).contains(&minutes) {
            Self::Regular
        } else {
            Self::Closed
        }
    }
}

/// The policy table: one row per (locality, session) combination.
///
/// Local orders during the session go out as plain market orders. Local
/// orders after hours queue as market-on-open so they execute at the next
/// auction. Foreign orders are always market with GTC since the foreign
/// session rarely lines up with ours.
const POLICY: &[(Locality, MarketSession, WireOrderType, WireTimeInForce)] = &[
    (Locality::Local, MarketSession::Regular, WireOrderType::Market, WireTimeInForce::Day),
    (Locality::Local, MarketSession::Closed, WireOrderType::MarketOnOpen, WireTimeInForce::Day),
    (Locality::Foreign, MarketSession::Regular, WireOrderType::Market, WireTimeInForce::Gtc),
    (Locality::Foreign, MarketSession::Closed, WireOrderType::Market, WireTimeInForce::Gtc),
];

/// Pick order type and time-in-force for an instrument currency.
#[must_use]
pub fn select_order_type(
    currency: &str,
    local_currency: &str,
    session: MarketSession,
) -> (WireOrderType, WireTimeInForce) {
    let locality = if currency.is_empty() || currency == local_currency {
        Locality::Local
    } else {
        Locality::Foreign
    };
    POLICY
        .iter()
        .find(|(l, s, _, _)| *l == locality && *s == session)
        .map_or(
            (WireOrderType::Market, WireTimeInForce::Day),
            |(_, _, order_type, tif)| (*order_type, *tif),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case("USD", MarketSession::Regular, WireOrderType::Market, WireTimeInForce::Day; "local open")]
    #[test_case("USD", MarketSession::Closed, WireOrderType::MarketOnOpen, WireTimeInForce::Day; "local closed")]
    #[test_case("EUR", MarketSession::Regular, WireOrderType::Market, WireTimeInForce::Gtc; "foreign open")]
    #[test_case("EUR", MarketSession::Closed, WireOrderType::Market, WireTimeInForce::Gtc; "foreign closed")]
    fn policy_rows(
        currency: &str,
        session: MarketSession,
        expected_type: WireOrderType,
        expected_tif: WireTimeInForce,
    ) {
        let (order_type, tif) = select_order_type(currency, "USD", session);
        assert_eq!(order_type, expected_type);
        assert_eq!(tif, expected_tif);
    }

    #[test]
    fn unknown_currency_is_treated_as_local() {
        let (order_type, tif) = select_order_type("", "USD", MarketSession::Regular);
        assert_eq!(order_type, WireOrderType::Market);
        assert_eq!(tif, WireTimeInForce::Day);
    }

    #[test]
    fn session_boundaries() {
        let open = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().expect("valid");
        assert_eq!(MarketSession::at(open), MarketSession::Regular);

        let pre = Utc.with_ymd_and_hms(2026, 3, 2, 14, 29, 0).single().expect("valid");
        assert_eq!(MarketSession::at(pre), MarketSession::Closed);

        let post = Utc.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).single().expect("valid");
        assert_eq!(MarketSession::at(post), MarketSession::Closed);
    }
}
