//! Ticker normalization for exchange-suffix and separator drift.
//!
//! Universe files often carry vendor tickers like `RDSA.AS` or `BRK.B`
//! while the broker catalog wants `RDSA` or `BRK B`. Variations are tried
//! in order, so the unmodified ticker always goes first.

/// Vendor exchange suffixes that brokers drop from the symbol.
const EXCHANGE_SUFFIXES: &[&str] = &[
    ".L", ".DE", ".PA", ".MI", ".AS", ".SW", ".TO", ".HK", ".T", ".AX", ".SI", ".ST", ".OL",
    ".CO", ".HE", ".BR", ".LS", ".VI", ".MC", ".IR",
];

/// Candidate broker symbols for a vendor ticker, deduplicated in order.
#[must_use]
pub fn ticker_variations(ticker: &str) -> Vec<String> {
    let ticker = ticker.trim().to_uppercase();
    let mut variations = vec![ticker.clone()];

    for suffix in EXCHANGE_SUFFIXES {
        if let Some(stripped) = ticker.strip_suffix(suffix) {
            if !stripped.is_empty() {
                variations.push(stripped.to_string());
            }
            break;
        }
    }

    if ticker.contains('.') {
        // Class shares: BRK.B is quoted as "BRK B" or "BRK-B" depending on venue.
        variations.push(ticker.replace('.', " "));
        variations.push(ticker.replace('.', "-"));
        variations.push(ticker.replace('.', ""));
    }

    let mut seen = Vec::with_capacity(variations.len());
    for v in variations {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen
}
