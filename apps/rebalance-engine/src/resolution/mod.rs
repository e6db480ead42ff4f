//! Instrument resolution: map universe assets to tradable broker contracts.
//!
//! Strategies are tried strictly in order of trust: ISIN lookup, ticker
//! variations, then fuzzy name search. The first strategy that produces an
//! acceptable candidate wins and later strategies never run. Every resolved
//! record carries the confidence of the winning strategy and the candidates
//! that were considered and turned down.

pub mod cache;
pub mod name_match;
pub mod ticker;

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::broker::{PooledSession, SessionError, SessionPool};
use crate::config::ResolutionConfig;
use crate::error::EngineError;
use crate::models::{Asset, BrokerInstrument, RejectedCandidate, ResolutionMethod, ResolutionRecord};

pub use cache::{CacheStats, ResolutionCache};
pub use name_match::name_similarity;
pub use ticker::ticker_variations;

/// Home country for broker exchange codes, used to break currency ties.
const EXCHANGE_COUNTRY: &[(&str, &str)] = &[
    ("NYSE", "US"),
    ("NASDAQ", "US"),
    ("ARCA", "US"),
    ("AMEX", "US"),
    ("BATS", "US"),
    ("LSE", "GB"),
    ("LSEETF", "GB"),
    ("IBIS", "DE"),
    ("XETRA", "DE"),
    ("FWB", "DE"),
    ("SBF", "FR"),
    ("BVME", "IT"),
    ("AEB", "NL"),
    ("EBS", "CH"),
    ("TSE", "CA"),
    ("VENTURE", "CA"),
    ("SEHK", "HK"),
    ("TSEJ", "JP"),
    ("ASX", "AU"),
];

fn exchange_country(exchange: &str) -> Option<&'static str> {
    EXCHANGE_COUNTRY
        .iter()
        .find(|(code, _)| *code == exchange)
        .map(|(_, country)| *country)
}

/// Resolves universe assets against the broker catalog.
pub struct InstrumentResolver {
    pool: Arc<SessionPool>,
    cache: Arc<ResolutionCache>,
    config: ResolutionConfig,
}

impl InstrumentResolver {
    /// Build a resolver over a session pool and a shared cache.
    #[must_use]
    pub fn new(pool: Arc<SessionPool>, cache: Arc<ResolutionCache>, config: ResolutionConfig) -> Self {
        Self { pool, cache, config }
    }

    /// Resolve every asset, bounded by the configured concurrency.
    ///
    /// Output order matches input order. Assets that cannot be resolved get
    /// an unresolved record rather than failing the batch.
    pub async fn resolve_universe(self: &Arc<Self>, assets: &[Asset]) -> Vec<ResolutionRecord> {
        let limiter = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();

        for (idx, asset) in assets.iter().cloned().enumerate() {
            let resolver = Arc::clone(self);
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let _permit = limiter.acquire().await;
                (idx, resolver.resolve_one(&asset).await)
            });
        }

        let mut records: Vec<Option<ResolutionRecord>> = (0..assets.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, record)) => records[idx] = Some(record),
                Err(e) => warn!(error = %e, "resolution task panicked"),
            }
        }

        let records: Vec<ResolutionRecord> = records
            .into_iter()
            .zip(assets)
            .map(|(record, asset)| {
                record.unwrap_or_else(|| {
                    ResolutionRecord::unresolved(asset.ticker.clone(), asset.isin.clone())
                })
            })
            .collect();

        let resolved = records.iter().filter(|r| r.is_resolved()).count();
        let stats = self.cache.stats();
        info!(
            resolved,
            total = records.len(),
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            "universe resolution finished"
        );
        records
    }

    /// Resolve one asset: cache, then ISIN, ticker, and name strategies.
    pub async fn resolve_one(&self, asset: &Asset) -> ResolutionRecord {
        if let Some(cached) = self.cache.get(asset) {
            return cached;
        }

        let mut rejected: Vec<RejectedCandidate> = Vec::new();

        if let Some(isin) = asset.isin.as_deref() {
            match self.try_isin(asset, isin, &mut rejected).await {
                Ok(Some(record)) => return self.accept(asset, record),
                Ok(None) => debug!(ticker = %asset.ticker, "isin strategy found nothing"),
                Err(e) => warn!(ticker = %asset.ticker, error = %e, "isin strategy failed"),
            }
        }

        match self.try_ticker(asset, &mut rejected).await {
            Ok(Some(record)) => return self.accept(asset, record),
            Ok(None) => debug!(ticker = %asset.ticker, "ticker strategy found nothing"),
            Err(e) => warn!(ticker = %asset.ticker, error = %e, "ticker strategy failed"),
        }

        match self.try_name(asset, &mut rejected).await {
            Ok(Some(record)) => return self.accept(asset, record),
            Ok(None) => debug!(ticker = %asset.ticker, "name strategy found nothing"),
            Err(e) => warn!(ticker = %asset.ticker, error = %e, "name strategy failed"),
        }

        warn!(ticker = %asset.ticker, "asset could not be resolved");
        let mut record = ResolutionRecord::unresolved(asset.ticker.clone(), asset.isin.clone());
        record.rejected = rejected;
        record
    }

    fn accept(&self, asset: &Asset, record: ResolutionRecord) -> ResolutionRecord {
        self.cache.put(asset, record.clone());
        record
    }

    async fn session(&self) -> Result<PooledSession, EngineError> {
        self.pool.acquire().await
    }

    async fn try_isin(
        &self,
        asset: &Asset,
        isin: &str,
        rejected: &mut Vec<RejectedCandidate>,
    ) -> Result<Option<ResolutionRecord>, EngineError> {
        let contracts = {
            let session = self.session().await?;
            tokio::time::timeout(self.config.strategy_timeout(), session.lookup_isin(isin))
                .await
                .map_err(|_| EngineError::ResolutionFailure {
                    ticker: asset.ticker.clone(),
                    reason: "isin lookup timed out".to_string(),
                })?
                .map_err(|e| strategy_error(asset, e))?
        };

        Ok(self
            .pick_contract(asset, contracts, rejected)
            .map(|instrument| ResolutionRecord {
                ticker: asset.ticker.clone(),
                isin: asset.isin.clone(),
                instrument: Some(instrument),
                method: Some(ResolutionMethod::Isin),
                confidence: self.config.isin_threshold,
                rejected: std::mem::take(rejected),
            }))
    }

    async fn try_ticker(
        &self,
        asset: &Asset,
        rejected: &mut Vec<RejectedCandidate>,
    ) -> Result<Option<ResolutionRecord>, EngineError> {
        for variation in ticker_variations(&asset.ticker) {
            let contracts = {
                let session = self.session().await?;
                tokio::time::timeout(
                    self.config.strategy_timeout(),
                    session.contract_details(&variation),
                )
                .await
                .map_err(|_| EngineError::ResolutionFailure {
                    ticker: asset.ticker.clone(),
                    reason: format!("contract details for {variation} timed out"),
                })?
                .map_err(|e| strategy_error(asset, e))?
            };

            if let Some(instrument) = self.pick_contract(asset, contracts, rejected) {
                return Ok(Some(ResolutionRecord {
                    ticker: asset.ticker.clone(),
                    isin: asset.isin.clone(),
                    instrument: Some(instrument),
                    method: Some(ResolutionMethod::Ticker),
                    confidence: self.config.ticker_threshold,
                    rejected: std::mem::take(rejected),
                }));
            }
        }
        Ok(None)
    }

    async fn try_name(
        &self,
        asset: &Asset,
        rejected: &mut Vec<RejectedCandidate>,
    ) -> Result<Option<ResolutionRecord>, EngineError> {
        let pattern = name_match::normalize_name(&asset.name).join(" ");
        if pattern.is_empty() {
            return Ok(None);
        }

        let samples = {
            let session = self.session().await?;
            tokio::time::timeout(self.config.strategy_timeout(), session.match_symbols(&pattern))
                .await
                .map_err(|_| EngineError::ResolutionFailure {
                    ticker: asset.ticker.clone(),
                    reason: "symbol search timed out".to_string(),
                })?
                .map_err(|e| strategy_error(asset, e))?
        };

        let mut best: Option<(BrokerInstrument, f64)> = None;
        for sample in samples {
            let score = name_similarity(&asset.name, &sample.description);
            if score < self.config.noise_floor {
                continue;
            }
            if !sample.instrument.tradable || sample.instrument.currency != asset.currency {
                rejected.push(RejectedCandidate {
                    symbol: sample.instrument.symbol,
                    exchange: sample.instrument.exchange,
                    currency: sample.instrument.currency,
                    score,
                    reason: "currency mismatch or not tradable".to_string(),
                });
                continue;
            }
            let country_bonus = if sample.country == asset.country { 0.01 } else { 0.0 };
            let adjusted = score + country_bonus;
            match &best {
                Some((held, held_score)) if *held_score >= adjusted => {
                    rejected.push(RejectedCandidate {
                        symbol: sample.instrument.symbol,
                        exchange: sample.instrument.exchange,
                        currency: sample.instrument.currency,
                        score,
                        reason: format!("outscored by {}", held.symbol),
                    });
                }
                _ => {
                    if let Some((prev, prev_score)) = best.replace((sample.instrument, adjusted)) {
                        rejected.push(RejectedCandidate {
                            symbol: prev.symbol,
                            exchange: prev.exchange,
                            currency: prev.currency,
                            score: prev_score,
                            reason: "outscored by a later candidate".to_string(),
                        });
                    }
                }
            }
        }

        match best {
            Some((instrument, score)) if score >= self.config.name_threshold => {
                Ok(Some(ResolutionRecord {
                    ticker: asset.ticker.clone(),
                    isin: asset.isin.clone(),
                    instrument: Some(instrument),
                    method: Some(ResolutionMethod::Name),
                    confidence: score.min(1.0),
                    rejected: std::mem::take(rejected),
                }))
            }
            Some((instrument, score)) => {
                rejected.push(RejectedCandidate {
                    symbol: instrument.symbol,
                    exchange: instrument.exchange,
                    currency: instrument.currency,
                    score,
                    reason: "best name score below acceptance threshold".to_string(),
                });
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Disambiguate contract candidates: tradable, currency, then home country.
    fn pick_contract(
        &self,
        asset: &Asset,
        contracts: Vec<BrokerInstrument>,
        rejected: &mut Vec<RejectedCandidate>,
    ) -> Option<BrokerInstrument> {
        let mut eligible = Vec::new();
        for contract in contracts {
            if contract.tradable && contract.currency == asset.currency {
                eligible.push(contract);
            } else {
                rejected.push(RejectedCandidate {
                    symbol: contract.symbol,
                    exchange: contract.exchange,
                    currency: contract.currency,
                    score: self.config.noise_floor,
                    reason: if contract.tradable {
                        "currency mismatch".to_string()
                    } else {
                        "not tradable".to_string()
                    },
                });
            }
        }

        if eligible.len() > 1 {
            if let Some(home_idx) = eligible
                .iter()
                .position(|c| exchange_country(&c.exchange) == Some(asset.country.as_str()))
            {
                for (i, contract) in eligible.iter().enumerate() {
                    if i != home_idx {
                        rejected.push(RejectedCandidate {
                            symbol: contract.symbol.clone(),
                            exchange: contract.exchange.clone(),
                            currency: contract.currency.clone(),
                            score: self.config.noise_floor,
                            reason: "listing outside home country".to_string(),
                        });
                    }
                }
                return Some(eligible.swap_remove(home_idx));
            }
        }
        // Single candidate, or ambiguity with no home listing: take the first.
        if eligible.len() > 1 {
            debug!(ticker = %asset.ticker, candidates = eligible.len(), "ambiguous listing, taking first");
        }
        eligible.into_iter().next()
    }

}

fn strategy_error(asset: &Asset, e: SessionError) -> EngineError {
    EngineError::ResolutionFailure {
        ticker: asset.ticker.clone(),
        reason: e.to_string(),
    }
}

impl std::fmt::Debug for InstrumentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SimulatedBroker;
    use crate::config::BrokerConfig;
    use std::time::Duration;

    fn asset(ticker: &str, isin: Option<&str>, name: &str) -> Asset {
        Asset {
            ticker: ticker.to_string(),
            isin: isin.map(String::from),
            name: name.to_string(),
            currency: "USD".to_string(),
            country: "US".to_string(),
        }
    }

    fn instrument(symbol: &str, exchange: &str, currency: &str) -> BrokerInstrument {
        BrokerInstrument {
            broker_id: 1,
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            currency: currency.to_string(),
            tradable: true,
        }
    }

    async fn resolver_over(venue: SimulatedBroker) -> Arc<InstrumentResolver> {
        let pool = SessionPool::connect(
            Arc::new(venue),
            BrokerConfig {
                pool_size: 2,
                ..BrokerConfig::default()
            },
        )
        .await
        .expect("pool connects");
        Arc::new(InstrumentResolver::new(
            Arc::new(pool),
            Arc::new(ResolutionCache::new(Duration::from_secs(3600))),
            ResolutionConfig::default(),
        ))
    }

    #[tokio::test]
    async fn isin_beats_other_strategies() {
        let venue = SimulatedBroker::new()
            .with_instrument(instrument("ACME", "NYSE", "USD"), Some("US0001"), "Acme Corp", "US")
            .with_instrument(instrument("ACMX", "NYSE", "USD"), None, "Acme Corp", "US");
        let resolver = resolver_over(venue).await;

        let record = resolver
            .resolve_one(&asset("ACME", Some("US0001"), "Acme Corp"))
            .await;
        assert_eq!(record.method, Some(ResolutionMethod::Isin));
        assert!((record.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.instrument.expect("resolved").symbol, "ACME");
    }

    #[tokio::test]
    async fn ticker_variation_resolves_suffixed_symbol() {
        let venue = SimulatedBroker::new().with_instrument(
            instrument("VOD", "NYSE", "USD"),
            None,
            "Vodafone Group",
            "US",
        );
        let resolver = resolver_over(venue).await;

        let record = resolver.resolve_one(&asset("VOD.L", None, "Vodafone Group")).await;
        assert_eq!(record.method, Some(ResolutionMethod::Ticker));
        assert_eq!(record.instrument.expect("resolved").symbol, "VOD");
    }

    #[tokio::test]
    async fn name_fallback_scores_and_resolves() {
        let venue = SimulatedBroker::new().with_instrument(
            instrument("PRF", "NYSE", "USD"),
            None,
            "Pacific Rail Freight Inc",
            "US",
        );
        let resolver = resolver_over(venue).await;

        let record = resolver
            .resolve_one(&asset("PACRAIL", None, "Pacific Rail Freight"))
            .await;
        assert_eq!(record.method, Some(ResolutionMethod::Name));
        assert!(record.confidence >= 0.72);
        assert_eq!(record.instrument.expect("resolved").symbol, "PRF");
    }

    #[tokio::test]
    async fn currency_mismatch_is_rejected_with_reason() {
        let venue = SimulatedBroker::new().with_instrument(
            instrument("ACME", "LSE", "GBP"),
            Some("US0001"),
            "Acme Corp",
            "GB",
        );
        let resolver = resolver_over(venue).await;

        let record = resolver
            .resolve_one(&asset("ACME", Some("US0001"), "Acme Corp"))
            .await;
        assert!(!record.is_resolved());
        assert!(record
            .rejected
            .iter()
            .any(|r| r.reason.contains("currency")));
    }

    #[tokio::test]
    async fn ambiguous_listings_prefer_home_country() {
        let venue = SimulatedBroker::new()
            .with_instrument(instrument("ACME", "IBIS", "USD"), Some("US0001"), "Acme Corp", "DE")
            .with_instrument(instrument("ACME", "NYSE", "USD"), Some("US0001"), "Acme Corp", "US");
        let resolver = resolver_over(venue).await;

        let record = resolver
            .resolve_one(&asset("ACME", Some("US0001"), "Acme Corp"))
            .await;
        let instrument = record.instrument.expect("resolved");
        assert_eq!(instrument.exchange, "NYSE");
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let venue = SimulatedBroker::new().with_instrument(
            instrument("ACME", "NYSE", "USD"),
            Some("US0001"),
            "Acme Corp",
            "US",
        );
        let counter = venue.clone();
        let resolver = resolver_over(venue).await;
        let target = asset("ACME", Some("US0001"), "Acme Corp");

        resolver.resolve_one(&target).await;
        let calls_after_first = counter.request_count();
        let record = resolver.resolve_one(&target).await;
        assert!(record.is_resolved());
        assert_eq!(counter.request_count(), calls_after_first);
    }

    #[tokio::test]
    async fn universe_order_is_preserved() {
        let venue = SimulatedBroker::new()
            .with_instrument(instrument("AAA", "NYSE", "USD"), None, "Alpha Co", "US")
            .with_instrument(instrument("BBB", "NYSE", "USD"), None, "Bravo Co", "US")
            .with_instrument(instrument("CCC", "NYSE", "USD"), None, "Charlie Co", "US");
        let resolver = resolver_over(venue).await;

        let universe = vec![
            asset("CCC", None, "Charlie Co"),
            asset("AAA", None, "Alpha Co"),
            asset("BBB", None, "Bravo Co"),
        ];
        let records = resolver.resolve_universe(&universe).await;
        let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["CCC", "AAA", "BBB"]);
        assert!(records.iter().all(ResolutionRecord::is_resolved));
    }

    #[tokio::test]
    async fn unknown_asset_yields_unresolved_record() {
        let resolver = resolver_over(SimulatedBroker::new()).await;
        let record = resolver.resolve_one(&asset("GHOST", None, "Ghost Industries")).await;
        assert!(!record.is_resolved());
        assert!(record.method.is_none());
    }
}
