//! Data Aggregator
//!
//! Gathers quote, ratios, ratings, and news for one symbol from independent
//! providers. The four calls run concurrently with a per-call timeout; any
//! failure or timeout yields an absent field, never a failed gather. The
//! single exception is the quote provider reporting the symbol as unknown,
//! which reports the whole bundle absent: quote is the load-bearing field,
//! the rest are enrichments.

use crate::models::{SentimentLabel, SubjectBundle, Symbol};
use crate::providers::{Fundamentals, MarketData, NewsFeed, SentimentClassifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DataAggregator {
    market: Arc<dyn MarketData>,
    fundamentals: Arc<dyn Fundamentals>,
    news: Arc<dyn NewsFeed>,
    sentiment: Arc<dyn SentimentClassifier>,
    call_timeout: Duration,
}

impl DataAggregator {
    pub fn new(
        market: Arc<dyn MarketData>,
        fundamentals: Arc<dyn Fundamentals>,
        news: Arc<dyn NewsFeed>,
        sentiment: Arc<dyn SentimentClassifier>,
    ) -> Self {
        Self {
            market,
            fundamentals,
            news,
            sentiment,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Gather all available data for one symbol.
    ///
    /// Returns `None` only when the quote provider explicitly reports the
    /// symbol as unknown. Everything else degrades to absent fields.
    pub async fn gather(&self, symbol: &Symbol) -> Option<SubjectBundle> {
        debug!(symbol = %symbol, "Gathering subject data");

        let (quote_result, ratios_result, ratings_result, news_result) = tokio::join!(
            timeout(self.call_timeout, self.market.get_quote(symbol)),
            timeout(self.call_timeout, self.fundamentals.get_ratios(symbol)),
            timeout(self.call_timeout, self.fundamentals.get_ratings(symbol)),
            timeout(self.call_timeout, self.news.get_news(symbol)),
        );

        let quote = match quote_result {
            // Provider-confirmed unknown symbol: the bundle is absent.
            Ok(Ok(None)) => {
                warn!(symbol = %symbol, "Quote provider does not know this symbol");
                return None;
            }
            Ok(Ok(Some(quote))) => Some(quote),
            Ok(Err(e)) => {
                warn!(symbol = %symbol, error = %e, "Quote fetch failed");
                None
            }
            Err(_) => {
                warn!(symbol = %symbol, "Quote fetch timed out");
                None
            }
        };

        let ratios = flatten_optional("ratios", symbol, ratios_result);
        let ratings = flatten_optional("ratings", symbol, ratings_result);

        let news = match news_result {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                warn!(symbol = %symbol, error = %e, "News fetch failed");
                Vec::new()
            }
            Err(_) => {
                warn!(symbol = %symbol, "News fetch timed out");
                Vec::new()
            }
        };

        let sentiment = self.aggregate_sentiment(symbol, &news).await;

        Some(SubjectBundle {
            symbol: symbol.clone(),
            quote,
            ratios,
            sentiment,
            ratings,
            news,
        })
    }

    /// Classify each headline independently and majority-vote the results.
    /// Ties resolve to Neutral; no headlines means no sentiment at all.
    async fn aggregate_sentiment(
        &self,
        symbol: &Symbol,
        news: &[crate::models::NewsItem],
    ) -> Option<SentimentLabel> {
        if news.is_empty() {
            return None;
        }

        let mut votes = Vec::with_capacity(news.len());
        for item in news {
            match timeout(self.call_timeout, self.sentiment.classify(&item.title)).await {
                Ok(Ok(label)) => votes.push(label),
                Ok(Err(e)) => {
                    warn!(symbol = %symbol, error = %e, "Headline sentiment failed, skipping");
                }
                Err(_) => {
                    warn!(symbol = %symbol, "Headline sentiment timed out, skipping");
                }
            }
        }

        if votes.is_empty() {
            return None;
        }

        Some(majority_vote(&votes))
    }
}

fn flatten_optional<T>(
    field: &str,
    symbol: &Symbol,
    result: Result<crate::Result<Option<T>>, tokio::time::error::Elapsed>,
) -> Option<T> {
    match result {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!(symbol = %symbol, field, error = %e, "Enrichment fetch failed");
            None
        }
        Err(_) => {
            warn!(symbol = %symbol, field, "Enrichment fetch timed out");
            None
        }
    }
}

fn majority_vote(votes: &[SentimentLabel]) -> SentimentLabel {
    let positive = votes
        .iter()
        .filter(|v| **v == SentimentLabel::Positive)
        .count();
    let negative = votes
        .iter()
        .filter(|v| **v == SentimentLabel::Negative)
        .count();

    if positive > negative {
        SentimentLabel::Positive
    } else if negative > positive {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::models::{AnalystRating, FinancialRatios, NewsItem, Quote};

    pub(crate) fn test_quote(symbol: &str, price: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            change: 1.25,
            change_percent: "0.5%".to_string(),
            open: price - 1.0,
            high: price + 2.0,
            low: price - 2.0,
            volume: 1_000_000,
            previous_close: price - 1.25,
            latest_trading_day: Some("2026-08-25".to_string()),
        }
    }

    pub(crate) fn headline(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            source: Some("TestWire".to_string()),
            published_at: None,
            url: None,
        }
    }

    /// Configurable mock provider covering all four collaborator seams.
    pub(crate) struct MockProviders {
        pub quote: crate::Result<Option<Quote>>,
        pub ratios: crate::Result<Option<FinancialRatios>>,
        pub ratings: crate::Result<Option<AnalystRating>>,
        pub news: crate::Result<Vec<NewsItem>>,
        pub sentiments: Vec<SentimentLabel>,
        pub delay: Option<Duration>,
    }

    impl MockProviders {
        pub(crate) fn healthy(symbol: &str) -> Self {
            Self {
                quote: Ok(Some(test_quote(symbol, 250.0))),
                ratios: Ok(Some(FinancialRatios {
                    pe_ratio: Some(30.1),
                    roe: Some(0.21),
                    roa: Some(0.09),
                    current_ratio: Some(1.5),
                    debt_to_equity: Some(0.4),
                })),
                ratings: Ok(Some(AnalystRating {
                    rating: "A-".to_string(),
                    score: Some(4),
                    recommendation: Some("Buy".to_string()),
                })),
                news: Ok(vec![headline("Shares rally on earnings beat")]),
                sentiments: vec![SentimentLabel::Positive],
                delay: None,
            }
        }

        async fn maybe_delay(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn clone_result<T: Clone>(result: &crate::Result<T>) -> crate::Result<T> {
        match result {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(AgentError::Provider(e.to_string())),
        }
    }

    #[async_trait::async_trait]
    impl MarketData for MockProviders {
        async fn get_quote(&self, _symbol: &Symbol) -> crate::Result<Option<Quote>> {
            self.maybe_delay().await;
            clone_result(&self.quote)
        }
    }

    #[async_trait::async_trait]
    impl Fundamentals for MockProviders {
        async fn get_ratios(&self, _symbol: &Symbol) -> crate::Result<Option<FinancialRatios>> {
            self.maybe_delay().await;
            clone_result(&self.ratios)
        }

        async fn get_ratings(&self, _symbol: &Symbol) -> crate::Result<Option<AnalystRating>> {
            self.maybe_delay().await;
            clone_result(&self.ratings)
        }
    }

    #[async_trait::async_trait]
    impl NewsFeed for MockProviders {
        async fn get_news(&self, _symbol: &Symbol) -> crate::Result<Vec<NewsItem>> {
            self.maybe_delay().await;
            clone_result(&self.news)
        }
    }

    #[async_trait::async_trait]
    impl SentimentClassifier for MockProviders {
        async fn classify(&self, headline: &str) -> crate::Result<SentimentLabel> {
            // Deterministic per-headline label keyed by the headline index.
            let index = headline
                .rsplit(' ')
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(0);
            Ok(self
                .sentiments
                .get(index)
                .copied()
                .unwrap_or(SentimentLabel::Neutral))
        }
    }

    fn aggregator_from(providers: MockProviders) -> DataAggregator {
        let shared = Arc::new(providers);
        DataAggregator::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared,
        )
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_full_bundle() {
        let aggregator = aggregator_from(MockProviders::healthy("TSLA"));
        let bundle = aggregator.gather(&sym("TSLA")).await.unwrap();

        assert!(bundle.quote.is_some());
        assert!(bundle.ratios.is_some());
        assert!(bundle.ratings.is_some());
        assert_eq!(bundle.news.len(), 1);
        assert_eq!(bundle.sentiment, Some(SentimentLabel::Positive));
    }

    #[tokio::test]
    async fn test_unknown_symbol_reports_bundle_absent() {
        let mut providers = MockProviders::healthy("ZZZZ");
        providers.quote = Ok(None);

        let aggregator = aggregator_from(providers);
        assert!(aggregator.gather(&sym("ZZZZ")).await.is_none());
    }

    #[tokio::test]
    async fn test_quote_transport_error_degrades_to_absent_field() {
        let mut providers = MockProviders::healthy("TSLA");
        providers.quote = Err(AgentError::Provider("connection reset".to_string()));

        let aggregator = aggregator_from(providers);
        let bundle = aggregator.gather(&sym("TSLA")).await.unwrap();

        assert!(bundle.quote.is_none());
        assert!(bundle.ratios.is_some());
    }

    #[tokio::test]
    async fn test_enrichment_failures_are_independent() {
        let mut providers = MockProviders::healthy("AAPL");
        providers.ratios = Err(AgentError::Provider("503".to_string()));
        providers.news = Err(AgentError::Provider("quota".to_string()));

        let aggregator = aggregator_from(providers);
        let bundle = aggregator.gather(&sym("AAPL")).await.unwrap();

        assert!(bundle.quote.is_some());
        assert!(bundle.ratios.is_none());
        assert!(bundle.ratings.is_some());
        assert!(bundle.news.is_empty());
        assert!(bundle.sentiment.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_enrichment_times_out_without_blocking_turn() {
        let mut providers = MockProviders::healthy("MSFT");
        providers.delay = Some(Duration::from_secs(30));

        let aggregator =
            aggregator_from(providers).with_call_timeout(Duration::from_millis(100));
        let bundle = aggregator.gather(&sym("MSFT")).await;

        // Every provider is slow, so even the quote times out; timed-out
        // quote is a transport-style failure, not an unknown symbol.
        let bundle = bundle.unwrap();
        assert!(bundle.quote.is_none());
        assert!(bundle.ratios.is_none());
    }

    #[tokio::test]
    async fn test_sentiment_majority_vote_with_tie() {
        let mut providers = MockProviders::healthy("NVDA");
        providers.news = Ok(vec![headline("headline 0"), headline("headline 1")]);
        providers.sentiments = vec![SentimentLabel::Positive, SentimentLabel::Negative];

        let aggregator = aggregator_from(providers);
        let bundle = aggregator.gather(&sym("NVDA")).await.unwrap();

        assert_eq!(bundle.sentiment, Some(SentimentLabel::Neutral));
    }

    #[test]
    fn test_majority_vote() {
        use SentimentLabel::*;
        assert_eq!(majority_vote(&[Positive, Positive, Negative]), Positive);
        assert_eq!(majority_vote(&[Negative, Negative, Neutral]), Negative);
        assert_eq!(majority_vote(&[Neutral]), Neutral);
        assert_eq!(majority_vote(&[Positive, Negative]), Neutral);
    }
}
