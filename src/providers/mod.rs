//! Data provider traits and HTTP-backed implementations
//!
//! Providers are thin collaborators: each returns a structured record or an
//! absent result, and all transport failures are caught at the aggregator
//! boundary. Unknown-symbol is distinguished from transport failure only for
//! quotes, which is the load-bearing field.

use crate::error::AgentError;
use crate::gemini::TextGenerator;
use crate::models::{AnalystRating, FinancialRatios, NewsItem, Quote, SentimentLabel, Symbol};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Real-time quote source. `Ok(None)` means the provider does not know the
/// symbol, which aborts the whole bundle upstream.
#[async_trait::async_trait]
pub trait MarketData: Send + Sync {
    async fn get_quote(&self, symbol: &Symbol) -> crate::Result<Option<Quote>>;
}

/// Financial ratios and analyst ratings source.
#[async_trait::async_trait]
pub trait Fundamentals: Send + Sync {
    async fn get_ratios(&self, symbol: &Symbol) -> crate::Result<Option<FinancialRatios>>;
    async fn get_ratings(&self, symbol: &Symbol) -> crate::Result<Option<AnalystRating>>;
}

/// Recent headlines, most recent first, at most five.
#[async_trait::async_trait]
pub trait NewsFeed: Send + Sync {
    async fn get_news(&self, symbol: &Symbol) -> crate::Result<Vec<NewsItem>>;
}

/// Per-headline sentiment classifier.
#[async_trait::async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, headline: &str) -> crate::Result<SentimentLabel>;
}

fn build_http_client() -> crate::Result<Client> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(AgentError::from)
}

fn parse_f64(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn parse_u64(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

//
// ================= Alpha Vantage (quotes) =================
//

pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: "https://www.alphavantage.co".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl MarketData for AlphaVantageClient {
    async fn get_quote(&self, symbol: &Symbol) -> crate::Result<Option<Quote>> {
        let url = format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, symbol, self.api_key
        );

        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("Quote request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Invalid quote response: {}", e)))?;

        // Alpha Vantage answers unknown symbols with an empty "Global Quote"
        // object rather than an error status.
        let quote = match body.get("Global Quote") {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => return Ok(None),
        };

        let price = parse_f64(quote.get("05. price")).ok_or_else(|| {
            AgentError::Provider("Quote response missing price".to_string())
        })?;

        Ok(Some(Quote {
            symbol: quote
                .get("01. symbol")
                .and_then(Value::as_str)
                .unwrap_or(symbol.as_str())
                .to_string(),
            price,
            change: parse_f64(quote.get("09. change")).unwrap_or(0.0),
            change_percent: quote
                .get("10. change percent")
                .and_then(Value::as_str)
                .unwrap_or("0%")
                .to_string(),
            open: parse_f64(quote.get("02. open")).unwrap_or(price),
            high: parse_f64(quote.get("03. high")).unwrap_or(price),
            low: parse_f64(quote.get("04. low")).unwrap_or(price),
            volume: parse_u64(quote.get("06. volume")).unwrap_or(0),
            previous_close: parse_f64(quote.get("08. previous close")).unwrap_or(price),
            latest_trading_day: quote
                .get("07. latest trading day")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }
}

//
// ================= Financial Modeling Prep (ratios, ratings) =================
//

pub struct FmpClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FmpClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: "https://financialmodelingprep.com/api/v3".to_string(),
        })
    }

    async fn get_first(&self, path: &str, symbol: &Symbol) -> crate::Result<Option<Value>> {
        let url = format!(
            "{}/{}/{}?apikey={}",
            self.base_url, path, symbol, self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("FMP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Provider(format!(
                "FMP returned {} for {}",
                status, path
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Invalid FMP response: {}", e)))?;

        Ok(body.as_array().and_then(|items| items.first().cloned()))
    }
}

#[async_trait::async_trait]
impl Fundamentals for FmpClient {
    async fn get_ratios(&self, symbol: &Symbol) -> crate::Result<Option<FinancialRatios>> {
        let Some(entry) = self.get_first("ratios-ttm", symbol).await? else {
            return Ok(None);
        };

        Ok(Some(FinancialRatios {
            pe_ratio: parse_f64(entry.get("peRatioTTM")),
            roe: parse_f64(entry.get("returnOnEquityTTM")),
            roa: parse_f64(entry.get("returnOnAssetsTTM")),
            current_ratio: parse_f64(entry.get("currentRatioTTM")),
            debt_to_equity: parse_f64(entry.get("debtEquityRatioTTM")),
        }))
    }

    async fn get_ratings(&self, symbol: &Symbol) -> crate::Result<Option<AnalystRating>> {
        let Some(entry) = self.get_first("rating", symbol).await? else {
            return Ok(None);
        };

        let Some(rating) = entry.get("rating").and_then(Value::as_str) else {
            return Ok(None);
        };

        Ok(Some(AnalystRating {
            rating: rating.to_string(),
            score: entry.get("ratingScore").and_then(Value::as_i64),
            recommendation: entry
                .get("ratingRecommendation")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }
}

//
// ================= NewsAPI (headlines) =================
//

const MAX_HEADLINES: usize = 5;

pub struct NewsApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: "https://newsapi.org/v2".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl NewsFeed for NewsApiClient {
    async fn get_news(&self, symbol: &Symbol) -> crate::Result<Vec<NewsItem>> {
        let url = format!(
            "{}/everything?q={}&sortBy=publishedAt&apiKey={}",
            self.base_url, symbol, self.api_key
        );

        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("News request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Invalid news response: {}", e)))?;

        let Some(articles) = body.get("articles").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let items = articles
            .iter()
            .filter_map(|article| {
                let title = article.get("title").and_then(Value::as_str)?;
                Some(NewsItem {
                    title: title.to_string(),
                    source: article
                        .get("source")
                        .and_then(|s| s.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    published_at: article
                        .get("publishedAt")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    url: article
                        .get("url")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .take(MAX_HEADLINES)
            .collect();

        Ok(items)
    }
}

//
// ================= LLM-backed sentiment =================
//

/// Sentiment classification routed through the text-generation collaborator,
/// one headline per call.
pub struct LlmSentimentClassifier {
    llm: Arc<dyn TextGenerator>,
}

impl LlmSentimentClassifier {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }
}

#[async_trait::async_trait]
impl SentimentClassifier for LlmSentimentClassifier {
    async fn classify(&self, headline: &str) -> crate::Result<SentimentLabel> {
        let prompt = format!(
            "Classify the sentiment of this financial news headline for the \
             company it is about. Answer with exactly one word: Positive, \
             Negative, or Neutral.\n\nHeadline: {}",
            headline
        );

        let response = self.llm.generate(&prompt).await?;
        Ok(parse_sentiment(&response))
    }
}

fn parse_sentiment(response: &str) -> SentimentLabel {
    let lowered = response.to_lowercase();
    if lowered.contains("positive") {
        SentimentLabel::Positive
    } else if lowered.contains("negative") {
        SentimentLabel::Negative
    } else {
        if !lowered.contains("neutral") {
            warn!("Unrecognized sentiment response, treating as neutral");
        }
        SentimentLabel::Neutral
    }
}
