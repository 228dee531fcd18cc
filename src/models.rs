//! Core data models for the stock research agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AgentError;

//
// ================= Symbol =================
//

/// A normalized stock ticker. Uppercase and non-empty by construction,
/// so equality on the wrapped string is case-insensitive equality on
/// the raw input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> crate::Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(AgentError::InvalidSymbol(
                "symbol must be non-empty".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this looks like a real exchange ticker. The classifier's
    /// fail-soft path wraps the whole query as a pseudo-symbol; resolution
    /// uses this to discard such placeholders instead of fetching data for
    /// them.
    pub fn is_ticker_shaped(&self) -> bool {
        let len = self.0.len();
        (1..=6).contains(&len)
            && self.0.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
            && self.0.bytes().any(|b| b.is_ascii_uppercase())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    GatherInfo,
    CompareStocks,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentKind::GatherInfo => "gather_info",
            IntentKind::CompareStocks => "compare_stocks",
        };
        write!(f, "{}", s)
    }
}

/// Classifier output: intent plus the symbols extracted from the query
/// (before session resolution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: IntentKind,
    pub symbols: Vec<Symbol>,
}

//
// ================= Market Records =================
//
// Externally sourced, read-only records; consumed as-is.
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub previous_close: f64,
    pub latest_trading_day: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialRatios {
    pub pe_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystRating {
    pub rating: String,
    pub score: Option<i64>,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: Option<String>,
    pub published_at: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Subject Bundle =================
//

/// Per-symbol aggregate of everything the data providers returned.
/// Any field may be absent without invalidating the bundle; absence
/// is a value, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectBundle {
    pub symbol: Symbol,
    pub quote: Option<Quote>,
    pub ratios: Option<FinancialRatios>,
    pub sentiment: Option<SentimentLabel>,
    pub ratings: Option<AnalystRating>,
    pub news: Vec<NewsItem>,
}

impl SubjectBundle {
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            quote: None,
            ratios: None,
            sentiment: None,
            ratings: None,
            news: Vec::new(),
        }
    }
}

//
// ================= Conversation Turn =================
//

/// One user message and what it resolved to. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub intent: IntentKind,
    pub symbols: Vec<Symbol>,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(query: String, intent: IntentKind, symbols: Vec<Symbol>) -> Self {
        Self {
            query,
            intent,
            symbols,
            timestamp: Utc::now(),
        }
    }
}

//
// ================= Turn Outcome =================
//

/// Terminal result of one routed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "text")]
pub enum TurnOutcome {
    Narrative(String),
    Clarification(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalization() {
        let symbol = Symbol::new("  tsla ").unwrap();
        assert_eq!(symbol.as_str(), "TSLA");
        assert_eq!(symbol, Symbol::new("TSLA").unwrap());
    }

    #[test]
    fn test_ticker_shape() {
        assert!(Symbol::new("TSLA").unwrap().is_ticker_shaped());
        assert!(Symbol::new("BRK.B").unwrap().is_ticker_shaped());
        assert!(!Symbol::new("ASDKJASD").unwrap().is_ticker_shaped());
        assert!(!Symbol::new("Tesla stock price").unwrap().is_ticker_shaped());
    }

    #[test]
    fn test_symbol_rejects_empty() {
        assert!(Symbol::new("   ").is_err());
        assert!(Symbol::new("").is_err());
    }

    #[test]
    fn test_intent_serde_roundtrip() {
        let json = serde_json::to_string(&IntentKind::CompareStocks).unwrap();
        assert_eq!(json, "\"compare_stocks\"");
        let parsed: IntentKind = serde_json::from_str("\"gather_info\"").unwrap();
        assert_eq!(parsed, IntentKind::GatherInfo);
    }

    #[test]
    fn test_empty_bundle_has_no_fields() {
        let bundle = SubjectBundle::empty(Symbol::new("AAPL").unwrap());
        assert!(bundle.quote.is_none());
        assert!(bundle.ratios.is_none());
        assert!(bundle.sentiment.is_none());
        assert!(bundle.ratings.is_none());
        assert!(bundle.news.is_empty());
    }
}
