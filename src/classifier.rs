//! Intent Classifier
//!
//! Classifies a raw user query as either:
//! - GatherInfo: single-subject research ("Tesla stock price", "news on AAPL")
//! - CompareStocks: two-subject comparison ("Compare Apple and Microsoft")
//!
//! Delegates to the text-generation collaborator with a prompt that asks for
//! a small JSON object. The response may wrap that object in prose or a code
//! fence, so extraction scans for the first well-formed JSON object. When no
//! usable object is found the classifier fails soft: GatherInfo with the
//! trimmed raw query as a best-effort single symbol. It never raises.

use crate::gemini::TextGenerator;
use crate::models::{Classification, IntentKind, Symbol};
use crate::session::SessionContext;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct IntentClassifier {
    llm: Arc<dyn TextGenerator>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Classify a query against prior session context.
    ///
    /// The query must already be trimmed and non-empty; the orchestrator
    /// rejects empty queries before this runs.
    pub async fn classify(&self, query: &str, prior: &SessionContext) -> Classification {
        let prompt = build_prompt(query, prior);

        let response = match self.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Classifier LLM call failed, falling back: {}", e);
                return fallback(query);
            }
        };

        match parse_classification(&response) {
            Some(classification) => {
                debug!(
                    intent = %classification.intent,
                    symbols = ?classification.symbols,
                    "Query classified"
                );
                classification
            }
            None => {
                warn!("No parseable classification in LLM response, falling back");
                fallback(query)
            }
        }
    }
}

/// Best-effort fallback: treat the whole query as a single symbol candidate
/// to be corrected downstream once real resolution runs.
fn fallback(query: &str) -> Classification {
    let symbols = Symbol::new(query).map(|s| vec![s]).unwrap_or_default();
    Classification {
        intent: IntentKind::GatherInfo,
        symbols,
    }
}

fn build_prompt(query: &str, prior: &SessionContext) -> String {
    let context_line = if prior.last_symbols.is_empty() {
        String::from("(no prior context)")
    } else {
        prior
            .last_symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You classify stock research queries.

Previously discussed tickers: {}

Classify this query and extract the stock ticker symbols it mentions.
Map company names to their primary US ticker (Apple -> AAPL).
Intent is "compare_stocks" only when the user asks to compare companies;
otherwise it is "gather_info".

Query: {}

Return ONLY a JSON object, no explanation:
{{"intent": "gather_info" | "compare_stocks", "symbols": ["TICKER", ...]}}
"#,
        context_line, query
    )
}

/// Parse the classifier response: first well-formed JSON object wins.
fn parse_classification(response: &str) -> Option<Classification> {
    let object = extract_first_json_object(response)?;

    let intent = match object.get("intent")?.as_str()? {
        "compare_stocks" => IntentKind::CompareStocks,
        "gather_info" => IntentKind::GatherInfo,
        other => {
            warn!("Unrecognized intent '{}' in classifier response", other);
            return None;
        }
    };

    let symbols = object
        .get("symbols")?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(|s| Symbol::new(s).ok())
        .collect();

    Some(Classification { intent, symbols })
}

/// Scan the text for the first substring that parses as a JSON object.
/// Tracks string and escape state so braces inside string literals do not
/// confuse the depth count.
fn extract_first_json_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut start = 0;

    while let Some(open) = text[start..].find('{').map(|i| start + i) {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[open..].iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            match b {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'{' if !in_string => depth += 1,
                b'}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[open..=open + offset];
                        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                            if value.is_object() {
                                return Some(value);
                            }
                        }
                        break;
                    }
                }
                _ => {}
            }
        }

        start = open + 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    struct CannedGenerator {
        response: std::result::Result<String, String>,
    }

    #[async_trait::async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> crate::Result<String> {
            self.response
                .clone()
                .map_err(AgentError::Generation)
        }
    }

    fn classifier_with(response: std::result::Result<String, String>) -> IntentClassifier {
        IntentClassifier::new(Arc::new(CannedGenerator { response }))
    }

    #[tokio::test]
    async fn test_clean_json_response() {
        let classifier = classifier_with(Ok(
            r#"{"intent": "compare_stocks", "symbols": ["AAPL", "MSFT"]}"#.to_string(),
        ));
        let result = classifier
            .classify("Compare Apple and Microsoft", &SessionContext::new())
            .await;

        assert_eq!(result.intent, IntentKind::CompareStocks);
        assert_eq!(
            result.symbols,
            vec![Symbol::new("AAPL").unwrap(), Symbol::new("MSFT").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_fenced_json_response() {
        let classifier = classifier_with(Ok(
            "Here you go:\n```json\n{\"intent\": \"gather_info\", \"symbols\": [\"TSLA\"]}\n```"
                .to_string(),
        ));
        let result = classifier
            .classify("Tesla stock price", &SessionContext::new())
            .await;

        assert_eq!(result.intent, IntentKind::GatherInfo);
        assert_eq!(result.symbols, vec![Symbol::new("TSLA").unwrap()]);
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back() {
        let classifier = classifier_with(Ok("I could not understand that.".to_string()));
        let result = classifier
            .classify("asdkjasd", &SessionContext::new())
            .await;

        assert_eq!(result.intent, IntentKind::GatherInfo);
        assert_eq!(result.symbols, vec![Symbol::new("ASDKJASD").unwrap()]);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back() {
        let classifier = classifier_with(Err("timeout".to_string()));
        let result = classifier
            .classify("Tesla stock price", &SessionContext::new())
            .await;

        assert_eq!(result.intent, IntentKind::GatherInfo);
        assert!(!result.symbols.is_empty());
    }

    #[test]
    fn test_extract_skips_broken_objects() {
        let text = "prefix {not json} then {\"intent\": \"gather_info\"} trailing";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["intent"], "gather_info");
    }

    #[test]
    fn test_extract_handles_braces_in_strings() {
        let text = r#"{"note": "contains { and }", "intent": "gather_info"}"#;
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["note"], "contains { and }");
    }

    #[test]
    fn test_extract_nothing() {
        assert!(extract_first_json_object("no objects here").is_none());
    }
}
