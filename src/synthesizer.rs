//! Narrative Synthesizer
//!
//! Assembles gathered bundles into one structured textual payload and
//! delegates the closing analysis to the text-generation collaborator.
//! Absent fields render as "N/A" so the comparison table stays rectangular.
//! A collaborator failure surfaces as a Generation error, never as a
//! partial narrative.

use crate::gemini::TextGenerator;
use crate::models::{IntentKind, SubjectBundle};
use std::sync::Arc;
use tracing::debug;

pub struct NarrativeSynthesizer {
    llm: Arc<dyn TextGenerator>,
}

impl NarrativeSynthesizer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Produce the final narrative for a single-subject research turn.
    pub async fn synthesize_single(&self, bundle: &SubjectBundle) -> crate::Result<String> {
        debug!(symbol = %bundle.symbol, "Synthesizing research narrative");

        let payload = render_subject(bundle);
        let prompt = format!(
            "You are a stock market research analyst.\n\n\
             Data for {}:\n\n{}\n\n\
             Give a concise investment summary and outlook based on the data \
             and headlines above. Treat N/A fields as unavailable, not as \
             zero.",
            bundle.symbol, payload
        );

        let analysis = self.llm.generate(&prompt).await?;

        Ok(format!("{}\n\n{}", payload, analysis))
    }

    /// Produce the final narrative for a two-subject comparison turn.
    pub async fn synthesize_comparison(
        &self,
        left: &SubjectBundle,
        right: &SubjectBundle,
    ) -> crate::Result<String> {
        debug!(left = %left.symbol, right = %right.symbol, "Synthesizing comparison");

        let table = comparison_table(left, right);
        let headlines = format!(
            "**Recent headlines: {}**\n{}\n\n**Recent headlines: {}**\n{}",
            left.symbol,
            render_headlines(left),
            right.symbol,
            render_headlines(right),
        );

        let prompt = format!(
            "You are a stock market research analyst.\n\n\
             Compare these two companies using the metric table and headlines \
             below. Treat N/A cells as unavailable data.\n\n{}\n\n{}\n\n\
             Give a side-by-side assessment and state which looks stronger on \
             the available evidence, with the usual caveats.",
            table, headlines
        );

        let analysis = self.llm.generate(&prompt).await?;

        Ok(format!("{}\n\n{}\n\n{}", table, headlines, analysis))
    }

    /// Template selection by intent; comparison requires exactly two bundles
    /// upstream, which the router guarantees.
    pub async fn synthesize(
        &self,
        intent: IntentKind,
        bundles: &[SubjectBundle],
    ) -> crate::Result<String> {
        match (intent, bundles) {
            (IntentKind::CompareStocks, [left, right]) => {
                self.synthesize_comparison(left, right).await
            }
            (_, [single, ..]) => self.synthesize_single(single).await,
            (_, []) => Err(crate::error::AgentError::InvalidQuery(
                "no bundles to synthesize".to_string(),
            )),
        }
    }
}

fn fmt_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(na)
}

fn na() -> String {
    "N/A".to_string()
}

/// Render one subject as a markdown block: quote line, ratio rows, sentiment,
/// rating, headlines. Every absent field renders as N/A rather than being
/// omitted.
pub fn render_subject(bundle: &SubjectBundle) -> String {
    let mut out = String::new();

    out.push_str(&format!("### {}\n\n", bundle.symbol));

    match &bundle.quote {
        Some(quote) => {
            out.push_str(&format!(
                "**Quote**: {:.2} ({:+.2}, {}) | open {:.2}, high {:.2}, low {:.2}, volume {}\n",
                quote.price,
                quote.change,
                quote.change_percent,
                quote.open,
                quote.high,
                quote.low,
                quote.volume,
            ));
        }
        None => out.push_str("**Quote**: N/A\n"),
    }

    let ratios = bundle.ratios.as_ref();
    out.push_str(&format!(
        "**P/E**: {} | **ROE**: {} | **ROA**: {} | **Current Ratio**: {} | **Debt/Equity**: {}\n",
        fmt_f64(ratios.and_then(|r| r.pe_ratio)),
        fmt_f64(ratios.and_then(|r| r.roe)),
        fmt_f64(ratios.and_then(|r| r.roa)),
        fmt_f64(ratios.and_then(|r| r.current_ratio)),
        fmt_f64(ratios.and_then(|r| r.debt_to_equity)),
    ));

    out.push_str(&format!(
        "**News sentiment**: {}\n",
        bundle
            .sentiment
            .map(|s| s.to_string())
            .unwrap_or_else(na)
    ));

    match &bundle.ratings {
        Some(rating) => out.push_str(&format!(
            "**Analyst rating**: {} (score: {}, recommendation: {})\n",
            rating.rating,
            rating
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(na),
            rating.recommendation.clone().unwrap_or_else(na),
        )),
        None => out.push_str("**Analyst rating**: N/A\n"),
    }

    out.push_str("\n**Recent headlines**\n");
    out.push_str(&render_headlines(bundle));

    out
}

fn render_headlines(bundle: &SubjectBundle) -> String {
    if bundle.news.is_empty() {
        return "No recent headlines.".to_string();
    }

    bundle
        .news
        .iter()
        .map(|item| match &item.source {
            Some(source) => format!("- {} ({})", item.title, source),
            None => format!("- {}", item.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Two-column comparison table with the tickers as column headers. Every row
/// is present for both subjects; missing values render as N/A so the table
/// stays rectangular.
pub fn comparison_table(left: &SubjectBundle, right: &SubjectBundle) -> String {
    let quote_cell = |bundle: &SubjectBundle, f: fn(&crate::models::Quote) -> String| {
        bundle.quote.as_ref().map(f).unwrap_or_else(na)
    };
    let ratio_cell = |bundle: &SubjectBundle, f: fn(&crate::models::FinancialRatios) -> Option<f64>| {
        fmt_f64(bundle.ratios.as_ref().and_then(f))
    };

    let rows: Vec<(&str, String, String)> = vec![
        (
            "Price",
            quote_cell(left, |q| format!("{:.2}", q.price)),
            quote_cell(right, |q| format!("{:.2}", q.price)),
        ),
        (
            "Change",
            quote_cell(left, |q| format!("{:+.2} ({})", q.change, q.change_percent)),
            quote_cell(right, |q| format!("{:+.2} ({})", q.change, q.change_percent)),
        ),
        (
            "Volume",
            quote_cell(left, |q| q.volume.to_string()),
            quote_cell(right, |q| q.volume.to_string()),
        ),
        (
            "P/E",
            ratio_cell(left, |r| r.pe_ratio),
            ratio_cell(right, |r| r.pe_ratio),
        ),
        (
            "ROE",
            ratio_cell(left, |r| r.roe),
            ratio_cell(right, |r| r.roe),
        ),
        (
            "ROA",
            ratio_cell(left, |r| r.roa),
            ratio_cell(right, |r| r.roa),
        ),
        (
            "Current Ratio",
            ratio_cell(left, |r| r.current_ratio),
            ratio_cell(right, |r| r.current_ratio),
        ),
        (
            "Debt/Equity",
            ratio_cell(left, |r| r.debt_to_equity),
            ratio_cell(right, |r| r.debt_to_equity),
        ),
        (
            "News sentiment",
            left.sentiment.map(|s| s.to_string()).unwrap_or_else(na),
            right.sentiment.map(|s| s.to_string()).unwrap_or_else(na),
        ),
        (
            "Analyst rating",
            left.ratings
                .as_ref()
                .map(|r| r.rating.clone())
                .unwrap_or_else(na),
            right
                .ratings
                .as_ref()
                .map(|r| r.rating.clone())
                .unwrap_or_else(na),
        ),
    ];

    let mut out = String::new();
    out.push_str(&format!(
        "| Metric | {} | {} |\n|--------|------|------|\n",
        left.symbol, right.symbol
    ));
    for (metric, left_cell, right_cell) in rows {
        out.push_str(&format!("| {} | {} | {} |\n", metric, left_cell, right_cell));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::{headline, test_quote};
    use crate::error::AgentError;
    use crate::models::{FinancialRatios, SentimentLabel, Symbol};

    struct EchoGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, _prompt: &str) -> crate::Result<String> {
            Ok("Outlook: constructive.".to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> crate::Result<String> {
            Err(AgentError::Generation("model timeout".to_string()))
        }
    }

    fn bundle(symbol: &str) -> SubjectBundle {
        SubjectBundle {
            symbol: Symbol::new(symbol).unwrap(),
            quote: Some(test_quote(symbol, 250.0)),
            ratios: Some(FinancialRatios {
                pe_ratio: Some(30.0),
                roe: Some(0.2),
                roa: None,
                current_ratio: Some(1.1),
                debt_to_equity: None,
            }),
            sentiment: Some(SentimentLabel::Positive),
            ratings: None,
            news: vec![headline("Earnings beat expectations")],
        }
    }

    #[tokio::test]
    async fn test_single_narrative_contains_symbol_and_price() {
        let synthesizer = NarrativeSynthesizer::new(std::sync::Arc::new(EchoGenerator));
        let narrative = synthesizer.synthesize_single(&bundle("TSLA")).await.unwrap();

        assert!(narrative.contains("TSLA"));
        assert!(narrative.contains("250.00"));
        assert!(narrative.contains("Outlook: constructive."));
    }

    #[tokio::test]
    async fn test_comparison_table_has_both_tickers_as_headers() {
        let synthesizer = NarrativeSynthesizer::new(std::sync::Arc::new(EchoGenerator));
        let narrative = synthesizer
            .synthesize_comparison(&bundle("AAPL"), &bundle("MSFT"))
            .await
            .unwrap();

        assert!(narrative.contains("| Metric | AAPL | MSFT |"));
        assert!(narrative.contains("| Price | 250.00 | 250.00 |"));
    }

    #[tokio::test]
    async fn test_absent_ratios_render_na_only_in_ratio_cells() {
        let mut right = bundle("MSFT");
        right.ratios = None;

        let table = comparison_table(&bundle("AAPL"), &right);

        assert!(table.contains("| P/E | 30.00 | N/A |"));
        // The quote row is unaffected by the missing ratios.
        assert!(table.contains("| Price | 250.00 | 250.00 |"));
    }

    #[test]
    fn test_render_subject_degrades_to_na() {
        let empty = SubjectBundle::empty(Symbol::new("GOOG").unwrap());
        let payload = render_subject(&empty);

        assert!(payload.contains("**Quote**: N/A"));
        assert!(payload.contains("**Analyst rating**: N/A"));
        assert!(payload.contains("No recent headlines."));
    }

    #[tokio::test]
    async fn test_generator_failure_surfaces_as_error() {
        let synthesizer = NarrativeSynthesizer::new(std::sync::Arc::new(FailingGenerator));
        let result = synthesizer.synthesize_single(&bundle("TSLA")).await;

        assert!(matches!(result, Err(AgentError::Generation(_))));
    }
}
